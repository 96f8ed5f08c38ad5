use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

pub const NEW_TASK_PREFIX: &str = "new_";
pub const TASK_PREFIX: &str = "task_";
pub const DEFAULT_CATEGORY: &str = "General";

pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    Review,
    Completed,
    TryAgain,
    Penalty,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Todo,
        TaskStatus::Review,
        TaskStatus::Completed,
        TaskStatus::TryAgain,
        TaskStatus::Penalty,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Client,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    Image,
}

/// Weekday tag used by recurring tasks. Ordered Monday first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl From<chrono::Weekday> for Weekday {
    fn from(value: chrono::Weekday) -> Self {
        match value {
            chrono::Weekday::Mon => Weekday::Mon,
            chrono::Weekday::Tue => Weekday::Tue,
            chrono::Weekday::Wed => Weekday::Wed,
            chrono::Weekday::Thu => Weekday::Thu,
            chrono::Weekday::Fri => Weekday::Fri,
            chrono::Weekday::Sat => Weekday::Sat,
            chrono::Weekday::Sun => Weekday::Sun,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Message {
    pub id: String,
    pub sender: Role,
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Text body, or an opaque image reference for `MessageType::Image`.
    pub content: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub points: i64,
    pub status: TaskStatus,
    #[serde(default)]
    pub category: String,
    /// Empty means one-off.
    #[serde(default)]
    pub frequency: BTreeSet<Weekday>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Task {
    pub fn is_recurring(&self) -> bool {
        !self.frequency.is_empty()
    }

    pub fn is_draft(&self) -> bool {
        self.id.starts_with(NEW_TASK_PREFIX)
    }

    pub fn category_label(&self) -> &str {
        let trimmed = self.category.trim();
        if trimmed.is_empty() {
            DEFAULT_CATEGORY
        } else {
            trimmed
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Purchase,
    Redeem,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub item_id: String,
    pub item_name: String,
    pub item_emoji: String,
    pub cost: u32,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct PointLog {
    pub id: String,
    pub reason: String,
    pub change: i64,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct User {
    pub role: Role,
    pub score: i64,
    pub today_score: i64,
    #[serde(default)]
    pub inventory: Vec<String>,
    /// Newest first.
    #[serde(default)]
    pub history: Vec<Transaction>,
    /// Append-only, oldest first.
    #[serde(default)]
    pub point_logs: Vec<PointLog>,
    #[serde(default)]
    pub last_cleanup_date: Option<String>,
}

impl Default for User {
    fn default() -> Self {
        Self {
            role: Role::Client,
            score: 0,
            today_score: 0,
            inventory: Vec::new(),
            history: Vec::new(),
            point_logs: Vec::new(),
            last_cleanup_date: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ShopItem {
    pub id: String,
    pub name: String,
    pub cost: u32,
    pub emoji: String,
    #[serde(default)]
    pub description: String,
}

pub fn default_shop_items() -> Vec<ShopItem> {
    let item = |id: &str, name: &str, cost: u32, emoji: &str, description: &str| ShopItem {
        id: id.to_string(),
        name: name.to_string(),
        cost,
        emoji: emoji.to_string(),
        description: description.to_string(),
    };
    vec![
        item("1", "Game time 1h", 150, "🎮", "Exchange for 1 hour of uninterrupted gaming."),
        item("2", "Skip a chore", 500, "🧹", "Skip one assigned chore for the day."),
        item("3", "Movie ticket", 400, "🎬", "Pick the movie for movie night."),
        item("4", "Bubble tea", 200, "🧋", "Get a bubble tea of your choice."),
        item("5", "Cash reward $10", 1000, "💵", "Real money reward."),
        item("6", "Mystery prize", 2000, "🎁", "A surprise gift from the Admin."),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    #[serde(default = "default_admin_secret")]
    pub admin_secret: String,
    #[serde(default = "default_client_secret")]
    pub client_secret: String,
    #[serde(default = "default_task_points")]
    pub default_task_points: i64,
    #[serde(default = "default_category")]
    pub default_category: String,
    #[serde(default = "default_boundary_buffer_secs")]
    pub boundary_buffer_secs: u64,
    #[serde(default = "default_reset_retry_secs")]
    pub reset_retry_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            admin_secret: default_admin_secret(),
            client_secret: default_client_secret(),
            default_task_points: default_task_points(),
            default_category: default_category(),
            boundary_buffer_secs: default_boundary_buffer_secs(),
            reset_retry_secs: default_reset_retry_secs(),
        }
    }
}

fn default_admin_secret() -> String {
    "142857".to_string()
}

fn default_client_secret() -> String {
    "123456".to_string()
}

fn default_task_points() -> i64 {
    50
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

pub(crate) fn default_boundary_buffer_secs() -> u64 {
    1
}

fn default_reset_retry_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TasksFile {
    pub schema_version: u32,
    pub tasks: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UserFile {
    pub schema_version: u32,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ShopFile {
    pub schema_version: u32,
    pub items: Vec<ShopItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SettingsFile {
    pub schema_version: u32,
    pub settings: Settings,
}
