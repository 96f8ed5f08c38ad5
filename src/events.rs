use crate::models::{ShopItem, Task, User, Weekday};

pub const EVENT_STATE_UPDATED: &str = "state_updated";

#[derive(Debug, Clone, serde::Serialize)]
pub struct StatePayload {
    pub tasks: Vec<Task>,
    pub user: User,
    pub shop_items: Vec<ShopItem>,
    pub current_day: Weekday,
}
