use std::convert::Infallible;

use chrono::Utc;

use crate::auth::check_credential;
use crate::events::StatePayload;
use crate::ledger;
use crate::models::{
    new_id, Message, MessageType, Role, Settings, ShopItem, Task, TaskStatus, Timestamp, User,
    NEW_TASK_PREFIX, TASK_PREFIX,
};
use crate::state::{upsert, AppState};
use crate::transition::{next_status, ReviewVerdict, TaskAction, Transition};

#[derive(Debug, serde::Serialize)]
pub struct CommandResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// Side effects of a command. Writes are fire-and-forget: implementations
/// must not block and must log their own failures. Writes are issued with
/// the state lock held and must reach the store in call order.
pub trait CommandCtx {
    fn save_task(&self, task: &Task);
    fn delete_task(&self, task_id: &str);
    fn save_user(&self, user: &User);
    fn save_shop_items(&self, items: &[ShopItem]);
    fn emit_state_updated(&self, payload: StatePayload);
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskOutcome {
    pub task: Task,
    /// The task detail view should close (approval or punishment).
    pub closes_session: bool,
}

/// Text and/or image offered with a submission or note.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl Submission {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            image: None,
        }
    }

    pub fn image(reference: &str) -> Self {
        Self {
            text: String::new(),
            image: Some(reference.to_string()),
        }
    }

    fn into_message(self, sender: Role, now: Timestamp) -> Option<Message> {
        // One message per submission; an attached image takes precedence.
        let (kind, content) = match self.image.filter(|image| !image.trim().is_empty()) {
            Some(image) => (MessageType::Image, image),
            None if !self.text.trim().is_empty() => (MessageType::Text, self.text),
            None => return None,
        };
        Some(Message {
            id: new_id("msg"),
            sender,
            kind,
            content,
            timestamp: now,
        })
    }
}

fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        ok: true,
        data: Some(data),
        error: None,
    }
}

fn err<T>(message: &str) -> CommandResult<T> {
    CommandResult {
        ok: false,
        data: None,
        error: Some(message.to_string()),
    }
}

fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

/// Role of the logged-in session. Every command that changes state needs one.
fn session_role(state: &AppState) -> Result<Role, String> {
    if !state.is_authenticated() {
        return Err("not logged in".to_string());
    }
    Ok(state.user().role)
}

fn require_admin(state: &AppState, action: &str) -> Result<(), String> {
    match session_role(state)? {
        Role::Admin => Ok(()),
        Role::Client => Err(format!("only the admin can {action}")),
    }
}

/// Runs a ledger step on the live profile. The new profile is stored and its
/// write queued under the state lock, so concurrent steps neither overwrite
/// each other locally nor reach the store out of order.
fn try_commit_user<E>(
    ctx: &impl CommandCtx,
    state: &AppState,
    step: impl FnOnce(&User) -> Result<Option<User>, E>,
) -> Result<Option<User>, E> {
    state.update_user(|user| {
        let next = step(user)?;
        if let Some(next) = &next {
            *user = next.clone();
            ctx.save_user(next);
        }
        Ok(next)
    })
}

fn commit_user(
    ctx: &impl CommandCtx,
    state: &AppState,
    step: impl FnOnce(&User) -> Option<User>,
) -> Option<User> {
    match try_commit_user(ctx, state, |user| Ok::<_, Infallible>(step(user))) {
        Ok(next) => next,
        Err(never) => match never {},
    }
}

fn store_task(ctx: &impl CommandCtx, state: &AppState, task: &Task) {
    state.update_tasks(|tasks| {
        upsert(tasks, task.clone());
        ctx.save_task(task);
    });
}

/// Applies the predicted task locally, then issues the single-task write and
/// any completion credit.
fn commit_task(
    ctx: &impl CommandCtx,
    state: &AppState,
    previous: TaskStatus,
    task: Task,
    transition: Transition,
) -> TaskOutcome {
    store_task(ctx, state, &task);
    let now = now_millis();
    if commit_user(ctx, state, |user| ledger::complete(user, previous, &task, now)).is_some() {
        log::info!("task completed id={} points={}", task.id, task.points);
    }
    ctx.emit_state_updated(state.snapshot());
    TaskOutcome {
        task,
        closes_session: transition.closes_session,
    }
}

fn rejected<T>(error: impl std::fmt::Display) -> CommandResult<T> {
    log::debug!("command rejected: {error}");
    err(&error.to_string())
}

pub fn load_state(state: &AppState) -> CommandResult<StatePayload> {
    ok(state.snapshot())
}

pub fn login(
    state: &AppState,
    settings: &Settings,
    role: Role,
    secret: &str,
) -> CommandResult<Role> {
    if !check_credential(settings, role, secret) {
        log::warn!("login rejected role={role:?}");
        return err("invalid password");
    }
    state.update_user(|user| user.role = role);
    state.set_authenticated(true);
    log::info!("login role={role:?}");
    ok(role)
}

pub fn logout(state: &AppState) -> CommandResult<bool> {
    state.set_authenticated(false);
    ok(true)
}

/// A fresh, unsaved task carrying the temporary `new_` id prefix.
pub fn draft_task(state: &AppState, settings: &Settings) -> CommandResult<Task> {
    if let Err(error) = require_admin(state, "create tasks") {
        return err(&error);
    }
    ok(Task {
        id: format!("{NEW_TASK_PREFIX}{}", now_millis()),
        title: String::new(),
        description: String::new(),
        points: settings.default_task_points,
        status: TaskStatus::Todo,
        category: settings.default_category.clone(),
        frequency: Default::default(),
        messages: Vec::new(),
    })
}

/// Admin edit form: creates or overwrites every field, status included.
pub fn save_task(ctx: &impl CommandCtx, state: &AppState, task: Task) -> CommandResult<TaskOutcome> {
    let mut task = task;
    if task.is_draft() {
        task.id = task.id.replacen(NEW_TASK_PREFIX, TASK_PREFIX, 1);
    }
    let role = match session_role(state) {
        Ok(role) => role,
        Err(error) => return err(&error),
    };
    let existing = state.task(&task.id);
    let previous = existing.as_ref().map_or(task.status, |t| t.status);
    let transition = match next_status(role, previous, TaskAction::Override(task.status)) {
        Ok(transition) => transition,
        Err(error) => return rejected(error),
    };
    // A brand-new task is never credited, even when saved as COMPLETED.
    let previous = if existing.is_some() {
        previous
    } else {
        TaskStatus::Completed
    };
    ok(commit_task(ctx, state, previous, task, transition))
}

pub fn delete_task(ctx: &impl CommandCtx, state: &AppState, task_id: String) -> CommandResult<bool> {
    if let Err(error) = require_admin(state, "delete tasks") {
        return err(&error);
    }
    let removed = state.update_tasks(|tasks| {
        let before = tasks.len();
        tasks.retain(|task| task.id != task_id);
        if !task_id.starts_with(NEW_TASK_PREFIX) {
            ctx.delete_task(&task_id);
        }
        tasks.len() != before
    });
    ctx.emit_state_updated(state.snapshot());
    ok(removed)
}

/// Client hands in work. Empty submissions are a no-op.
pub fn submit_task(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
    submission: Submission,
) -> CommandResult<TaskOutcome> {
    let role = match session_role(state) {
        Ok(role) => role,
        Err(error) => return err(&error),
    };
    let Some(task) = state.task(&task_id) else {
        return err("task not found");
    };
    let Some(message) = submission.into_message(role, now_millis()) else {
        return ok(TaskOutcome {
            task,
            closes_session: false,
        });
    };
    let transition = match next_status(role, task.status, TaskAction::Submit) {
        Ok(transition) => transition,
        Err(error) => return rejected(error),
    };
    let previous = task.status;
    let mut next = task;
    next.messages.push(message);
    next.status = transition.status;
    ok(commit_task(ctx, state, previous, next, transition))
}

/// Admin closes a review. A note, when given, is appended before the move.
pub fn review_task(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
    verdict: ReviewVerdict,
    note: Submission,
) -> CommandResult<TaskOutcome> {
    let role = match session_role(state) {
        Ok(role) => role,
        Err(error) => return err(&error),
    };
    let Some(task) = state.task(&task_id) else {
        return err("task not found");
    };
    let transition = match next_status(role, task.status, TaskAction::Review(verdict)) {
        Ok(transition) => transition,
        Err(error) => return rejected(error),
    };
    let previous = task.status;
    let mut next = task;
    if let Some(message) = note.into_message(role, now_millis()) {
        next.messages.push(message);
    }
    next.status = transition.status;
    ok(commit_task(ctx, state, previous, next, transition))
}

pub fn append_note(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
    note: Submission,
) -> CommandResult<TaskOutcome> {
    let role = match session_role(state) {
        Ok(role) => role,
        Err(error) => return err(&error),
    };
    let Some(task) = state.task(&task_id) else {
        return err("task not found");
    };
    let transition = match next_status(role, task.status, TaskAction::Note) {
        Ok(transition) => transition,
        Err(error) => return rejected(error),
    };
    let Some(message) = note.into_message(role, now_millis()) else {
        return ok(TaskOutcome {
            task,
            closes_session: false,
        });
    };
    let previous = task.status;
    let mut next = task;
    next.messages.push(message);
    ok(commit_task(ctx, state, previous, next, transition))
}

/// Admin applies the penalty debit for a task sitting in PENALTY.
pub fn punish_task(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
    note: Submission,
) -> CommandResult<TaskOutcome> {
    let role = match session_role(state) {
        Ok(role) => role,
        Err(error) => return err(&error),
    };
    let Some(task) = state.task(&task_id) else {
        return err("task not found");
    };
    let transition = match next_status(role, task.status, TaskAction::Punish) {
        Ok(transition) => transition,
        Err(error) => return rejected(error),
    };
    let now = now_millis();
    let mut task = task;
    if let Some(message) = note.into_message(role, now) {
        task.messages.push(message);
        store_task(ctx, state, &task);
    }
    commit_user(ctx, state, |user| Some(ledger::penalize(user, &task, now)));
    log::info!(
        "task penalized id={} points=-{}",
        task.id,
        ledger::penalty_magnitude(&task)
    );
    ctx.emit_state_updated(state.snapshot());
    ok(TaskOutcome {
        task,
        closes_session: transition.closes_session,
    })
}

pub fn purchase_item(
    ctx: &impl CommandCtx,
    state: &AppState,
    item_id: String,
) -> CommandResult<User> {
    if let Err(error) = session_role(state) {
        return err(&error);
    }
    let Some(item) = state.shop_item(&item_id) else {
        return err("item not found");
    };
    let now = now_millis();
    let bought = try_commit_user(ctx, state, |user| {
        ledger::purchase(user, &item, now).map(Some)
    });
    let user = match bought {
        Ok(Some(user)) => user,
        Ok(None) => return err("item not found"),
        Err(error) => return rejected(error),
    };
    log::info!("item purchased id={} cost={}", item.id, item.cost);
    ctx.emit_state_updated(state.snapshot());
    ok(user)
}

/// Admin marks one held unit as used. Not holding the item is a no-op.
pub fn redeem_item(
    ctx: &impl CommandCtx,
    state: &AppState,
    item_id: String,
) -> CommandResult<bool> {
    if let Err(error) = require_admin(state, "redeem items") {
        return err(&error);
    }
    // Items dropped from the catalog can still be redeemed by id.
    let item = state.shop_item(&item_id).unwrap_or_else(|| ShopItem {
        id: item_id.clone(),
        name: item_id.clone(),
        cost: 0,
        emoji: String::new(),
        description: String::new(),
    });
    let now = now_millis();
    if commit_user(ctx, state, |user| ledger::redeem(user, &item, now)).is_none() {
        return ok(false);
    }
    log::info!("item redeemed id={}", item.id);
    ctx.emit_state_updated(state.snapshot());
    ok(true)
}

pub fn update_shop(
    ctx: &impl CommandCtx,
    state: &AppState,
    items: Vec<ShopItem>,
) -> CommandResult<Vec<ShopItem>> {
    if let Err(error) = require_admin(state, "edit the shop") {
        return err(&error);
    }
    state.replace_shop_items(items.clone());
    ctx.save_shop_items(&items);
    ctx.emit_state_updated(state.snapshot());
    ok(items)
}
