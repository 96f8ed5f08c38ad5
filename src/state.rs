use std::sync::{Arc, Mutex};

use crate::events::StatePayload;
use crate::models::{ShopItem, Task, User, Weekday};

/// The single in-memory aggregate: task list, the user profile, the catalog
/// and the current-day tag used for display filtering.
///
/// Handlers write predicted snapshots here before persisting; feed listeners
/// replace whole collections with what the store pushes.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Mutex<AppData>>,
}

impl AppState {
    pub fn new(tasks: Vec<Task>, user: User, shop_items: Vec<ShopItem>, today: Weekday) -> Self {
        let seeded = !tasks.is_empty();
        Self {
            inner: Arc::new(Mutex::new(AppData {
                tasks,
                user,
                shop_items,
                current_day: today,
                authenticated: false,
                seeded,
            })),
        }
    }

    pub fn snapshot(&self) -> StatePayload {
        let guard = self.inner.lock().expect("state poisoned");
        StatePayload {
            tasks: guard.tasks.clone(),
            user: guard.user.clone(),
            shop_items: guard.shop_items.clone(),
            current_day: guard.current_day,
        }
    }

    pub fn tasks(&self) -> Vec<Task> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.tasks.clone()
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.tasks.iter().find(|t| t.id == task_id).cloned()
    }

    /// Inserts or replaces by id. Returns the replaced task, if any.
    pub fn upsert_task(&self, task: Task) -> Option<Task> {
        self.update_tasks(|tasks| upsert(tasks, task))
    }

    /// Runs `apply` against the live task list under the lock. Local edits do
    /// not count as having seen a stored set.
    pub fn update_tasks<R>(&self, apply: impl FnOnce(&mut Vec<Task>) -> R) -> R {
        let mut guard = self.inner.lock().expect("state poisoned");
        apply(&mut guard.tasks)
    }

    /// Reconciles with a pushed task set.
    ///
    /// The push replaces local state wholesale. An empty push is ignored until
    /// a non-empty set has been seen once, so a flaky first connection cannot
    /// wipe tasks that were loaded locally. Returns whether state changed.
    pub fn apply_remote_tasks(&self, tasks: Vec<Task>) -> bool {
        let mut guard = self.inner.lock().expect("state poisoned");
        if tasks.is_empty() && !guard.seeded {
            return false;
        }
        guard.seeded |= !tasks.is_empty();
        if guard.tasks == tasks {
            return false;
        }
        guard.tasks = tasks;
        true
    }

    pub fn user(&self) -> User {
        let guard = self.inner.lock().expect("state poisoned");
        guard.user.clone()
    }

    pub fn replace_user(&self, user: User) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.user = user;
    }

    /// Runs `apply` against the live profile under the lock, so the change
    /// lands on top of whatever other handlers committed meanwhile.
    pub fn update_user<R>(&self, apply: impl FnOnce(&mut User) -> R) -> R {
        let mut guard = self.inner.lock().expect("state poisoned");
        apply(&mut guard.user)
    }

    /// Pushed profiles replace the local one, but the session role stays
    /// local: it describes who is using this device, not the profile.
    pub fn apply_remote_user(&self, user: User) -> bool {
        let mut guard = self.inner.lock().expect("state poisoned");
        let role = guard.user.role;
        let user = User { role, ..user };
        if guard.user == user {
            return false;
        }
        guard.user = user;
        true
    }

    pub fn shop_items(&self) -> Vec<ShopItem> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.shop_items.clone()
    }

    pub fn shop_item(&self, item_id: &str) -> Option<ShopItem> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.shop_items.iter().find(|i| i.id == item_id).cloned()
    }

    pub fn replace_shop_items(&self, items: Vec<ShopItem>) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.shop_items = items;
    }

    pub fn current_day(&self) -> Weekday {
        let guard = self.inner.lock().expect("state poisoned");
        guard.current_day
    }

    pub fn set_current_day(&self, day: Weekday) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.current_day = day;
    }

    pub fn is_authenticated(&self) -> bool {
        let guard = self.inner.lock().expect("state poisoned");
        guard.authenticated
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.authenticated = authenticated;
    }
}

pub(crate) fn upsert(tasks: &mut Vec<Task>, task: Task) -> Option<Task> {
    if let Some(existing) = tasks.iter_mut().find(|t| t.id == task.id) {
        return Some(std::mem::replace(existing, task));
    }
    tasks.push(task);
    None
}

#[derive(Debug)]
struct AppData {
    tasks: Vec<Task>,
    user: User,
    shop_items: Vec<ShopItem>,
    current_day: Weekday,
    authenticated: bool,
    /// Set once a non-empty task set has been observed.
    seeded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, TaskStatus};
    use std::collections::BTreeSet;

    fn make_task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task-{id}"),
            description: String::new(),
            points: 10,
            status: TaskStatus::Todo,
            category: String::new(),
            frequency: BTreeSet::new(),
            messages: Vec::new(),
        }
    }

    fn make_state(tasks: Vec<Task>) -> AppState {
        AppState::new(tasks, User::default(), Vec::new(), Weekday::Mon)
    }

    #[test]
    fn upsert_replaces_by_id() {
        let state = make_state(Vec::new());
        assert!(state.upsert_task(make_task("a")).is_none());
        assert_eq!(state.tasks().len(), 1);

        let mut updated = make_task("a");
        updated.title = "updated".to_string();
        let previous = state.upsert_task(updated).expect("replaced");
        assert_eq!(previous.title, "task-a");
        assert_eq!(state.task("a").unwrap().title, "updated");

        state.update_tasks(|tasks| tasks.retain(|t| t.id != "a"));
        assert!(state.tasks().is_empty());
    }

    #[test]
    fn empty_push_is_ignored_before_first_non_empty_set() {
        let state = make_state(Vec::new());
        state.upsert_task(make_task("local"));

        assert!(!state.apply_remote_tasks(Vec::new()));
        assert_eq!(state.tasks().len(), 1);

        assert!(state.apply_remote_tasks(vec![make_task("a")]));
        assert!(state.apply_remote_tasks(Vec::new()));
        assert!(state.tasks().is_empty());
    }

    #[test]
    fn initial_non_empty_load_trusts_later_empty_pushes() {
        let state = make_state(vec![make_task("a")]);
        assert!(state.apply_remote_tasks(Vec::new()));
        assert!(state.tasks().is_empty());
    }

    #[test]
    fn remote_push_replaces_local_prediction_wholesale() {
        let state = make_state(vec![make_task("a"), make_task("b")]);
        let mut predicted = make_task("a");
        predicted.title = "local edit".into();
        state.upsert_task(predicted);

        // The push was produced before the local edit reached the store.
        assert!(state.apply_remote_tasks(vec![make_task("a"), make_task("b")]));
        assert_eq!(state.task("a").unwrap().title, "task-a");

        // Identical push is not a change.
        assert!(!state.apply_remote_tasks(vec![make_task("a"), make_task("b")]));
    }

    #[test]
    fn remote_user_keeps_local_session_role() {
        let state = make_state(Vec::new());
        let mut local = state.user();
        local.role = Role::Admin;
        state.replace_user(local);

        let mut pushed = User::default();
        pushed.score = 300;
        assert!(state.apply_remote_user(pushed.clone()));
        let user = state.user();
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.score, 300);
        assert!(!state.apply_remote_user(pushed));
    }

    #[test]
    fn in_place_updates_see_the_latest_values() {
        let state = make_state(Vec::new());
        state.replace_user(User {
            score: 40,
            ..User::default()
        });
        let score = state.update_user(|user| {
            user.score += 2;
            user.score
        });
        assert_eq!(score, 42);
        assert_eq!(state.user().score, 42);

        let count = state.update_tasks(|tasks| {
            tasks.push(make_task("a"));
            tasks.len()
        });
        assert_eq!(count, 1);
        assert!(!state.apply_remote_tasks(Vec::new()));
        assert_eq!(state.tasks().len(), 1);
    }

    #[test]
    fn snapshot_and_session_flags() {
        let state = make_state(vec![make_task("a")]);
        state.replace_shop_items(crate::models::default_shop_items());
        state.set_current_day(Weekday::Fri);
        state.set_authenticated(true);

        let payload = state.snapshot();
        assert_eq!(payload.tasks.len(), 1);
        assert_eq!(payload.shop_items.len(), 6);
        assert_eq!(payload.current_day, Weekday::Fri);
        assert!(state.is_authenticated());
        assert_eq!(state.shop_item("2").unwrap().cost, 500);
        assert!(state.shop_item("nope").is_none());
    }
}
