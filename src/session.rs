use std::sync::Arc;

use chrono::Local;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::ledger::{balance_matches, logged_total};
use crate::models::Settings;
use crate::recurrence::weekday_of;
use crate::scheduler::start_scheduler;
use crate::state::AppState;
use crate::store::RemoteStore;
use crate::sync::RemoteSync;

/// A running process: loaded state, live feeds and the reset timer.
///
/// Dropping the session stops its background tasks.
pub struct Session {
    state: AppState,
    sync: RemoteSync,
    settings: Settings,
    workers: Vec<JoinHandle<()>>,
}

impl Session {
    /// Loads everything from `store` (degrading to defaults), subscribes to
    /// the feeds, then starts the scheduler whose first pass catches up on
    /// any missed boundary.
    pub async fn start(store: Arc<dyn RemoteStore>, settings: Settings) -> Self {
        let sync = RemoteSync::new(store, Handle::current());
        let tasks = sync.load_tasks_or_default().await;
        let user = sync.load_user_or_default().await;
        let shop_items = sync.load_shop_items_or_default().await;

        if !balance_matches(&user, 0) {
            log::warn!(
                "score does not match point logs score={} logged={}",
                user.score,
                logged_total(&user)
            );
        }
        log::info!(
            "session loaded tasks={} items={} last_cleanup={:?}",
            tasks.len(),
            shop_items.len(),
            user.last_cleanup_date
        );

        let state = AppState::new(tasks, user, shop_items, weekday_of(&Local::now()));
        let workers = vec![
            sync.spawn_task_listener(state.clone()),
            sync.spawn_user_listener(state.clone()),
            start_scheduler(sync.clone(), state.clone(), &settings),
        ];
        Self {
            state,
            sync,
            settings,
            workers,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Command context for handlers in `commands`.
    pub fn ctx(&self) -> &RemoteSync {
        &self.sync
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn shutdown(&mut self) {
        for worker in self.workers.drain(..) {
            worker.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{login, submit_task, Submission};
    use crate::models::{Role, Task, TaskStatus, User};
    use crate::store::MemoryStore;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn make_task(id: &str, status: TaskStatus) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task-{id}"),
            description: String::new(),
            points: 10,
            status,
            category: String::new(),
            frequency: BTreeSet::new(),
            messages: Vec::new(),
        }
    }

    async fn eventually(check: impl Fn() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn start_runs_the_first_reset_and_seeds_the_catalog() {
        let store = Arc::new(
            MemoryStore::with_tasks(&[
                make_task("open", TaskStatus::Review),
                make_task("done", TaskStatus::Completed),
            ])
            .unwrap(),
        );
        let remote: Arc<dyn RemoteStore> = store.clone();
        let session = Session::start(remote, Settings::default()).await;

        assert_eq!(session.state().shop_items().len(), 6);
        eventually(|| session.state().user().last_cleanup_date.is_some()).await;
        eventually(|| store.stored_tasks().len() == 1).await;
        assert_eq!(store.stored_tasks()[0].status, TaskStatus::Todo);
        eventually(|| {
            let tasks = session.state().tasks();
            tasks.len() == 1 && tasks[0].status == TaskStatus::Todo
        })
        .await;
        assert_eq!(store.stored_shop_items().len(), 6);
    }

    #[tokio::test]
    async fn start_survives_an_offline_store() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);
        let remote: Arc<dyn RemoteStore> = store.clone();
        let mut session = Session::start(remote, Settings::default()).await;

        assert!(session.state().tasks().is_empty());
        assert_eq!(session.state().user(), User::default());
        assert_eq!(session.state().shop_items().len(), 6);
        session.shutdown();
    }

    #[tokio::test]
    async fn commands_flow_through_the_session_context() {
        let store = Arc::new(MemoryStore::with_tasks(&[make_task("a", TaskStatus::Todo)]).unwrap());
        let mut user = User::default();
        user.last_cleanup_date = Some(crate::recurrence::day_key(&Local::now()));
        store.save_user(&user).await.unwrap();
        let remote: Arc<dyn RemoteStore> = store.clone();
        let session = Session::start(remote, Settings::default()).await;

        assert!(login(session.state(), session.settings(), Role::Client, "123456").ok);
        let res = submit_task(session.ctx(), session.state(), "a".into(), Submission::text("done"));
        assert!(res.ok);
        session.ctx().flush().await.unwrap();
        assert_eq!(store.stored_tasks()[0].status, TaskStatus::Review);
        eventually(|| session.state().task("a").unwrap().status == TaskStatus::Review).await;
    }
}
