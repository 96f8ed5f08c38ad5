use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::commands::CommandCtx;
use crate::events::{StatePayload, EVENT_STATE_UPDATED};
use crate::models::{default_shop_items, ShopItem, Task, User};
use crate::state::AppState;
use crate::store::{RemoteStore, StoreError};

const EVENT_CAPACITY: usize = 64;

/// One store call queued on the writer.
#[derive(Debug, Clone)]
pub enum WriteOp {
    SaveTask(Task),
    SaveTasks(Vec<Task>),
    DeleteTask(String),
    SaveUser(User),
    SaveShopItems(Vec<ShopItem>),
}

impl WriteOp {
    async fn apply(&self, store: &dyn RemoteStore) -> Result<(), StoreError> {
        match self {
            WriteOp::SaveTask(task) => store.save_task(task).await,
            WriteOp::SaveTasks(tasks) => store.save_tasks(tasks).await,
            WriteOp::DeleteTask(task_id) => store.delete_task(task_id).await,
            WriteOp::SaveUser(user) => store.save_user(user).await,
            WriteOp::SaveShopItems(items) => store.save_shop_items(items).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            WriteOp::SaveTask(task) => format!("save_task id={}", task.id),
            WriteOp::SaveTasks(tasks) => format!("save_tasks count={}", tasks.len()),
            WriteOp::DeleteTask(task_id) => format!("delete_task id={task_id}"),
            WriteOp::SaveUser(user) => format!("save_user score={}", user.score),
            WriteOp::SaveShopItems(items) => format!("save_shop_items count={}", items.len()),
        }
    }
}

struct Write {
    ops: Vec<WriteOp>,
    done: Option<oneshot::Sender<Result<(), StoreError>>>,
}

fn writer_stopped() -> StoreError {
    StoreError::Unavailable("store writer stopped".to_string())
}

/// Drains the queue one write at a time, so the store sees writes in the
/// order they were issued. A failed op aborts the rest of its batch.
async fn run_writer(store: Arc<dyn RemoteStore>, mut queue: mpsc::UnboundedReceiver<Write>) {
    while let Some(write) = queue.recv().await {
        let mut result = Ok(());
        for op in &write.ops {
            if let Err(error) = op.apply(store.as_ref()).await {
                log::warn!("{} failed error={error}", op.describe());
                result = Err(error);
                break;
            }
        }
        if let Some(done) = write.done {
            // The waiter may have given up.
            let _ = done.send(result);
        }
    }
    log::debug!("store writer stopped");
}

/// Bridges the command layer to the remote store.
///
/// Command writes go to a single background writer and are never awaited by
/// the caller; a failed write is logged and later corrected by the next
/// feed push.
#[derive(Clone)]
pub struct RemoteSync {
    store: Arc<dyn RemoteStore>,
    runtime: Handle,
    writes: mpsc::UnboundedSender<Write>,
    events: broadcast::Sender<StatePayload>,
}

impl RemoteSync {
    pub fn new(store: Arc<dyn RemoteStore>, runtime: Handle) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (writes, queue) = mpsc::unbounded_channel();
        runtime.spawn(run_writer(Arc::clone(&store), queue));
        Self {
            store,
            runtime,
            writes,
            events,
        }
    }

    fn enqueue(&self, op: WriteOp) {
        let write = Write {
            ops: vec![op],
            done: None,
        };
        if let Err(rejected) = self.writes.send(write) {
            for op in &rejected.0.ops {
                log::error!("store writer stopped, dropping {}", op.describe());
            }
        }
    }

    /// Queues `ops` behind every earlier write; the returned future resolves
    /// once they landed or one of them failed.
    ///
    /// The ops are queued by this call itself, not when the future is first
    /// polled, so a caller holding a state lock fixes their position.
    pub fn write_confirmed(
        &self,
        ops: Vec<WriteOp>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send + 'static {
        let (done, reply) = oneshot::channel();
        let queued = self
            .writes
            .send(Write {
                ops,
                done: Some(done),
            })
            .map_err(|_| writer_stopped());
        async move {
            queued?;
            reply.await.map_err(|_| writer_stopped())?
        }
    }

    /// Resolves once every write issued before the call has been attempted.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.write_confirmed(Vec::new()).await
    }

    /// Every `state_updated` payload emitted after this call.
    pub fn state_events(&self) -> broadcast::Receiver<StatePayload> {
        self.events.subscribe()
    }

    pub async fn load_tasks_or_default(&self) -> Vec<Task> {
        match self.store.load_tasks().await {
            Ok(tasks) => tasks,
            Err(error) => {
                log::error!("initial task load failed: {error}");
                Vec::new()
            }
        }
    }

    pub async fn load_user_or_default(&self) -> User {
        match self.store.load_user().await {
            Ok(Some(user)) => user,
            Ok(None) => {
                log::info!("no stored profile; starting from an empty one");
                User::default()
            }
            Err(error) => {
                log::error!("initial profile load failed: {error}");
                User::default()
            }
        }
    }

    /// Seeds the default catalog when the store holds none.
    pub async fn load_shop_items_or_default(&self) -> Vec<ShopItem> {
        match self.store.load_shop_items().await {
            Ok(items) if !items.is_empty() => items,
            Ok(_) => {
                let items = default_shop_items();
                self.save_shop_items(&items);
                items
            }
            Err(error) => {
                log::error!("catalog load failed: {error}");
                default_shop_items()
            }
        }
    }

    /// Replaces local tasks with every pushed set.
    ///
    /// Subscribes before spawning so no push between the call and the first
    /// poll is missed.
    pub fn spawn_task_listener(&self, state: AppState) -> JoinHandle<()> {
        let mut feed = self.store.subscribe_tasks();
        let sync = self.clone();
        self.runtime.spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(tasks) => {
                        let count = tasks.len();
                        if state.apply_remote_tasks(tasks) {
                            log::debug!("task feed applied count={count}");
                            sync.emit_state_updated(state.snapshot());
                        }
                    }
                    // Each push is a full set, so the next one supersedes what was skipped.
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("task feed lagged skipped={skipped}");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            log::info!("task feed closed");
        })
    }

    pub fn spawn_user_listener(&self, state: AppState) -> JoinHandle<()> {
        let mut feed = self.store.subscribe_user();
        let sync = self.clone();
        self.runtime.spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(user) => {
                        if state.apply_remote_user(user) {
                            sync.emit_state_updated(state.snapshot());
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("user feed lagged skipped={skipped}");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            log::info!("user feed closed");
        })
    }
}

impl CommandCtx for RemoteSync {
    fn save_task(&self, task: &Task) {
        self.enqueue(WriteOp::SaveTask(task.clone()));
    }

    fn delete_task(&self, task_id: &str) {
        self.enqueue(WriteOp::DeleteTask(task_id.to_string()));
    }

    fn save_user(&self, user: &User) {
        self.enqueue(WriteOp::SaveUser(user.clone()));
    }

    fn save_shop_items(&self, items: &[ShopItem]) {
        self.enqueue(WriteOp::SaveShopItems(items.to_vec()));
    }

    fn emit_state_updated(&self, payload: StatePayload) {
        log::trace!("{EVENT_STATE_UPDATED} tasks={}", payload.tasks.len());
        // No subscribers is fine.
        let _ = self.events.send(payload);
    }
}
