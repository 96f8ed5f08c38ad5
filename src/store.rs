use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::{ShopItem, Task, User};

const FEED_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The remote document store the core persists through.
///
/// Task and user feeds push the complete current value after every change,
/// whoever made it. Dropping a receiver unsubscribes.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn load_tasks(&self) -> Result<Vec<Task>, StoreError>;
    fn subscribe_tasks(&self) -> broadcast::Receiver<Vec<Task>>;
    /// Field-merge upsert of a single task document.
    async fn save_task(&self, task: &Task) -> Result<(), StoreError>;
    /// Upserts every task given; tasks not listed are left alone.
    async fn save_tasks(&self, tasks: &[Task]) -> Result<(), StoreError>;
    /// Deleting a missing id succeeds.
    async fn delete_task(&self, task_id: &str) -> Result<(), StoreError>;

    async fn load_user(&self) -> Result<Option<User>, StoreError>;
    fn subscribe_user(&self) -> broadcast::Receiver<User>;
    async fn save_user(&self, user: &User) -> Result<(), StoreError>;

    async fn load_shop_items(&self) -> Result<Vec<ShopItem>, StoreError>;
    async fn save_shop_items(&self, items: &[ShopItem]) -> Result<(), StoreError>;
}

/// Overwrites the top-level fields present in `patch`; fields absent from
/// `patch` keep their stored value.
pub fn merge_fields(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                base.insert(key, value);
            }
        }
        (base, patch) => *base = patch,
    }
}

pub(crate) fn document_id(doc: &Value) -> Option<&str> {
    doc.get("id").and_then(Value::as_str)
}

/// Upserts `patch` into `docs` by id, merging fields when the id exists.
pub(crate) fn upsert_document(docs: &mut Vec<Value>, patch: Value) {
    let index = document_id(&patch)
        .and_then(|id| docs.iter().position(|doc| document_id(doc) == Some(id)));
    match index {
        Some(index) => merge_fields(&mut docs[index], patch),
        None => docs.push(patch),
    }
}

/// Decodes stored documents, skipping (and logging) any that no longer parse.
pub(crate) fn decode_documents<T: DeserializeOwned>(docs: &[Value]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match serde_json::from_value(doc.clone()) {
            Ok(value) => Some(value),
            Err(error) => {
                log::warn!(
                    "skipping undecodable document id={:?} error={error}",
                    document_id(doc)
                );
                None
            }
        })
        .collect()
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(value)?)
}

/// In-process store. Also stands in for "another device" in tests through
/// [`MemoryStore::push_remote_tasks`].
pub struct MemoryStore {
    tasks: Mutex<Vec<Value>>,
    user: Mutex<Option<User>>,
    shop_items: Mutex<Vec<ShopItem>>,
    offline: AtomicBool,
    task_feed: broadcast::Sender<Vec<Task>>,
    user_feed: broadcast::Sender<User>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (task_feed, _) = broadcast::channel(FEED_CAPACITY);
        let (user_feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            tasks: Mutex::new(Vec::new()),
            user: Mutex::new(None),
            shop_items: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            task_feed,
            user_feed,
        }
    }

    pub fn with_tasks(tasks: &[Task]) -> Result<Self, StoreError> {
        let store = Self::new();
        {
            let mut docs = store.tasks.lock().expect("store poisoned");
            for task in tasks {
                docs.push(encode(task)?);
            }
        }
        Ok(store)
    }

    /// Makes every call fail with `StoreError::Unavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Replaces the whole collection as if another writer did it, and pushes.
    pub fn push_remote_tasks(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let docs = tasks.iter().map(encode).collect::<Result<Vec<_>, _>>()?;
        *self.tasks.lock().expect("store poisoned") = docs;
        self.notify_tasks();
        Ok(())
    }

    pub fn stored_tasks(&self) -> Vec<Task> {
        decode_documents(&self.tasks.lock().expect("store poisoned"))
    }

    pub fn stored_user(&self) -> Option<User> {
        self.user.lock().expect("store poisoned").clone()
    }

    pub fn stored_shop_items(&self) -> Vec<ShopItem> {
        self.shop_items.lock().expect("store poisoned").clone()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    fn notify_tasks(&self) {
        // No receivers is fine.
        let _ = self.task_feed.send(self.stored_tasks());
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn load_tasks(&self) -> Result<Vec<Task>, StoreError> {
        self.check_online()?;
        Ok(self.stored_tasks())
    }

    fn subscribe_tasks(&self) -> broadcast::Receiver<Vec<Task>> {
        self.task_feed.subscribe()
    }

    async fn save_task(&self, task: &Task) -> Result<(), StoreError> {
        self.check_online()?;
        let doc = encode(task)?;
        upsert_document(&mut self.tasks.lock().expect("store poisoned"), doc);
        self.notify_tasks();
        Ok(())
    }

    async fn save_tasks(&self, tasks: &[Task]) -> Result<(), StoreError> {
        self.check_online()?;
        {
            let mut docs = self.tasks.lock().expect("store poisoned");
            for task in tasks {
                upsert_document(&mut docs, encode(task)?);
            }
        }
        self.notify_tasks();
        Ok(())
    }

    async fn delete_task(&self, task_id: &str) -> Result<(), StoreError> {
        self.check_online()?;
        self.tasks
            .lock()
            .expect("store poisoned")
            .retain(|doc| document_id(doc) != Some(task_id));
        self.notify_tasks();
        Ok(())
    }

    async fn load_user(&self) -> Result<Option<User>, StoreError> {
        self.check_online()?;
        Ok(self.stored_user())
    }

    fn subscribe_user(&self) -> broadcast::Receiver<User> {
        self.user_feed.subscribe()
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        self.check_online()?;
        *self.user.lock().expect("store poisoned") = Some(user.clone());
        let _ = self.user_feed.send(user.clone());
        Ok(())
    }

    async fn load_shop_items(&self) -> Result<Vec<ShopItem>, StoreError> {
        self.check_online()?;
        Ok(self.stored_shop_items())
    }

    async fn save_shop_items(&self, items: &[ShopItem]) -> Result<(), StoreError> {
        self.check_online()?;
        *self.shop_items.lock().expect("store poisoned") = items.to_vec();
        Ok(())
    }
}
