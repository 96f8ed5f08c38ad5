use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{
    Settings, SettingsFile, ShopFile, ShopItem, Task, TasksFile, User, UserFile,
};
use crate::store::{decode_documents, document_id, encode, upsert_document, RemoteStore, StoreError};

const SCHEMA_VERSION: u32 = 1;
const TASKS_FILE: &str = "tasks.json";
const USER_FILE: &str = "user.json";
const SHOP_FILE: &str = "shop.json";
const SETTINGS_FILE: &str = "settings.json";
const FEED_CAPACITY: usize = 64;

/// JSON-file store rooted at a data directory. Every write goes through a
/// temp file and a rename, and is followed by a push on the matching feed.
///
/// The async methods run their file work on the blocking pool.
pub struct FileStore {
    files: Arc<Files>,
}

struct Files {
    root: PathBuf,
    write_lock: Mutex<()>,
    task_feed: broadcast::Sender<Vec<Task>>,
    user_feed: broadcast::Sender<User>,
}

impl FileStore {
    pub fn new(root: PathBuf) -> Self {
        let (task_feed, _) = broadcast::channel(FEED_CAPACITY);
        let (user_feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            files: Arc::new(Files {
                root,
                write_lock: Mutex::new(()),
                task_feed,
                user_feed,
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.files.root
    }

    pub fn ensure_dirs(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.files.root)?;
        Ok(())
    }

    pub fn load_settings(&self) -> Result<SettingsFile, StoreError> {
        self.files.load_json(self.files.root.join(SETTINGS_FILE))
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        let data = SettingsFile {
            schema_version: SCHEMA_VERSION,
            settings: settings.clone(),
        };
        let _guard = self.files.write_lock.lock().expect("store poisoned");
        self.files.write_atomic(self.files.root.join(SETTINGS_FILE), &data)
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Files) -> Result<T, StoreError> + Send + 'static,
    {
        let files = Arc::clone(&self.files);
        tokio::task::spawn_blocking(move || work(&files))
            .await
            .map_err(|e| StoreError::Unavailable(format!("file task join error: {e}")))?
    }
}

impl Files {
    fn load_json<T: DeserializeOwned>(&self, path: PathBuf) -> Result<T, StoreError> {
        let mut file = File::open(path)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Ok(serde_json::from_str(&buf)?)
    }

    /// Missing file reads as `None`; anything else unreadable is an error.
    fn load_optional<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StoreError> {
        match self.load_json(self.root.join(name)) {
            Ok(data) => Ok(Some(data)),
            Err(StoreError::Io(io)) if io.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn write_atomic<T: Serialize>(&self, path: PathBuf, data: &T) -> Result<(), StoreError> {
        let temp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(data)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(temp_path, path)?;
        Ok(())
    }

    fn read_task_docs(&self) -> Result<TasksFile, StoreError> {
        Ok(self
            .load_optional::<TasksFile>(TASKS_FILE)?
            .unwrap_or(TasksFile {
                schema_version: SCHEMA_VERSION,
                tasks: Vec::new(),
            }))
    }

    /// Read-modify-write of the task collection under the write lock. The
    /// push is sent before the lock is released, so pushes follow file order.
    fn modify_tasks(&self, apply: impl FnOnce(&mut TasksFile)) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().expect("store poisoned");
        let mut data = self.read_task_docs()?;
        apply(&mut data);
        data.schema_version = SCHEMA_VERSION;
        self.write_atomic(self.root.join(TASKS_FILE), &data)?;
        // No subscribers is fine.
        let _ = self.task_feed.send(decode_documents::<Task>(&data.tasks));
        Ok(())
    }

    fn write_user(&self, user: User) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().expect("store poisoned");
        let data = UserFile {
            schema_version: SCHEMA_VERSION,
            user,
        };
        self.write_atomic(self.root.join(USER_FILE), &data)?;
        let _ = self.user_feed.send(data.user);
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FileStore {
    async fn load_tasks(&self) -> Result<Vec<Task>, StoreError> {
        self.blocking(|files| Ok(decode_documents(&files.read_task_docs()?.tasks)))
            .await
    }

    fn subscribe_tasks(&self) -> broadcast::Receiver<Vec<Task>> {
        self.files.task_feed.subscribe()
    }

    async fn save_task(&self, task: &Task) -> Result<(), StoreError> {
        let doc = encode(task)?;
        self.blocking(move |files| files.modify_tasks(|data| upsert_document(&mut data.tasks, doc)))
            .await
    }

    async fn save_tasks(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let docs = tasks.iter().map(encode).collect::<Result<Vec<_>, _>>()?;
        self.blocking(move |files| {
            files.modify_tasks(|data| {
                for doc in docs {
                    upsert_document(&mut data.tasks, doc);
                }
            })
        })
        .await
    }

    async fn delete_task(&self, task_id: &str) -> Result<(), StoreError> {
        let task_id = task_id.to_string();
        self.blocking(move |files| {
            files.modify_tasks(|data| {
                data.tasks
                    .retain(|doc| document_id(doc) != Some(task_id.as_str()))
            })
        })
        .await
    }

    async fn load_user(&self) -> Result<Option<User>, StoreError> {
        self.blocking(|files| Ok(files.load_optional::<UserFile>(USER_FILE)?.map(|data| data.user)))
            .await
    }

    fn subscribe_user(&self) -> broadcast::Receiver<User> {
        self.files.user_feed.subscribe()
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let user = user.clone();
        self.blocking(move |files| files.write_user(user)).await
    }

    async fn load_shop_items(&self) -> Result<Vec<ShopItem>, StoreError> {
        self.blocking(|files| {
            Ok(files
                .load_optional::<ShopFile>(SHOP_FILE)?
                .map(|data| data.items)
                .unwrap_or_default())
        })
        .await
    }

    async fn save_shop_items(&self, items: &[ShopItem]) -> Result<(), StoreError> {
        let data = ShopFile {
            schema_version: SCHEMA_VERSION,
            items: items.to_vec(),
        };
        self.blocking(move |files| {
            let _guard = files.write_lock.lock().expect("store poisoned");
            files.write_atomic(files.root.join(SHOP_FILE), &data)
        })
        .await
    }
}
