use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use levelup_lib::events::EVENT_STATE_UPDATED;
use levelup_lib::logging::init_logging;
use levelup_lib::models::Settings;
use levelup_lib::storage::FileStore;
use levelup_lib::store::{RemoteStore, StoreError};
use levelup_lib::Session;

const DEFAULT_DATA_DIR: &str = "levelup-data";

fn data_dir() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("LEVELUP_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

fn load_settings(store: &FileStore) -> Settings {
    match store.load_settings() {
        Ok(data) => data.settings,
        Err(StoreError::Io(error)) if error.kind() == std::io::ErrorKind::NotFound => {
            let settings = Settings::default();
            if let Err(error) = store.save_settings(&settings) {
                log::warn!("failed to write default settings: {error}");
            }
            settings
        }
        Err(error) => {
            log::warn!("settings unreadable, using defaults: {error}");
            Settings::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let root = data_dir();
    init_logging(&root)?;

    let store = FileStore::new(root);
    store.ensure_dirs()?;
    let settings = load_settings(&store);
    log::info!("data dir {}", store.root().display());

    let store: Arc<dyn RemoteStore> = Arc::new(store);
    let mut session = Session::start(store, settings).await;

    let mut events = session.ctx().state_events();
    let watcher = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(payload) => log::debug!(
                    "{EVENT_STATE_UPDATED} tasks={} score={} day={:?}",
                    payload.tasks.len(),
                    payload.user.score,
                    payload.current_day
                ),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    log::info!("shutting down");
    watcher.abort();
    session.shutdown();
    if let Err(error) = session.ctx().flush().await {
        log::warn!("pending writes not flushed: {error}");
    }
    Ok(())
}
