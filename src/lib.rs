pub mod auth;
pub mod commands;
pub mod error;
pub mod events;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod recurrence;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod stats;
pub mod storage;
pub mod store;
pub mod sync;
pub mod transition;

pub use session::Session;
