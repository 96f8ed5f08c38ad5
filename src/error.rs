use thiserror::Error;

use crate::models::{Role, TaskStatus};

/// Domain rejections. Neither variant mutates state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("{role:?} cannot {action} a task in {status:?}")]
    InvalidTransition {
        role: Role,
        status: TaskStatus,
        action: &'static str,
    },
    #[error("insufficient funds: balance {balance}, cost {cost}")]
    InsufficientFunds { balance: i64, cost: u32 },
}
