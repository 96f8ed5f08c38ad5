//! Role-gated task status transitions.
//!
//! Every legal move is listed in [`next_status`]; anything else is rejected
//! with [`CoreError::InvalidTransition`] and leaves the task untouched.

use crate::error::CoreError;
use crate::models::{Role, TaskStatus};

/// The three ways an admin can close a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Revert,
    TryAgain,
    Approve,
}

impl ReviewVerdict {
    pub fn status(self) -> TaskStatus {
        match self {
            ReviewVerdict::Revert => TaskStatus::Todo,
            ReviewVerdict::TryAgain => TaskStatus::TryAgain,
            ReviewVerdict::Approve => TaskStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    /// Client hands in work for review.
    Submit,
    /// Admin closes a pending review.
    Review(ReviewVerdict),
    /// Admin edit form; any status, any time.
    Override(TaskStatus),
    /// Message without a status change.
    Note,
    /// Admin debits a penalized task.
    Punish,
}

impl TaskAction {
    fn name(self) -> &'static str {
        match self {
            TaskAction::Submit => "submit",
            TaskAction::Review(_) => "review",
            TaskAction::Override(_) => "override",
            TaskAction::Note => "note",
            TaskAction::Punish => "punish",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: TaskStatus,
    /// Completion and punishment end the interactive session on the task.
    pub closes_session: bool,
}

impl Transition {
    fn stay(status: TaskStatus) -> Self {
        Self {
            status,
            closes_session: false,
        }
    }
}

pub fn next_status(
    role: Role,
    current: TaskStatus,
    action: TaskAction,
) -> Result<Transition, CoreError> {
    use TaskStatus::*;

    let transition = match (role, current, action) {
        (Role::Client, Todo | TryAgain, TaskAction::Submit) => Transition::stay(Review),
        (Role::Admin, Review, TaskAction::Review(verdict)) => {
            let status = verdict.status();
            Transition {
                status,
                closes_session: status == Completed,
            }
        }
        (Role::Admin, _, TaskAction::Override(status)) => Transition::stay(status),
        (Role::Admin, status, TaskAction::Note) => Transition::stay(status),
        (Role::Client, Penalty, TaskAction::Note) => Transition::stay(Penalty),
        (Role::Admin, Penalty, TaskAction::Punish) => Transition {
            status: Penalty,
            closes_session: true,
        },
        (role, status, action) => {
            return Err(CoreError::InvalidTransition {
                role,
                status,
                action: action.name(),
            })
        }
    };
    Ok(transition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_submit_moves_open_tasks_into_review() {
        for status in [TaskStatus::Todo, TaskStatus::TryAgain] {
            let t = next_status(Role::Client, status, TaskAction::Submit).unwrap();
            assert_eq!(t.status, TaskStatus::Review);
            assert!(!t.closes_session);
        }
    }

    #[test]
    fn client_cannot_submit_under_review_completed_or_penalty() {
        for status in [TaskStatus::Review, TaskStatus::Completed, TaskStatus::Penalty] {
            let err = next_status(Role::Client, status, TaskAction::Submit).unwrap_err();
            assert!(matches!(err, CoreError::InvalidTransition { role: Role::Client, .. }));
        }
    }

    #[test]
    fn admin_review_verdicts_map_to_target_status() {
        let cases = [
            (ReviewVerdict::Revert, TaskStatus::Todo, false),
            (ReviewVerdict::TryAgain, TaskStatus::TryAgain, false),
            (ReviewVerdict::Approve, TaskStatus::Completed, true),
        ];
        for (verdict, expected, closes) in cases {
            let t = next_status(Role::Admin, TaskStatus::Review, TaskAction::Review(verdict))
                .unwrap();
            assert_eq!(t.status, expected);
            assert_eq!(t.closes_session, closes);
        }
    }

    #[test]
    fn review_outside_review_status_is_rejected() {
        let err = next_status(
            Role::Admin,
            TaskStatus::Todo,
            TaskAction::Review(ReviewVerdict::Approve),
        )
        .unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidTransition {
                role: Role::Admin,
                status: TaskStatus::Todo,
                action: "review",
            }
        );
        assert!(next_status(
            Role::Client,
            TaskStatus::Review,
            TaskAction::Review(ReviewVerdict::Approve)
        )
        .is_err());
    }

    #[test]
    fn admin_override_reaches_every_status_from_every_status() {
        for from in TaskStatus::ALL {
            for to in TaskStatus::ALL {
                let t = next_status(Role::Admin, from, TaskAction::Override(to)).unwrap();
                assert_eq!(t.status, to);
            }
        }
        assert!(next_status(
            Role::Client,
            TaskStatus::Todo,
            TaskAction::Override(TaskStatus::Completed)
        )
        .is_err());
    }

    #[test]
    fn penalty_only_allows_notes_and_punishment() {
        let note = next_status(Role::Client, TaskStatus::Penalty, TaskAction::Note).unwrap();
        assert_eq!(note.status, TaskStatus::Penalty);

        let punish = next_status(Role::Admin, TaskStatus::Penalty, TaskAction::Punish).unwrap();
        assert_eq!(punish.status, TaskStatus::Penalty);
        assert!(punish.closes_session);

        assert!(next_status(Role::Admin, TaskStatus::Todo, TaskAction::Punish).is_err());
        assert!(next_status(Role::Client, TaskStatus::Penalty, TaskAction::Punish).is_err());
        assert!(next_status(Role::Client, TaskStatus::Todo, TaskAction::Note).is_err());
    }
}
