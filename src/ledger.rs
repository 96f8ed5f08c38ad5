//! Points ledger.
//!
//! Each operation takes the current user snapshot and returns the next one;
//! nothing is mutated in place. `score` must always equal the starting score
//! plus the sum of `point_logs[].change`.

use crate::error::CoreError;
use crate::models::{
    new_id, PointLog, ShopItem, Task, TaskStatus, Timestamp, Transaction, TransactionKind, User,
};

fn with_log(user: &User, reason: String, change: i64, now: Timestamp) -> User {
    let mut next = user.clone();
    next.score = next.score.saturating_add(change);
    next.point_logs.push(PointLog {
        id: new_id("pl"),
        reason,
        change,
        timestamp: now,
    });
    next
}

/// Credits `task.points` when the task moves into COMPLETED.
///
/// Returns `None` when `previous` already was COMPLETED or the task did not
/// end up COMPLETED, so repeated approvals never pay twice.
pub fn complete(user: &User, previous: TaskStatus, task: &Task, now: Timestamp) -> Option<User> {
    if previous == TaskStatus::Completed || task.status != TaskStatus::Completed {
        return None;
    }
    let mut next = with_log(user, format!("Completed: {}", task.title), task.points, now);
    next.today_score = next.today_score.saturating_add(task.points);
    Some(next)
}

/// Size of the debit `penalize` applies for `task`.
pub fn penalty_magnitude(task: &Task) -> i64 {
    // |i64::MIN| does not fit; clamp it.
    i64::try_from(task.points.unsigned_abs()).unwrap_or(i64::MAX)
}

/// Debits `|task.points|` regardless of the sign stored on the task.
pub fn penalize(user: &User, task: &Task, now: Timestamp) -> User {
    let magnitude = penalty_magnitude(task);
    let mut next = with_log(user, format!("Penalty: {}", task.title), -magnitude, now);
    next.today_score = next.today_score.saturating_sub(magnitude);
    next
}

pub fn purchase(user: &User, item: &ShopItem, now: Timestamp) -> Result<User, CoreError> {
    let cost = i64::from(item.cost);
    if user.score < cost {
        return Err(CoreError::InsufficientFunds {
            balance: user.score,
            cost: item.cost,
        });
    }
    let mut next = with_log(user, format!("Bought: {}", item.name), -cost, now);
    next.inventory.push(item.id.clone());
    next.history
        .insert(0, transaction(TransactionKind::Purchase, item, now));
    Ok(next)
}

/// Consumes one unit of `item` from the inventory. `None` when the item is
/// not held. Redemption never touches the score.
pub fn redeem(user: &User, item: &ShopItem, now: Timestamp) -> Option<User> {
    let index = user.inventory.iter().position(|id| *id == item.id)?;
    let mut next = user.clone();
    next.inventory.remove(index);
    next.history
        .insert(0, transaction(TransactionKind::Redeem, item, now));
    Some(next)
}

fn transaction(kind: TransactionKind, item: &ShopItem, now: Timestamp) -> Transaction {
    Transaction {
        id: new_id("tx"),
        kind,
        item_id: item.id.clone(),
        item_name: item.name.clone(),
        item_emoji: item.emoji.clone(),
        cost: item.cost,
        timestamp: now,
    }
}

/// Net of every logged change.
pub fn logged_total(user: &User) -> i64 {
    user.point_logs
        .iter()
        .fold(0i64, |total, log| total.saturating_add(log.change))
}

pub fn balance_matches(user: &User, initial: i64) -> bool {
    user.score == initial.saturating_add(logged_total(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use std::collections::BTreeSet;

    fn make_task(points: i64, status: TaskStatus) -> Task {
        Task {
            id: "task_1".into(),
            title: "Dishes".into(),
            description: String::new(),
            points,
            status,
            category: String::new(),
            frequency: BTreeSet::new(),
            messages: Vec::new(),
        }
    }

    fn make_item(id: &str, cost: u32) -> ShopItem {
        ShopItem {
            id: id.into(),
            name: format!("item-{id}"),
            cost,
            emoji: "🎁".into(),
            description: String::new(),
        }
    }

    fn user_with_score(score: i64) -> User {
        let mut user = User::default();
        user.score = score;
        user
    }

    #[test]
    fn complete_credits_points_once() {
        let user = User::default();
        let task = make_task(40, TaskStatus::Completed);

        let paid = complete(&user, TaskStatus::Review, &task, 10).expect("credited");
        assert_eq!(paid.score, 40);
        assert_eq!(paid.today_score, 40);
        assert_eq!(paid.point_logs.len(), 1);
        assert_eq!(paid.point_logs[0].reason, "Completed: Dishes");
        assert_eq!(paid.point_logs[0].change, 40);

        assert!(complete(&paid, TaskStatus::Completed, &task, 11).is_none());
        assert!(complete(&paid, TaskStatus::Review, &make_task(40, TaskStatus::TryAgain), 11)
            .is_none());
    }

    #[test]
    fn penalize_always_debits_the_magnitude() {
        let user = user_with_score(100);
        for points in [30, -30] {
            let next = penalize(&user, &make_task(points, TaskStatus::Penalty), 5);
            assert_eq!(next.score, 70);
            assert_eq!(next.today_score, -30);
            let log = next.point_logs.last().unwrap();
            assert_eq!(log.change, -30);
            assert_eq!(log.reason, "Penalty: Dishes");
        }
    }

    #[test]
    fn penalize_clamps_the_most_negative_points() {
        let user = user_with_score(-10);
        let next = penalize(&user, &make_task(i64::MIN, TaskStatus::Penalty), 5);
        assert_eq!(next.point_logs[0].change, -i64::MAX);
        assert_eq!(next.score, i64::MIN);
        assert_eq!(next.today_score, -i64::MAX);
        assert_eq!(penalty_magnitude(&make_task(-7, TaskStatus::Penalty)), 7);
    }

    #[test]
    fn complete_then_penalize_keeps_balance_in_line_with_logs() {
        let user = User::default();
        let task = make_task(25, TaskStatus::Completed);
        let user = complete(&user, TaskStatus::Todo, &task, 1).unwrap();
        let user = penalize(&user, &task, 2);
        assert!(complete(&user, TaskStatus::Completed, &task, 3).is_none());
        assert_eq!(user.score, 0);
        assert!(balance_matches(&user, 0));
    }

    #[test]
    fn purchase_with_insufficient_funds_changes_nothing() {
        let user = user_with_score(100);
        let err = purchase(&user, &make_item("a", 150), 1).unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientFunds {
                balance: 100,
                cost: 150
            }
        );
        assert_eq!(user.score, 100);
        assert!(user.history.is_empty());
    }

    #[test]
    fn purchase_debits_cost_and_records_transaction_and_log() {
        let user = user_with_score(200);
        let next = purchase(&user, &make_item("a", 150), 7).unwrap();
        assert_eq!(next.score, 50);
        assert_eq!(next.today_score, 0);
        assert_eq!(next.inventory, vec!["a".to_string()]);
        assert_eq!(next.history.len(), 1);
        assert_eq!(next.history[0].kind, TransactionKind::Purchase);
        assert_eq!(next.history[0].cost, 150);
        assert_eq!(next.point_logs.len(), 1);
        assert_eq!(next.point_logs[0].change, -150);
        assert_eq!(next.point_logs[0].reason, "Bought: item-a");
        assert!(balance_matches(&next, 200));
    }

    #[test]
    fn purchase_history_is_newest_first() {
        let user = user_with_score(500);
        let user = purchase(&user, &make_item("a", 100), 1).unwrap();
        let user = purchase(&user, &make_item("b", 100), 2).unwrap();
        assert_eq!(user.history[0].item_id, "b");
        assert_eq!(user.history[1].item_id, "a");
        assert_eq!(user.inventory, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn redeem_removes_exactly_one_unit() {
        let mut user = user_with_score(10);
        user.inventory = vec!["itemA".into(), "itemA".into()];
        let next = redeem(&user, &make_item("itemA", 150), 3).unwrap();
        assert_eq!(next.inventory, vec!["itemA".to_string()]);
        assert_eq!(next.score, 10);
        assert!(next.point_logs.is_empty());
        assert_eq!(next.history[0].kind, TransactionKind::Redeem);

        assert!(redeem(&user, &make_item("missing", 1), 3).is_none());
    }

    #[test]
    fn balance_matches_detects_drift() {
        let mut user = user_with_score(0);
        user.role = Role::Admin;
        let user = penalize(&user, &make_task(10, TaskStatus::Penalty), 1);
        assert!(balance_matches(&user, 0));
        let mut drifted = user.clone();
        drifted.score += 1;
        assert!(!balance_matches(&drifted, 0));
        assert_eq!(logged_total(&user), -10);
    }
}
