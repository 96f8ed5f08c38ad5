use chrono::{DateTime, Duration, Local, TimeZone};
use tokio::task::JoinHandle;

use crate::commands::CommandCtx;
use crate::models::{default_boundary_buffer_secs, Settings, Task, TaskStatus, User, Weekday};
use crate::recurrence::{day_key, next_boundary, until, weekday_of};
use crate::state::AppState;
use crate::store::StoreError;
use crate::sync::{RemoteSync, WriteOp};

/// What one boundary application will write.
#[derive(Debug, Clone, PartialEq)]
pub struct ResetPlan {
    pub today_key: String,
    pub today: Weekday,
    /// The full surviving task set after the reset.
    pub tasks: Vec<Task>,
    pub deletions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    AlreadyApplied,
    Applied { deleted: usize, reset: usize },
}

/// Computes the reset for `today_key`, or `None` when it was already applied.
///
/// Finished one-off tasks are dropped. Everything else returns to TODO with
/// its thread cleared, except PENALTY which only an admin can lift.
pub fn plan_reset(tasks: &[Task], user: &User, today_key: &str, today: Weekday) -> Option<ResetPlan> {
    if user.last_cleanup_date.as_deref() == Some(today_key) {
        return None;
    }
    let mut kept = Vec::with_capacity(tasks.len());
    let mut deletions = Vec::new();
    for task in tasks {
        if !task.is_recurring() && task.status == TaskStatus::Completed {
            deletions.push(task.id.clone());
            continue;
        }
        let mut task = task.clone();
        if task.status != TaskStatus::Penalty {
            task.status = TaskStatus::Todo;
            task.messages.clear();
        }
        kept.push(task);
    }
    Some(ResetPlan {
        today_key: today_key.to_string(),
        today,
        tasks: kept,
        deletions,
    })
}

/// Moves local tasks to their planned state. Tasks edited since `before`
/// was taken keep the local edit; the next feed push settles any difference.
fn apply_plan(tasks: &mut Vec<Task>, before: &[Task], plan: &ResetPlan) {
    tasks.retain_mut(|task| {
        if !before.contains(task) {
            return true;
        }
        if plan.deletions.contains(&task.id) {
            return false;
        }
        if let Some(planned) = plan.tasks.iter().find(|planned| planned.id == task.id) {
            *task = planned.clone();
        }
        true
    });
}

/// Applies the boundary for `now` if it has not been applied yet.
///
/// Deletes and the surviving task set go out first, through the same writer
/// as command writes. Local tasks follow once those landed. The cleanup
/// marker is then set on the live profile, so purchases or credits committed
/// meanwhile are kept, and it is rolled back if the profile write fails.
pub async fn perform_reset<Tz: TimeZone>(
    sync: &RemoteSync,
    state: &AppState,
    now: &DateTime<Tz>,
) -> Result<ResetOutcome, StoreError> {
    let today_key = day_key(now);
    let today = weekday_of(now);
    let before = state.tasks();
    let Some(plan) = plan_reset(&before, &state.user(), &today_key, today) else {
        state.set_current_day(today);
        return Ok(ResetOutcome::AlreadyApplied);
    };

    let mut ops: Vec<WriteOp> = plan.deletions.iter().cloned().map(WriteOp::DeleteTask).collect();
    ops.push(WriteOp::SaveTasks(plan.tasks.clone()));
    sync.write_confirmed(ops).await?;
    state.update_tasks(|tasks| apply_plan(tasks, &before, &plan));

    let (committed, previous, pending) = state.update_user(|user| {
        let previous = (user.last_cleanup_date.take(), user.today_score);
        user.last_cleanup_date = Some(plan.today_key.clone());
        user.today_score = 0;
        let pending = sync.write_confirmed(vec![WriteOp::SaveUser(user.clone())]);
        (user.clone(), previous, pending)
    });
    if let Err(error) = pending.await {
        state.update_user(|user| {
            // A later commit has already queued a profile carrying the marker.
            if *user == committed {
                (user.last_cleanup_date, user.today_score) = previous;
            }
        });
        return Err(error);
    }

    let outcome = ResetOutcome::Applied {
        deleted: plan.deletions.len(),
        reset: plan
            .tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Todo)
            .count(),
    };
    state.set_current_day(plan.today);
    log::info!("daily reset applied day={} outcome={outcome:?}", plan.today_key);
    Ok(outcome)
}

/// Delay past midnight before the reset runs. Out-of-range settings fall
/// back to the default.
fn boundary_buffer(settings: &Settings) -> Duration {
    let configured = i64::try_from(settings.boundary_buffer_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .filter(|buffer| *buffer < Duration::hours(1));
    configured.unwrap_or_else(|| {
        log::warn!(
            "boundary_buffer_secs={} out of range, using {}",
            settings.boundary_buffer_secs,
            default_boundary_buffer_secs()
        );
        Duration::seconds(default_boundary_buffer_secs() as i64)
    })
}

/// Runs a reset now, then again after every local midnight.
pub fn start_scheduler(sync: RemoteSync, state: AppState, settings: &Settings) -> JoinHandle<()> {
    let buffer = boundary_buffer(settings);
    let retry = std::time::Duration::from_secs(settings.reset_retry_secs);
    tokio::spawn(async move {
        loop {
            let now = Local::now();
            let delay = match perform_reset(&sync, &state, &now).await {
                Ok(outcome) => {
                    if outcome != ResetOutcome::AlreadyApplied {
                        sync.emit_state_updated(state.snapshot());
                    }
                    let at = next_boundary(&now, buffer);
                    log::debug!("next reset at {}", at.to_rfc3339());
                    until(&now, &at)
                }
                Err(error) => {
                    log::error!(
                        "daily reset failed day={} retry_in_secs={} error={error}",
                        day_key(&now),
                        retry.as_secs()
                    );
                    retry
                }
            };
            tokio::time::sleep(delay).await;
        }
    })
}
