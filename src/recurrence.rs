use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveTime, TimeZone};

use crate::models::{Task, TaskStatus, Weekday};

/// Calendar date of `now` in its own zone, `YYYY-MM-DD`.
pub fn day_key<Tz: TimeZone>(now: &DateTime<Tz>) -> String {
    now.date_naive().format("%Y-%m-%d").to_string()
}

pub fn weekday_of<Tz: TimeZone>(now: &DateTime<Tz>) -> Weekday {
    now.weekday().into()
}

/// The next local midnight after `now`, plus `buffer`.
pub fn next_boundary<Tz: TimeZone>(now: &DateTime<Tz>, buffer: Duration) -> DateTime<Tz> {
    let fallback = now.clone() + Duration::days(1);
    let Some(tomorrow) = now.date_naive().succ_opt() else {
        return fallback + buffer;
    };
    let midnight = tomorrow.and_time(NaiveTime::MIN);
    let tz = now.timezone();
    let boundary = match tz.from_local_datetime(&midnight) {
        LocalResult::Single(at) => at,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // Midnight falls into a DST gap; take the first hour that exists.
        LocalResult::None => tz
            .from_local_datetime(&(midnight + Duration::hours(1)))
            .earliest()
            .unwrap_or(fallback),
    };
    boundary + buffer
}

pub fn until<Tz: TimeZone>(now: &DateTime<Tz>, at: &DateTime<Tz>) -> std::time::Duration {
    (at.clone() - now.clone())
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}

/// One-off tasks are always shown; recurring ones only on their weekdays.
pub fn is_visible_on(task: &Task, today: Weekday) -> bool {
    !task.is_recurring() || task.frequency.contains(&today)
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CategoryGroup {
    pub category: String,
    pub tasks: Vec<Task>,
}

/// Tasks shown in the `status` column on `today`, grouped by category in
/// first-seen order.
pub fn column(tasks: &[Task], status: TaskStatus, today: Weekday) -> Vec<CategoryGroup> {
    let mut groups: Vec<CategoryGroup> = Vec::new();
    for task in tasks
        .iter()
        .filter(|task| task.status == status && is_visible_on(task, today))
    {
        let label = task.category_label();
        match groups.iter_mut().find(|group| group.category == label) {
            Some(group) => group.tasks.push(task.clone()),
            None => groups.push(CategoryGroup {
                category: label.to_string(),
                tasks: vec![task.clone()],
            }),
        }
    }
    groups
}
