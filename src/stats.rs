//! Read-only views over the point log.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::models::{PointLog, Timestamp};

const RECENT_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsRange {
    Week,
    Month,
    Quarter,
    HalfYear,
}

impl StatsRange {
    pub fn days(self) -> i64 {
        match self {
            StatsRange::Week => 7,
            StatsRange::Month => 30,
            StatsRange::Quarter => 90,
            StatsRange::HalfYear => 180,
        }
    }

    fn cutoff(self, now_ms: Timestamp) -> Timestamp {
        now_ms - Duration::days(self.days()).num_milliseconds()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DailyTotal {
    /// Local calendar day, `YYYY-MM-DD`.
    pub day: String,
    pub total: i64,
}

fn in_range(log: &PointLog, range: StatsRange, now_ms: Timestamp) -> bool {
    log.timestamp >= range.cutoff(now_ms) && log.timestamp <= now_ms
}

fn local_day<Tz: TimeZone>(tz: &Tz, timestamp: Timestamp) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(timestamp)
        .map(|at| at.with_timezone(tz).date_naive().format("%Y-%m-%d").to_string())
}

/// Net change per local day over `range`, oldest day first. Every day from
/// the cutoff through today gets a bucket, empty days included.
pub fn daily_totals<Tz: TimeZone>(
    logs: &[PointLog],
    range: StatsRange,
    now: &DateTime<Tz>,
) -> Vec<DailyTotal> {
    let tz = now.timezone();
    let now_ms = now.timestamp_millis();
    let first = now.date_naive() - Duration::days(range.days());
    let mut buckets: Vec<DailyTotal> = first
        .iter_days()
        .take_while(|day| *day <= now.date_naive())
        .map(|day| DailyTotal {
            day: day.format("%Y-%m-%d").to_string(),
            total: 0,
        })
        .collect();

    for log in logs.iter().filter(|log| in_range(log, range, now_ms)) {
        let Some(day) = local_day(&tz, log.timestamp) else {
            continue;
        };
        if let Some(bucket) = buckets.iter_mut().find(|bucket| bucket.day == day) {
            bucket.total += log.change;
        }
    }
    buckets
}

pub fn is_recent(log: &PointLog, now_ms: Timestamp) -> bool {
    now_ms - log.timestamp <= Duration::days(RECENT_DAYS).num_milliseconds()
}

pub fn logs_newest_first(logs: &[PointLog]) -> Vec<PointLog> {
    let mut sorted = logs.to_vec();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted
}

pub fn earned(logs: &[PointLog], range: StatsRange, now_ms: Timestamp) -> i64 {
    logs.iter()
        .filter(|log| log.change > 0 && in_range(log, range, now_ms))
        .map(|log| log.change)
        .sum()
}

/// Sum of debits over `range`, as a positive number.
pub fn spent(logs: &[PointLog], range: StatsRange, now_ms: Timestamp) -> i64 {
    logs.iter()
        .filter(|log| log.change < 0 && in_range(log, range, now_ms))
        .map(|log| -log.change)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Asia::Shanghai;

    fn log_at(id: &str, change: i64, timestamp: Timestamp) -> PointLog {
        PointLog {
            id: id.into(),
            reason: format!("reason-{id}"),
            change,
            timestamp,
        }
    }

    fn day_ms(days: i64) -> i64 {
        Duration::days(days).num_milliseconds()
    }

    #[test]
    fn range_lengths() {
        assert_eq!(StatsRange::Week.days(), 7);
        assert_eq!(StatsRange::Month.days(), 30);
        assert_eq!(StatsRange::Quarter.days(), 90);
        assert_eq!(StatsRange::HalfYear.days(), 180);
    }

    #[test]
    fn daily_totals_fill_every_day_and_sum_per_local_day() {
        let now = Shanghai.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let now_ms = now.timestamp_millis();
        // 00:30 local on the 10th is still the 9th in UTC.
        let early = Shanghai
            .with_ymd_and_hms(2024, 3, 10, 0, 30, 0)
            .unwrap()
            .timestamp_millis();
        let logs = vec![
            log_at("a", 40, early),
            log_at("b", -15, now_ms - 1000),
            log_at("c", 20, now_ms - day_ms(2)),
            log_at("old", 99, now_ms - day_ms(30)),
        ];

        let totals = daily_totals(&logs, StatsRange::Week, &now);
        assert_eq!(totals.len(), 8);
        assert_eq!(totals.first().unwrap().day, "2024-03-03");
        assert_eq!(totals.last().unwrap().day, "2024-03-10");
        assert_eq!(totals.last().unwrap().total, 25);
        assert_eq!(totals[5].day, "2024-03-08");
        assert_eq!(totals[5].total, 20);
        assert_eq!(totals.iter().map(|t| t.total).sum::<i64>(), 45);
    }

    #[test]
    fn recent_means_within_seven_days() {
        let now_ms = day_ms(100);
        assert!(is_recent(&log_at("a", 1, now_ms - day_ms(7)), now_ms));
        assert!(!is_recent(&log_at("b", 1, now_ms - day_ms(7) - 1), now_ms));
    }

    #[test]
    fn newest_first_and_totals() {
        let now_ms = day_ms(100);
        let logs = vec![
            log_at("a", 50, now_ms - day_ms(3)),
            log_at("b", -20, now_ms - day_ms(1)),
            log_at("c", 10, now_ms - day_ms(40)),
        ];
        let sorted = logs_newest_first(&logs);
        assert_eq!(
            sorted.iter().map(|l| l.id.as_str()).collect::<Vec<_>>(),
            vec!["b", "a", "c"]
        );
        assert_eq!(earned(&logs, StatsRange::Week, now_ms), 50);
        assert_eq!(earned(&logs, StatsRange::Quarter, now_ms), 60);
        assert_eq!(spent(&logs, StatsRange::Week, now_ms), 20);
    }
}
