use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::warn;

use crate::ReconcileError;

/// Fire times walked before giving up on catching up with a long outage.
const MAX_MISSED: usize = 1_000;

/// Parse a 5-field (minute precision) or 6/7-field (second precision) expression, in UTC.
pub fn parse(expr: &str) -> Result<Schedule, ReconcileError> {
    let trimmed = expr.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| ReconcileError::InvalidSchedule {
        schedule: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Most recent fire time in `(since, now]`.
pub fn latest_due(schedule: &Schedule, since: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut due = None;
    for (walked, at) in schedule.after(&since).enumerate() {
        if at > now {
            break;
        }
        due = Some(at);
        if walked >= MAX_MISSED {
            warn!(%since, %at, "too many missed fire times; catching up from the oldest window");
            break;
        }
    }
    due
}

pub fn next_after(schedule: &Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&now).next()
}
