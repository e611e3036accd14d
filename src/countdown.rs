use serde::Serialize;

use crate::models::Timestamp;

const SECOND_MS: i64 = 1000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;
const MONTH_MS: i64 = 30 * DAY_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct TimeRemaining {
    pub total_ms: i64,
    pub months: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub arrived: bool,
}

/// Breaks the time left until `target` into 30-day months, days, hours, minutes and seconds.
pub fn time_remaining(target: Option<Timestamp>, now: Timestamp) -> TimeRemaining {
    let Some(target) = target else {
        return TimeRemaining {
            arrived: true,
            ..TimeRemaining::default()
        };
    };
    let total_ms = (target - now).num_milliseconds();
    if total_ms <= 0 {
        return TimeRemaining {
            total_ms,
            arrived: true,
            ..TimeRemaining::default()
        };
    }
    TimeRemaining {
        total_ms,
        months: total_ms / MONTH_MS,
        days: (total_ms % MONTH_MS) / DAY_MS,
        hours: (total_ms % DAY_MS) / HOUR_MS,
        minutes: (total_ms % HOUR_MS) / MINUTE_MS,
        seconds: (total_ms % MINUTE_MS) / SECOND_MS,
        arrived: false,
    }
}
