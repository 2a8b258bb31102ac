//! Armed job bookkeeping.

use athantimes::PrayerEvent;
use chrono::{Duration, NaiveDateTime};

use crate::settings::{EventSettings, Timing};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    Athan,
    Reminder,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Athan => "athan",
            JobKind::Reminder => "reminder",
        }
    }
}

/// Stable job identifier, `athan_Fajr` / `reminder_Isha` style.
pub fn job_id(kind: JobKind, event: PrayerEvent) -> String {
    format!("{}_{}", kind.as_str(), event.name())
}

/// One scheduled broadcast, visible through the scheduler's listing API.
#[derive(Clone, Debug)]
pub struct ArmedJob {
    pub id: String,
    pub kind: JobKind,
    pub event: PrayerEvent,
    pub fire_time: NaiveDateTime,
    pub settings: EventSettings,
}

/// Applies a minute offset to a prayer time, on the side given by `timing`.
pub fn fire_time(prayer_time: NaiveDateTime, offset_minutes: i64, timing: Timing) -> NaiveDateTime {
    let delta = Duration::minutes(offset_minutes);
    match timing {
        Timing::Before => prayer_time - delta,
        Timing::After => prayer_time + delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_offset_applies_on_the_requested_side() {
        let before = fire_time(noon(), 10, Timing::Before);
        assert_eq!(before, noon() - Duration::minutes(10));

        let after = fire_time(noon(), 10, Timing::After);
        assert_eq!(after, noon() + Duration::minutes(10));

        assert_eq!(fire_time(noon(), 0, Timing::Before), noon());
    }

    #[test]
    fn test_job_ids_are_stable() {
        assert_eq!(job_id(JobKind::Athan, PrayerEvent::Fajr), "athan_Fajr");
        assert_eq!(job_id(JobKind::Reminder, PrayerEvent::Isha), "reminder_Isha");
    }
}
