use athantimes::PrayerEvent;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScheduleError {
    /// Per-event settings rejected at arming time.
    #[error("invalid settings for {0}: {1}")]
    InvalidSettings(PrayerEvent, String),
}
