//! Per-event broadcast policies.
//!
//! Each prayer event carries either a simple on/off toggle or a detailed
//! settings block; the toggle form only overrides `athan_enabled` and
//! inherits every other default. Offsets are minutes relative to the
//! computed prayer time, applied before or after it.

use athancast::DeviceId;
use athantimes::PrayerEvent;
use serde::{Deserialize, Serialize};

use crate::errors::ScheduleError;

pub const DEFAULT_ATHAN_VOLUME: f32 = 0.5;
pub const DEFAULT_REMINDER_VOLUME: f32 = 0.3;

/// Which side of the prayer time an offset lands on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timing {
    #[default]
    Before,
    After,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    pub athan_enabled: bool,
    /// Minutes, non-negative; direction comes from `athan_timing`.
    pub athan_offset: i64,
    pub athan_timing: Timing,
    pub athan_volume: f32,
    pub athan_audio_file: Option<String>,
    pub reminder_enabled: bool,
    pub reminder_offset: i64,
    pub reminder_timing: Timing,
    pub reminder_volume: f32,
    pub reminder_audio_file: Option<String>,
    /// Empty means "use the broadcaster's default subset".
    pub enabled_devices: Vec<DeviceId>,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            athan_enabled: true,
            athan_offset: 0,
            athan_timing: Timing::Before,
            athan_volume: DEFAULT_ATHAN_VOLUME,
            athan_audio_file: None,
            reminder_enabled: false,
            reminder_offset: 0,
            reminder_timing: Timing::Before,
            reminder_volume: DEFAULT_REMINDER_VOLUME,
            reminder_audio_file: None,
            enabled_devices: Vec::new(),
        }
    }
}

impl EventSettings {
    pub fn validate(&self, event: PrayerEvent) -> Result<(), ScheduleError> {
        if !(0.0..=1.0).contains(&self.athan_volume) {
            return Err(ScheduleError::InvalidSettings(
                event,
                format!("athan volume {} out of range 0..=1", self.athan_volume),
            ));
        }
        if !(0.0..=1.0).contains(&self.reminder_volume) {
            return Err(ScheduleError::InvalidSettings(
                event,
                format!("reminder volume {} out of range 0..=1", self.reminder_volume),
            ));
        }
        if self.athan_offset < 0 {
            return Err(ScheduleError::InvalidSettings(
                event,
                format!("negative athan offset {}", self.athan_offset),
            ));
        }
        if self.reminder_offset < 0 {
            return Err(ScheduleError::InvalidSettings(
                event,
                format!("negative reminder offset {}", self.reminder_offset),
            ));
        }
        Ok(())
    }
}

/// A prayer-event policy as it appears in configuration: either a bare
/// boolean toggle or a full settings block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPolicy {
    Toggle(bool),
    Detailed(EventSettings),
}

impl EventPolicy {
    /// Effective settings: a toggle only overrides `athan_enabled`.
    pub fn resolve(&self) -> EventSettings {
        match self {
            EventPolicy::Toggle(enabled) => EventSettings {
                athan_enabled: *enabled,
                ..EventSettings::default()
            },
            EventPolicy::Detailed(settings) => settings.clone(),
        }
    }
}

impl Default for EventPolicy {
    fn default() -> Self {
        EventPolicy::Detailed(EventSettings::default())
    }
}
