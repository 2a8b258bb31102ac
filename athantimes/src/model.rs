use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One of the six canonical daily events.
///
/// Declaration order is chronological order; `Ord` derives from it, so a
/// `BTreeMap<PrayerEvent, _>` always iterates in canonical order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrayerEvent {
    Fajr,
    Sunrise,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl PrayerEvent {
    /// All events in chronological order.
    pub const ALL: [PrayerEvent; 6] = [
        PrayerEvent::Fajr,
        PrayerEvent::Sunrise,
        PrayerEvent::Dhuhr,
        PrayerEvent::Asr,
        PrayerEvent::Maghrib,
        PrayerEvent::Isha,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PrayerEvent::Fajr => "Fajr",
            PrayerEvent::Sunrise => "Sunrise",
            PrayerEvent::Dhuhr => "Dhuhr",
            PrayerEvent::Asr => "Asr",
            PrayerEvent::Maghrib => "Maghrib",
            PrayerEvent::Isha => "Isha",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.name() == name)
    }
}

impl fmt::Display for PrayerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Event times for one date, in local wall-clock time (no timezone).
pub type PrayerTimes = BTreeMap<PrayerEvent, NaiveDateTime>;

/// The quarter phase closest in time to the observation instant,
/// past or future.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NearestPhase {
    pub name: String,
    pub at: NaiveDateTime,
}

/// Moon and sun state served to the control plane.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AstronomySnapshot {
    /// Illumination percentage, one decimal.
    pub moon_illumination: f64,
    /// Moon age index 0-29 for image selection.
    pub moon_image_index: u8,
    pub nearest_phase: Option<NearestPhase>,
    pub sun_altitude: f64,
    pub sun_azimuth: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_chronologically_ordered() {
        let mut sorted = PrayerEvent::ALL;
        sorted.sort();
        assert_eq!(sorted, PrayerEvent::ALL);
        assert!(PrayerEvent::Fajr < PrayerEvent::Isha);
    }

    #[test]
    fn test_event_name_roundtrip() {
        for event in PrayerEvent::ALL {
            assert_eq!(PrayerEvent::from_name(event.name()), Some(event));
        }
        assert_eq!(PrayerEvent::from_name("Midnight"), None);
    }
}
