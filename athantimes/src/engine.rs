//! Seam towards the external astronomy engine.
//!
//! The engine is a pure per-call function: given a location and an instant
//! it returns the six event times plus moon and sun data. All caching of
//! its outputs belongs to [`crate::PrayerCalculator`].

use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDateTime};

use crate::errors::EngineError;
use crate::model::PrayerEvent;
use crate::settings::{AsrConvention, CustomAngles};

/// One engine invocation.
#[derive(Clone, Debug)]
pub struct ObservationRequest {
    pub latitude: f64,
    pub longitude: f64,
    /// Local instant the observation is computed for. For daily event times
    /// this is the date at midnight; for sky state it is "now".
    pub when: NaiveDateTime,
    pub method: String,
    pub asr: AsrConvention,
    pub custom_angles: Option<CustomAngles>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolarPosition {
    pub altitude: f64,
    pub azimuth: f64,
}

/// A principal lunar phase instant reported by the engine (new moon,
/// first quarter, full moon, last quarter) around the requested instant.
#[derive(Clone, Debug, PartialEq)]
pub struct MoonPhasePoint {
    pub name: String,
    pub at: DateTime<Local>,
}

/// Everything one engine call produces.
#[derive(Clone, Debug)]
pub struct Observation {
    /// The six canonical event times, timezone-aware.
    pub times: BTreeMap<PrayerEvent, DateTime<Local>>,
    /// Moon illumination fraction in `0.0..=1.0`.
    pub moon_illumination: f64,
    /// Principal phases surrounding the requested instant.
    pub moon_phases: Vec<MoonPhasePoint>,
    pub sun: SolarPosition,
}

pub trait AstronomyEngine: Send + Sync {
    fn observe(&self, request: &ObservationRequest) -> Result<Observation, EngineError>;
}
