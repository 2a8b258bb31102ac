//! Prayer-time computation cache.
//!
//! This crate wraps an external astronomy engine behind the
//! [`AstronomyEngine`] seam and owns all caching of its outputs:
//! - a per-date map of the six canonical event times,
//! - a TTL-bounded astronomy snapshot (moon/sun data).
//!
//! The engine itself (ephemeris, prayer-angle solving) is an external
//! collaborator; this crate only consumes its outputs.

pub mod calculator;
pub mod engine;
pub mod errors;
pub mod model;
pub mod settings;

pub use calculator::PrayerCalculator;
pub use engine::{AstronomyEngine, MoonPhasePoint, Observation, ObservationRequest, SolarPosition};
pub use errors::EngineError;
pub use model::{AstronomySnapshot, NearestPhase, PrayerEvent, PrayerTimes};
pub use settings::{AsrConvention, CalculationSettings, CustomAngles};
