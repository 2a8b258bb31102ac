//! Cache de calcul des horaires de prière.
//!
//! `PrayerCalculator` est l'unique propriétaire des deux caches ambiants du
//! système : les horaires par date et le snapshot astronomique borné par TTL.
//! Une seule instance vit par système ; l'invalidation est explicite via
//! [`PrayerCalculator::clear_cache`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use tracing::{debug, error};

use crate::engine::{AstronomyEngine, MoonPhasePoint, ObservationRequest};
use crate::model::{AstronomySnapshot, NearestPhase, PrayerEvent, PrayerTimes};
use crate::settings::CalculationSettings;

/// Astronomy snapshot TTL (5 minutes).
pub const ASTRONOMY_CACHE_TTL: Duration = Duration::from_secs(300);

/// Synodic month length in days.
const LUNAR_CYCLE: f64 = 29.530_588_67;

/// Julian date of the reference new moon (approx. 2000-01-06).
const NEW_MOON_REFERENCE_JD: f64 = 2_451_549.5;

pub struct PrayerCalculator {
    engine: Arc<dyn AstronomyEngine>,
    settings: RwLock<CalculationSettings>,
    times_cache: Mutex<HashMap<NaiveDate, PrayerTimes>>,
    astronomy_cache: Mutex<Option<(AstronomySnapshot, Instant)>>,
    astronomy_ttl: Duration,
}

impl PrayerCalculator {
    pub fn new(engine: Arc<dyn AstronomyEngine>, settings: CalculationSettings) -> Self {
        Self {
            engine,
            settings: RwLock::new(settings),
            times_cache: Mutex::new(HashMap::new()),
            astronomy_cache: Mutex::new(None),
            astronomy_ttl: ASTRONOMY_CACHE_TTL,
        }
    }

    /// Same as [`PrayerCalculator::new`] with a non-default snapshot TTL.
    pub fn with_astronomy_ttl(
        engine: Arc<dyn AstronomyEngine>,
        settings: CalculationSettings,
        ttl: Duration,
    ) -> Self {
        Self {
            astronomy_ttl: ttl,
            ..Self::new(engine, settings)
        }
    }

    /// Swaps in new location/method settings. The external store calls this
    /// after a write, then `clear_cache()`.
    pub fn set_settings(&self, settings: CalculationSettings) {
        *self
            .settings
            .write()
            .expect("CalculationSettings lock failed") = settings;
    }

    pub fn settings(&self) -> CalculationSettings {
        self.settings
            .read()
            .expect("CalculationSettings lock failed")
            .clone()
    }

    /// Drops both caches. Call whenever upstream settings change.
    pub fn clear_cache(&self) {
        self.times_cache
            .lock()
            .expect("times cache lock failed")
            .clear();
        *self
            .astronomy_cache
            .lock()
            .expect("astronomy cache lock failed") = None;
        debug!("prayer times and astronomy caches cleared");
    }

    /// Event times for `date` (today when `None`), in local wall-clock time.
    ///
    /// Cache hit returns the memoized content unchanged. On engine failure
    /// the error is logged and an empty map is returned; callers treat this
    /// as "no events today" and must not crash. Failures are never cached.
    pub fn calculate_times(&self, date: Option<NaiveDate>) -> PrayerTimes {
        let date = date.unwrap_or_else(|| Local::now().date_naive());

        if let Some(cached) = self
            .times_cache
            .lock()
            .expect("times cache lock failed")
            .get(&date)
        {
            debug!(%date, "returning cached prayer times");
            return cached.clone();
        }

        let request = self.request_for(date.and_hms_opt(0, 0, 0).unwrap_or_default());
        let observation = match self.engine.observe(&request) {
            Ok(observation) => observation,
            Err(err) => {
                error!(%date, error = %err, "prayer time computation failed");
                return PrayerTimes::new();
            }
        };

        // Strip timezone annotations: the rest of the system reasons in
        // local wall-clock time.
        let times: PrayerTimes = observation
            .times
            .iter()
            .map(|(event, at)| (*event, at.naive_local()))
            .collect();

        self.times_cache
            .lock()
            .expect("times cache lock failed")
            .insert(date, times.clone());
        debug!(%date, "cached prayer times");

        times
    }

    /// Moon phase, illumination and sun position, recomputed only when the
    /// cached snapshot is at least [`ASTRONOMY_CACHE_TTL`] old.
    pub fn astronomy_snapshot(&self) -> Option<AstronomySnapshot> {
        {
            let cache = self
                .astronomy_cache
                .lock()
                .expect("astronomy cache lock failed");
            if let Some((snapshot, at)) = cache.as_ref() {
                if at.elapsed() < self.astronomy_ttl {
                    debug!("returning cached astronomy snapshot");
                    return Some(snapshot.clone());
                }
            }
        }

        let now = Local::now().naive_local();
        let request = self.request_for(now);
        let observation = match self.engine.observe(&request) {
            Ok(observation) => observation,
            Err(err) => {
                error!(error = %err, "astronomy snapshot computation failed");
                return None;
            }
        };

        let snapshot = AstronomySnapshot {
            moon_illumination: round1(observation.moon_illumination * 100.0),
            moon_image_index: moon_image_index(now.date()),
            nearest_phase: nearest_phase(&observation.moon_phases, now),
            sun_altitude: round1(observation.sun.altitude),
            sun_azimuth: round1(observation.sun.azimuth),
        };

        *self
            .astronomy_cache
            .lock()
            .expect("astronomy cache lock failed") = Some((snapshot.clone(), Instant::now()));
        debug!("cached astronomy snapshot");

        Some(snapshot)
    }

    /// First event strictly after now, today; otherwise tomorrow's first
    /// event. Never returns a past time.
    pub fn next_event(&self) -> Option<(PrayerEvent, NaiveDateTime)> {
        let now = Local::now().naive_local();
        let today = now.date();

        for (event, at) in self.calculate_times(Some(today)) {
            if at > now {
                return Some((event, at));
            }
        }

        let tomorrow = today.succ_opt()?;
        self.calculate_times(Some(tomorrow)).into_iter().next()
    }

    fn request_for(&self, when: NaiveDateTime) -> ObservationRequest {
        let settings = self.settings();
        ObservationRequest {
            latitude: settings.latitude,
            longitude: settings.longitude,
            when,
            method: settings.calculation_method,
            asr: settings.asr_method,
            custom_angles: settings.custom_angles.filter(|a| !a.is_empty()),
        }
    }
}

/// Moon age index 0-29 for image selection.
///
/// Independent of the engine: a plain Julian-day computation against a fixed
/// new-moon reference and the synodic month length.
pub fn moon_image_index(date: NaiveDate) -> u8 {
    let a = (14 - date.month() as i64) / 12;
    let y = date.year() as i64 + 4800 - a;
    let m = date.month() as i64 + 12 * a - 3;

    let jd = date.day() as i64
        + (153 * m + 2) / 5
        + 365 * y
        + y / 4
        - y / 100
        + y / 400
        - 32045;

    let days_since_new = jd as f64 - NEW_MOON_REFERENCE_JD;
    let cycles = days_since_new / LUNAR_CYCLE;
    let current_cycle_pos = cycles.fract() * LUNAR_CYCLE;

    (current_cycle_pos.round() as i64).rem_euclid(30) as u8
}

/// Phase closest in time to `now`, past or future: plain minimum absolute
/// distance, no waxing/waning inference.
fn nearest_phase(phases: &[MoonPhasePoint], now: NaiveDateTime) -> Option<NearestPhase> {
    phases
        .iter()
        .min_by_key(|phase| (phase.at.naive_local() - now).num_seconds().abs())
        .map(|phase| NearestPhase {
            name: phase.name.clone(),
            at: phase.at.naive_local(),
        })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Observation, SolarPosition};
    use crate::errors::EngineError;
    use chrono::{NaiveTime, TimeZone};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine returning the six events at a fixed clock time on the
    /// requested date, counting invocations.
    struct FakeEngine {
        clock: NaiveTime,
        calls: AtomicUsize,
    }

    impl FakeEngine {
        fn at(clock: NaiveTime) -> Self {
            Self {
                clock,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AstronomyEngine for FakeEngine {
        fn observe(&self, request: &ObservationRequest) -> Result<Observation, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let base = request.when.date().and_time(self.clock);
            let mut times = BTreeMap::new();
            for event in PrayerEvent::ALL {
                let local = Local
                    .from_local_datetime(&base)
                    .earliest()
                    .expect("unambiguous test time");
                times.insert(event, local);
            }
            Ok(Observation {
                times,
                moon_illumination: 0.421,
                moon_phases: vec![
                    MoonPhasePoint {
                        name: "Full Moon".to_string(),
                        at: Local::now() - chrono::Duration::hours(1),
                    },
                    MoonPhasePoint {
                        name: "Last Quarter".to_string(),
                        at: Local::now() + chrono::Duration::hours(30),
                    },
                ],
                sun: SolarPosition {
                    altitude: 12.34,
                    azimuth: 181.26,
                },
            })
        }
    }

    struct FailingEngine {
        calls: AtomicUsize,
    }

    impl AstronomyEngine for FailingEngine {
        fn observe(&self, _request: &ObservationRequest) -> Result<Observation, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::computation("ephemeris unavailable"))
        }
    }

    fn noon_engine() -> Arc<FakeEngine> {
        Arc::new(FakeEngine::at(NaiveTime::from_hms_opt(12, 0, 0).unwrap()))
    }

    #[test]
    fn test_times_are_cached_per_date() {
        let engine = noon_engine();
        let calculator =
            PrayerCalculator::new(engine.clone(), CalculationSettings::default());
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        let first = calculator.calculate_times(Some(date));
        let second = calculator.calculate_times(Some(date));

        assert_eq!(first, second);
        assert_eq!(first.len(), 6);
        assert_eq!(engine.call_count(), 1);
    }

    #[test]
    fn test_engine_failure_degrades_to_empty_and_is_not_cached() {
        let engine = Arc::new(FailingEngine {
            calls: AtomicUsize::new(0),
        });
        let calculator =
            PrayerCalculator::new(engine.clone(), CalculationSettings::default());
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        assert!(calculator.calculate_times(Some(date)).is_empty());
        assert!(calculator.calculate_times(Some(date)).is_empty());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clear_cache_forces_recomputation() {
        let engine = noon_engine();
        let calculator =
            PrayerCalculator::new(engine.clone(), CalculationSettings::default());
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        calculator.calculate_times(Some(date));
        calculator.clear_cache();
        calculator.calculate_times(Some(date));

        assert_eq!(engine.call_count(), 2);
    }

    #[test]
    fn test_snapshot_is_cached_within_ttl() {
        let engine = noon_engine();
        let calculator = PrayerCalculator::with_astronomy_ttl(
            engine.clone(),
            CalculationSettings::default(),
            Duration::from_secs(300),
        );

        let first = calculator.astronomy_snapshot().unwrap();
        let second = calculator.astronomy_snapshot().unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.call_count(), 1);
        assert_eq!(first.moon_illumination, 42.1);
        assert_eq!(first.sun_altitude, 12.3);
        assert_eq!(first.sun_azimuth, 181.3);
    }

    #[test]
    fn test_snapshot_recomputed_after_ttl() {
        let engine = noon_engine();
        let calculator = PrayerCalculator::with_astronomy_ttl(
            engine.clone(),
            CalculationSettings::default(),
            Duration::from_millis(40),
        );

        calculator.astronomy_snapshot().unwrap();
        std::thread::sleep(Duration::from_millis(60));
        calculator.astronomy_snapshot().unwrap();

        assert_eq!(engine.call_count(), 2);
    }

    #[test]
    fn test_nearest_phase_prefers_closest_past_point() {
        let snapshot = PrayerCalculator::new(noon_engine(), CalculationSettings::default())
            .astronomy_snapshot()
            .unwrap();
        // The fake reports Full Moon 1h in the past and Last Quarter 30h
        // ahead; minimum absolute distance picks the past one.
        assert_eq!(snapshot.nearest_phase.unwrap().name, "Full Moon");
    }

    #[test]
    fn test_next_event_returns_strictly_future_time() {
        let engine = Arc::new(FakeEngine::at(
            NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
        ));
        let calculator = PrayerCalculator::new(engine, CalculationSettings::default());

        let (event, at) = calculator.next_event().unwrap();
        assert_eq!(event, PrayerEvent::Fajr);
        assert!(at > Local::now().naive_local());
    }

    #[test]
    fn test_next_event_rolls_over_to_tomorrow() {
        // All of today's events sit at 00:00:00, hence in the past.
        let engine = Arc::new(FakeEngine::at(NaiveTime::from_hms_opt(0, 0, 0).unwrap()));
        let calculator = PrayerCalculator::new(engine, CalculationSettings::default());

        let (event, at) = calculator.next_event().unwrap();
        assert_eq!(event, PrayerEvent::Fajr);
        assert_eq!(at.date(), Local::now().date_naive().succ_opt().unwrap());
    }

    #[test]
    fn test_next_event_none_when_engine_fails() {
        let engine = Arc::new(FailingEngine {
            calls: AtomicUsize::new(0),
        });
        let calculator = PrayerCalculator::new(engine, CalculationSettings::default());
        assert!(calculator.next_event().is_none());
    }

    #[test]
    fn test_moon_image_index_known_dates() {
        // Full moon on 2024-01-25.
        let full = NaiveDate::from_ymd_opt(2024, 1, 25).unwrap();
        assert_eq!(moon_image_index(full), 15);

        for offset in 0..120 {
            let date = full + chrono::Duration::days(offset);
            assert!(moon_image_index(date) <= 29);
        }
    }
}
