//! Timer-driven arming and dispatch of broadcast jobs.
//!
//! Chaque rafraîchissement désarme tout, recalcule les horaires du jour et
//! arme un job par diffusion encore à venir. Les jobs dorment jusqu'à leur
//! heure de tir puis délèguent la diffusion (bloquante) au broadcaster sur
//! le pool `spawn_blocking`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use athancast::{AudioRef, Broadcaster, DeviceId, DeviceInfo, PlayRequest};
use athantimes::{AstronomySnapshot, PrayerCalculator, PrayerEvent, PrayerTimes};
use chrono::{Local, NaiveDateTime, NaiveTime};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::jobs::{ArmedJob, JobKind, fire_time, job_id};
use crate::settings::{EventPolicy, EventSettings};

/// Daily re-arm time, shortly after midnight so the new date is in effect.
const DAILY_REFRESH_TIME: NaiveTime = match NaiveTime::from_hms_opt(0, 1, 0) {
    Some(time) => time,
    None => unreachable!(),
};

const ATHAN_ARTWORK: &str = "athan_background.png";

struct ArmedEntry {
    job: ArmedJob,
    handle: AbortHandle,
}

pub struct AthanScheduler {
    calculator: Arc<PrayerCalculator>,
    broadcaster: Arc<Broadcaster>,
    schedule: RwLock<BTreeMap<PrayerEvent, EventPolicy>>,
    armed: Mutex<HashMap<String, ArmedEntry>>,
    refresh_handle: Mutex<Option<AbortHandle>>,
}

impl AthanScheduler {
    pub fn new(calculator: Arc<PrayerCalculator>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            calculator,
            broadcaster,
            schedule: RwLock::new(BTreeMap::new()),
            armed: Mutex::new(HashMap::new()),
            refresh_handle: Mutex::new(None),
        }
    }

    /// Arms today's jobs immediately, then re-arms every day shortly after
    /// midnight. Calling it again replaces the previous daily loop.
    pub fn start(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                scheduler.refresh();
                let now = Local::now().naive_local();
                let wake_at = next_refresh_after(now);
                let delay = (wake_at - now).to_std().unwrap_or(Duration::ZERO);
                debug!(at = %wake_at, "next daily refresh");
                tokio::time::sleep(delay).await;
            }
        })
        .abort_handle();

        let mut guard = self
            .refresh_handle
            .lock()
            .expect("refresh handle lock failed");
        if let Some(previous) = guard.replace(handle) {
            previous.abort();
        }
    }

    /// Aborts the daily loop and every armed job.
    pub fn shutdown(&self) {
        if let Some(handle) = self
            .refresh_handle
            .lock()
            .expect("refresh handle lock failed")
            .take()
        {
            handle.abort();
        }
        self.disarm_all();
    }

    /// Recomputes today's prayer times and re-arms one job per enabled
    /// broadcast still in the future. Invalid per-event settings are logged
    /// and only skip that event.
    pub fn refresh(self: &Arc<Self>) {
        self.disarm_all();

        let times = self.calculator.calculate_times(None);
        if times.is_empty() {
            warn!("no prayer times available, nothing to arm");
            return;
        }

        let schedule = self
            .schedule
            .read()
            .expect("schedule lock failed")
            .clone();
        let now = Local::now().naive_local();
        let mut armed = 0_usize;

        for event in PrayerEvent::ALL {
            let settings = schedule
                .get(&event)
                .cloned()
                .unwrap_or_default()
                .resolve();

            if !settings.athan_enabled && !settings.reminder_enabled {
                continue;
            }
            if let Err(err) = settings.validate(event) {
                warn!(error = %err, "skipping event with invalid settings");
                continue;
            }
            let Some(&prayer_time) = times.get(&event) else {
                continue;
            };

            if settings.athan_enabled {
                let at = fire_time(prayer_time, settings.athan_offset, settings.athan_timing);
                armed += self.arm(JobKind::Athan, event, at, settings.clone(), now) as usize;
            }
            // A reminder at offset zero would duplicate the athan itself.
            if settings.reminder_enabled && settings.reminder_offset > 0 {
                let at = fire_time(prayer_time, settings.reminder_offset, settings.reminder_timing);
                armed += self.arm(JobKind::Reminder, event, at, settings, now) as usize;
            }
        }

        info!(jobs = armed, "broadcast schedule armed");
    }

    /// Arms one timer job; past-due times are dropped. Returns whether the
    /// job was armed.
    fn arm(
        self: &Arc<Self>,
        kind: JobKind,
        event: PrayerEvent,
        at: NaiveDateTime,
        settings: EventSettings,
        now: NaiveDateTime,
    ) -> bool {
        let id = job_id(kind, event);
        if at <= now {
            debug!(job = %id, at = %at, "fire time already past, not arming");
            return false;
        }

        let job = ArmedJob {
            id: id.clone(),
            kind,
            event,
            fire_time: at,
            settings,
        };
        let delay = (at - now).to_std().unwrap_or(Duration::ZERO);

        let scheduler = Arc::clone(self);
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.fire(&task_id);
        })
        .abort_handle();

        debug!(job = %id, at = %at, "job armed");
        self.armed
            .lock()
            .expect("armed jobs lock failed")
            .insert(id, ArmedEntry { job, handle });
        true
    }

    /// Consumes an armed job and dispatches its broadcast. An unknown id
    /// means a refresh raced the timer; nothing to do.
    fn fire(self: &Arc<Self>, id: &str) {
        let Some(entry) = self
            .armed
            .lock()
            .expect("armed jobs lock failed")
            .remove(id)
        else {
            debug!(job = %id, "fired job no longer armed, ignoring");
            return;
        };

        let job = entry.job;
        info!(job = %job.id, event = %job.event, "job firing");
        let broadcaster = Arc::clone(&self.broadcaster);
        tokio::task::spawn_blocking(move || {
            let request = match job.kind {
                JobKind::Athan => athan_request(job.event, &job.settings),
                JobKind::Reminder => reminder_request(job.event, &job.settings),
            };
            broadcaster.play(request);
        });
    }

    fn disarm_all(&self) {
        let mut armed = self.armed.lock().expect("armed jobs lock failed");
        for (_, entry) in armed.drain() {
            entry.handle.abort();
        }
    }

    /// Replaces the per-event policies. Takes effect on the next refresh.
    pub fn set_schedule(&self, schedule: BTreeMap<PrayerEvent, EventPolicy>) {
        *self.schedule.write().expect("schedule lock failed") = schedule;
    }

    pub fn schedule(&self) -> BTreeMap<PrayerEvent, EventPolicy> {
        self.schedule.read().expect("schedule lock failed").clone()
    }

    /// Armed jobs, soonest first.
    pub fn armed_jobs(&self) -> Vec<ArmedJob> {
        let mut jobs: Vec<ArmedJob> = self
            .armed
            .lock()
            .expect("armed jobs lock failed")
            .values()
            .map(|entry| entry.job.clone())
            .collect();
        jobs.sort_by_key(|job| job.fire_time);
        jobs
    }

    pub fn calculate_times(&self, date: Option<chrono::NaiveDate>) -> PrayerTimes {
        self.calculator.calculate_times(date)
    }

    pub fn next_event(&self) -> Option<(PrayerEvent, NaiveDateTime)> {
        self.calculator.next_event()
    }

    pub fn astronomy_snapshot(&self) -> Option<AstronomySnapshot> {
        self.calculator.astronomy_snapshot()
    }

    pub fn clear_cache(&self) {
        self.calculator.clear_cache();
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.broadcaster.registry().list_devices()
    }

    /// Manual trigger, bypassing the timers. `settings` overrides the
    /// stored policy for this one playback (test playback with ad-hoc
    /// volume/devices); `None` resolves the stored policy. Blocks for the
    /// whole cycle.
    pub fn play_athan(&self, event: PrayerEvent, settings: Option<EventSettings>) {
        let settings = settings.unwrap_or_else(|| self.policy_for(event));
        self.broadcaster.play(athan_request(event, &settings));
    }

    /// Manual reminder trigger, same override rules as
    /// [`AthanScheduler::play_athan`]. Blocks for the whole cycle.
    pub fn play_reminder(&self, event: PrayerEvent, settings: Option<EventSettings>) {
        let settings = settings.unwrap_or_else(|| self.policy_for(event));
        self.broadcaster.play(reminder_request(event, &settings));
    }

    /// Stops playback on the given devices (all registered when `None`)
    /// and interrupts any in-flight fade.
    pub fn stop_all(&self, targets: Option<&[DeviceId]>) {
        self.broadcaster.stop(targets);
    }

    fn policy_for(&self, event: PrayerEvent) -> EventSettings {
        self.schedule
            .read()
            .expect("schedule lock failed")
            .get(&event)
            .cloned()
            .unwrap_or_default()
            .resolve()
    }
}

fn targets_of(settings: &EventSettings) -> Option<Vec<DeviceId>> {
    (!settings.enabled_devices.is_empty()).then(|| settings.enabled_devices.clone())
}

fn athan_request(event: PrayerEvent, settings: &EventSettings) -> PlayRequest {
    PlayRequest {
        targets: targets_of(settings),
        audio: AudioRef::Athan {
            file: settings.athan_audio_file.clone(),
        },
        volume: settings.athan_volume,
        title: Some(format!("{event} Athan")),
        artwork: Some(ATHAN_ARTWORK.to_string()),
    }
}

fn reminder_request(event: PrayerEvent, settings: &EventSettings) -> PlayRequest {
    PlayRequest {
        targets: targets_of(settings),
        audio: AudioRef::Reminder {
            file: settings.reminder_audio_file.clone(),
        },
        volume: settings.reminder_volume,
        title: Some(format!("{event} Reminder")),
        artwork: None,
    }
}

/// First daily refresh instant strictly after `now`.
pub fn next_refresh_after(now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date().and_time(DAILY_REFRESH_TIME);
    if today > now {
        today
    } else {
        (now.date() + chrono::Duration::days(1)).and_time(DAILY_REFRESH_TIME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athancast::{AudioLibrary, SpeakerRegistry};
    use athantimes::engine::{AstronomyEngine, Observation, ObservationRequest, SolarPosition};
    use athantimes::errors::EngineError;
    use chrono::{DateTime, Duration as ChronoDuration, NaiveDate};

    /// Engine producing prayer times at fixed offsets from now, so tests
    /// control which side of "now" each event lands on.
    struct OffsetEngine {
        offsets_minutes: i64,
    }

    impl AstronomyEngine for OffsetEngine {
        fn observe(&self, _request: &ObservationRequest) -> Result<Observation, EngineError> {
            let now = Local::now();
            let times: BTreeMap<PrayerEvent, DateTime<Local>> = PrayerEvent::ALL
                .iter()
                .enumerate()
                .map(|(i, &event)| {
                    (
                        event,
                        now + ChronoDuration::minutes(self.offsets_minutes + i as i64),
                    )
                })
                .collect();
            Ok(Observation {
                times,
                moon_illumination: 0.5,
                moon_phases: Vec::new(),
                sun: SolarPosition {
                    altitude: 10.0,
                    azimuth: 120.0,
                },
            })
        }
    }

    fn scheduler(offsets_minutes: i64) -> Arc<AthanScheduler> {
        let calculator = Arc::new(PrayerCalculator::new(
            Arc::new(OffsetEngine { offsets_minutes }),
            athantimes::CalculationSettings::default(),
        ));
        let registry = Arc::new(SpeakerRegistry::new());
        let locator = Arc::new(AudioLibrary::with_base_url(
            std::env::temp_dir(),
            "http://127.0.0.1:8000".to_string(),
            None,
        ));
        let broadcaster = Arc::new(Broadcaster::new(registry, locator));
        Arc::new(AthanScheduler::new(calculator, broadcaster))
    }

    #[tokio::test]
    async fn test_refresh_arms_one_athan_job_per_enabled_event() {
        let scheduler = scheduler(30);
        let mut schedule = BTreeMap::new();
        schedule.insert(PrayerEvent::Sunrise, EventPolicy::Toggle(false));
        scheduler.set_schedule(schedule);

        scheduler.refresh();

        let jobs = scheduler.armed_jobs();
        assert_eq!(jobs.len(), PrayerEvent::ALL.len() - 1);
        assert!(jobs.iter().all(|job| job.kind == JobKind::Athan));
        assert!(jobs.iter().all(|job| job.event != PrayerEvent::Sunrise));
        // Soonest first.
        assert_eq!(jobs[0].event, PrayerEvent::Fajr);
    }

    #[tokio::test]
    async fn test_second_refresh_replaces_armed_jobs() {
        let scheduler = scheduler(30);
        scheduler.refresh();
        let first = scheduler.armed_jobs();
        scheduler.refresh();
        let second = scheduler.armed_jobs();

        assert_eq!(first.len(), second.len());
        // Same stable ids, no duplicates across refreshes.
        let ids: std::collections::HashSet<String> =
            second.iter().map(|job| job.id.clone()).collect();
        assert_eq!(ids.len(), second.len());
    }

    #[tokio::test]
    async fn test_past_due_times_are_not_armed() {
        let scheduler = scheduler(-120);
        scheduler.refresh();
        assert!(scheduler.armed_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_reminder_needs_a_positive_offset() {
        let scheduler = scheduler(60);
        let mut schedule = BTreeMap::new();
        schedule.insert(
            PrayerEvent::Fajr,
            EventPolicy::Detailed(EventSettings {
                reminder_enabled: true,
                reminder_offset: 0,
                ..EventSettings::default()
            }),
        );
        schedule.insert(
            PrayerEvent::Dhuhr,
            EventPolicy::Detailed(EventSettings {
                reminder_enabled: true,
                reminder_offset: 15,
                ..EventSettings::default()
            }),
        );
        scheduler.set_schedule(schedule);

        scheduler.refresh();

        let jobs = scheduler.armed_jobs();
        let reminders: Vec<&ArmedJob> = jobs
            .iter()
            .filter(|job| job.kind == JobKind::Reminder)
            .collect();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].event, PrayerEvent::Dhuhr);
        assert_eq!(reminders[0].id, "reminder_Dhuhr");

        let dhuhr_athan = jobs
            .iter()
            .find(|job| job.id == "athan_Dhuhr")
            .expect("athan job armed");
        assert_eq!(
            reminders[0].fire_time,
            dhuhr_athan.fire_time - ChronoDuration::minutes(15)
        );
    }

    #[tokio::test]
    async fn test_invalid_settings_only_skip_their_event() {
        let scheduler = scheduler(30);
        let mut schedule = BTreeMap::new();
        schedule.insert(
            PrayerEvent::Fajr,
            EventPolicy::Detailed(EventSettings {
                athan_volume: 2.0,
                ..EventSettings::default()
            }),
        );
        scheduler.set_schedule(schedule);

        scheduler.refresh();

        let jobs = scheduler.armed_jobs();
        assert!(jobs.iter().all(|job| job.event != PrayerEvent::Fajr));
        assert_eq!(jobs.len(), PrayerEvent::ALL.len() - 1);
    }

    #[tokio::test]
    async fn test_shutdown_disarms_everything() {
        let scheduler = scheduler(30);
        scheduler.refresh();
        assert!(!scheduler.armed_jobs().is_empty());
        scheduler.shutdown();
        assert!(scheduler.armed_jobs().is_empty());
    }

    #[test]
    fn test_next_refresh_rolls_to_tomorrow() {
        let late = NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        let next = next_refresh_after(late);
        assert_eq!(
            next,
            NaiveDate::from_ymd_opt(2025, 6, 2)
                .unwrap()
                .and_hms_opt(0, 1, 0)
                .unwrap()
        );

        let midnight = NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 30)
            .unwrap();
        assert_eq!(
            next_refresh_after(midnight),
            NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_hms_opt(0, 1, 0)
                .unwrap()
        );
    }
}
