//! Fan-out of play/stop commands to a device subset.
//!
//! One play cycle resets the shared cancellation token, resolves the audio
//! reference, then casts to each selected device sequentially: bounded
//! connect, optional fade-in from silence, per-device failures logged and
//! skipped. A stop request sets the token (observed by any in-flight fade
//! at its next checkpoint) and best-effort stops the selected devices.
//!
//! Casting is deliberately sequential within a cycle: deterministic
//! per-device ordering, no cross-device volume races.

use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::CastError;
use crate::locator::MediaLocator;
use crate::model::{AudioRef, ConnectionState, DeviceId, MediaItem};
use crate::registry::SpeakerRegistry;
use crate::speaker::Speaker;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_LOAD_POLL: Duration = Duration::from_millis(250);
const CONTENT_TYPE: &str = "audio/mp3";

/// Volume ramp shape: `steps` discrete increments, one `step_delay` apart.
#[derive(Clone, Copy, Debug)]
pub struct FadePlan {
    pub steps: u32,
    pub step_delay: Duration,
}

impl Default for FadePlan {
    fn default() -> Self {
        // 10 x 0.5s: a five second ramp.
        Self {
            steps: 10,
            step_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BroadcastSettings {
    pub fade_in: bool,
    /// Fallback device subset when a play request names no targets.
    pub default_devices: Vec<DeviceId>,
    pub fade: FadePlan,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            fade_in: true,
            default_devices: Vec::new(),
            fade: FadePlan::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlayRequest {
    /// Explicit device subset. `Some(vec![])` means "nowhere" and is used
    /// verbatim; `None` falls back to the configured default subset.
    pub targets: Option<Vec<DeviceId>>,
    pub audio: AudioRef,
    /// Target volume in `0.0..=1.0`.
    pub volume: f32,
    pub title: Option<String>,
    pub artwork: Option<String>,
}

pub struct Broadcaster {
    registry: Arc<SpeakerRegistry>,
    locator: Arc<dyn MediaLocator>,
    settings: RwLock<BroadcastSettings>,
    cancel: Mutex<CancellationToken>,
    connect_timeout: Duration,
    load_timeout: Duration,
    load_poll: Duration,
}

impl Broadcaster {
    pub fn new(registry: Arc<SpeakerRegistry>, locator: Arc<dyn MediaLocator>) -> Self {
        Self {
            registry,
            locator,
            settings: RwLock::new(BroadcastSettings::default()),
            cancel: Mutex::new(CancellationToken::new()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            load_poll: DEFAULT_LOAD_POLL,
        }
    }

    /// Overrides the connect/load bounds (tests, slow networks).
    pub fn with_timing(mut self, connect: Duration, load: Duration, poll: Duration) -> Self {
        self.connect_timeout = connect;
        self.load_timeout = load;
        self.load_poll = poll;
        self
    }

    pub fn set_settings(&self, settings: BroadcastSettings) {
        *self
            .settings
            .write()
            .expect("broadcast settings lock failed") = settings;
    }

    pub fn settings(&self) -> BroadcastSettings {
        self.settings
            .read()
            .expect("broadcast settings lock failed")
            .clone()
    }

    pub fn registry(&self) -> &Arc<SpeakerRegistry> {
        &self.registry
    }

    /// Broadcasts `request` to the selected devices, blocking until every
    /// device has been handled. Per-device failures are logged and do not
    /// block the remaining devices.
    pub fn play(&self, request: PlayRequest) {
        // Fresh token for this cycle: a previous stop must not bleed in.
        let token = self.reset_token();

        let Some(url) = self.locator.audio_url(&request.audio) else {
            warn!(audio = ?request.audio, "audio reference did not resolve, nothing to play");
            return;
        };
        let artwork_url = request
            .artwork
            .as_deref()
            .and_then(|reference| self.locator.artwork_url(reference));

        let media = MediaItem {
            url,
            content_type: CONTENT_TYPE.to_string(),
            title: request.title,
            artwork_url,
        };

        let settings = self.settings();
        let targets = effective_targets(request.targets.as_deref(), &settings.default_devices);
        let fade = settings.fade_in.then_some(&settings.fade);

        info!(
            url = %media.url,
            targets = targets.len(),
            fade_in = settings.fade_in,
            "broadcast cycle starting"
        );

        for id in &targets {
            if token.is_cancelled() {
                info!("broadcast aborted by stop signal");
                break;
            }

            let Some(speaker) = self.registry.get(id) else {
                debug!(device = %id, "target not registered, skipping");
                continue;
            };

            if let Err(err) = self.cast_one(&speaker, &media, request.volume, fade, &token) {
                error!(
                    device = %speaker.friendly_name(),
                    error = %err,
                    "failed to cast"
                );
            }
        }
    }

    /// Stops playback on the selected devices (all registered when no
    /// subset is given) and cancels any in-flight fade.
    pub fn stop(&self, targets: Option<&[DeviceId]>) {
        self.cancel
            .lock()
            .expect("cancellation token lock failed")
            .cancel();

        let selected: Vec<Arc<dyn Speaker>> = match targets {
            Some(ids) if !ids.is_empty() => {
                ids.iter().filter_map(|id| self.registry.get(id)).collect()
            }
            _ => self
                .registry
                .snapshot()
                .into_iter()
                .map(|(_, speaker)| speaker)
                .collect(),
        };

        info!(devices = selected.len(), "stopping audio playback");

        for speaker in selected {
            if let Err(err) = speaker.connect(self.connect_timeout) {
                self.registry.set_state(speaker.id(), ConnectionState::Lost);
                warn!(
                    device = %speaker.friendly_name(),
                    error = %err,
                    "could not connect for stop, skipping"
                );
                continue;
            }

            if let Err(err) = speaker.stop_media() {
                // Expected when nothing is playing.
                debug!(device = %speaker.friendly_name(), error = %err, "stop command ignored");
            }

            match speaker.quit() {
                Ok(()) => info!(device = %speaker.friendly_name(), "stopped"),
                Err(err) => {
                    warn!(
                        device = %speaker.friendly_name(),
                        error = %err,
                        "could not tear down session"
                    );
                }
            }
        }
    }

    fn reset_token(&self) -> CancellationToken {
        let mut guard = self
            .cancel
            .lock()
            .expect("cancellation token lock failed");
        *guard = CancellationToken::new();
        guard.clone()
    }

    fn cast_one(
        &self,
        speaker: &Arc<dyn Speaker>,
        media: &MediaItem,
        volume: f32,
        fade: Option<&FadePlan>,
        token: &CancellationToken,
    ) -> Result<(), CastError> {
        info!(device = %speaker.friendly_name(), "casting");
        self.registry
            .set_state(speaker.id(), ConnectionState::Connecting);
        if let Err(err) = speaker.connect(self.connect_timeout) {
            self.registry.set_state(speaker.id(), ConnectionState::Lost);
            return Err(err);
        }
        self.registry
            .set_state(speaker.id(), ConnectionState::Connected);

        match fade {
            Some(plan) => {
                speaker.set_volume(0.0)?;
                speaker.load_media(media)?;

                if !self.wait_media_loaded(speaker.as_ref()) {
                    // Leave the volume low rather than blare on a device in
                    // an unknown state.
                    warn!(
                        device = %speaker.friendly_name(),
                        "media failed to load, skipping fade-in"
                    );
                    return Ok(());
                }

                run_fade(speaker.as_ref(), token, volume, plan);
            }
            None => {
                speaker.set_volume(volume)?;
                speaker.load_media(media)?;
            }
        }

        Ok(())
    }

    /// Polls until the device reports the media active, up to the load
    /// bound.
    fn wait_media_loaded(&self, speaker: &dyn Speaker) -> bool {
        let deadline = Instant::now() + self.load_timeout;
        loop {
            match speaker.media_loaded() {
                Ok(true) => return true,
                Ok(false) => {}
                Err(err) => {
                    debug!(device = %speaker.friendly_name(), error = %err, "media status poll failed");
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(self.load_poll);
        }
    }
}

/// Explicit subset (empty included) is used verbatim; `None` falls back to
/// the configured default subset.
pub fn effective_targets(explicit: Option<&[DeviceId]>, fallback: &[DeviceId]) -> Vec<DeviceId> {
    match explicit {
        Some(ids) => ids.to_vec(),
        None => fallback.to_vec(),
    }
}

/// Ramps the volume from silence to `target` in `plan.steps` increments,
/// checking the cancellation token before each step. Worst case, one
/// increment lands after cancellation.
pub fn run_fade(speaker: &dyn Speaker, token: &CancellationToken, target: f32, plan: &FadePlan) {
    if plan.steps == 0 {
        return;
    }
    let step = target / plan.steps as f32;
    let mut current = 0.0_f32;

    for _ in 0..plan.steps {
        if token.is_cancelled() {
            info!(device = %speaker.friendly_name(), "fade-in interrupted");
            return;
        }
        std::thread::sleep(plan.step_delay);
        current = (current + step).min(target);
        if let Err(err) = speaker.set_volume(current) {
            warn!(device = %speaker.friendly_name(), error = %err, "volume step failed, aborting fade");
            return;
        }
    }
}
