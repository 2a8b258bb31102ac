use std::fmt;
use std::time::Duration;

use crate::errors::CastError;
use crate::model::{DeviceId, MediaItem};

/// Blocking control surface of one playback device.
///
/// Everything a broadcast cycle needs, nothing more. Implementations are
/// expected to keep individual operations short; `connect` takes an explicit
/// bound so one unreachable device cannot stall an entire cast or stop
/// cycle.
pub trait Speaker: Send + Sync + fmt::Debug {
    fn id(&self) -> &DeviceId;

    fn friendly_name(&self) -> &str;

    /// Bounded-wait connectivity check. Returns `CastError::ConnectTimeout`
    /// when the device does not answer within `timeout`.
    fn connect(&self, timeout: Duration) -> Result<(), CastError>;

    /// Sets the device volume, `level` in `0.0..=1.0`.
    fn set_volume(&self, level: f32) -> Result<(), CastError>;

    /// Loads and starts the given media.
    fn load_media(&self, media: &MediaItem) -> Result<(), CastError>;

    /// Whether the media loaded by [`Speaker::load_media`] is active.
    fn media_loaded(&self) -> Result<bool, CastError>;

    /// Stops the active media, if any.
    fn stop_media(&self) -> Result<(), CastError>;

    /// Tears the playback session down.
    fn quit(&self) -> Result<(), CastError>;
}
