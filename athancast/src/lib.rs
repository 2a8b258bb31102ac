//! Network speaker control for athan broadcasts.
//!
//! This crate owns the device side of the system:
//! - [`SpeakerRegistry`] tracks playback devices discovered by an external
//!   discovery feed (add/update/remove notifications),
//! - [`Speaker`] is the blocking control surface a broadcast cycle needs,
//!   with a Chromecast backend on top of `rust_cast`,
//! - [`Broadcaster`] fans a play/stop command out to a device subset with
//!   volume fade-in and cooperative cancellation,
//! - [`MediaLocator`] resolves local audio references to URLs the devices
//!   can fetch.

pub mod broadcaster;
pub mod chromecast;
pub mod errors;
pub mod locator;
pub mod model;
pub mod registry;
pub mod speaker;

pub use broadcaster::{BroadcastSettings, Broadcaster, FadePlan, PlayRequest};
pub use chromecast::ChromecastSpeaker;
pub use errors::CastError;
pub use locator::{AudioLibrary, MediaLocator, guess_local_ip};
pub use model::{
    AudioRef, ConnectionState, DeviceId, DeviceInfo, DiscoveredDevice, DiscoveryEvent, MediaItem,
};
pub use registry::{ChromecastFactory, SpeakerFactory, SpeakerRegistry, run_discovery_feed};
pub use speaker::Speaker;
