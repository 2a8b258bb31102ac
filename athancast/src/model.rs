use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, comparable playback-device identifier.
///
/// Devices are matched on id only, never on display name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        DeviceId(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Discovered,
    Connecting,
    Connected,
    Lost,
}

/// Registry view of one playback device.
#[derive(Clone, Debug, Serialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub friendly_name: String,
    /// `host:port` reported by the discovery feed.
    pub address: String,
    pub state: ConnectionState,
}

/// A device as reported by the external discovery feed.
#[derive(Clone, Debug)]
pub struct DiscoveredDevice {
    pub id: DeviceId,
    pub friendly_name: String,
    pub host: String,
    pub port: u16,
}

impl DiscoveredDevice {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Notifications arriving from the discovery feed.
#[derive(Clone, Debug)]
pub enum DiscoveryEvent {
    Added(DiscoveredDevice),
    Updated(DiscoveredDevice),
    Removed(DeviceId),
}

/// Audio reference to be resolved through the media locator.
#[derive(Clone, Debug)]
pub enum AudioRef {
    /// Athan audio, optionally a per-event override file name.
    Athan { file: Option<String> },
    /// Reminder audio, optionally a per-event override file name.
    Reminder { file: Option<String> },
}

/// Resolved media handed to a device.
#[derive(Clone, Debug)]
pub struct MediaItem {
    pub url: String,
    pub content_type: String,
    pub title: Option<String>,
    pub artwork_url: Option<String>,
}
