//! Registry of discovered playback devices.
//!
//! The external discovery feed pushes add/update/remove notifications;
//! [`run_discovery_feed`] applies them to the registry, resolving a live
//! [`Speaker`] handle on add/update. Readers take a copy-on-read
//! [`SpeakerRegistry::snapshot`] so concurrent mutation never corrupts an
//! iteration.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chromecast::ChromecastSpeaker;
use crate::errors::CastError;
use crate::model::{ConnectionState, DeviceId, DeviceInfo, DiscoveredDevice, DiscoveryEvent};
use crate::speaker::Speaker;

#[derive(Clone)]
struct SpeakerEntry {
    info: DeviceInfo,
    speaker: Arc<dyn Speaker>,
}

#[derive(Default)]
pub struct SpeakerRegistry {
    devices: RwLock<HashMap<DeviceId, SpeakerEntry>>,
}

impl SpeakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes a device. A refresh keeps the current
    /// connection state but picks up name/address changes.
    pub fn upsert(&self, device: &DiscoveredDevice, speaker: Arc<dyn Speaker>) {
        let mut devices = self.devices.write().expect("speaker registry lock failed");
        match devices.get_mut(&device.id) {
            Some(entry) => {
                entry.info.friendly_name = device.friendly_name.clone();
                entry.info.address = device.address();
                entry.speaker = speaker;
            }
            None => {
                info!(
                    device = %device.id,
                    name = %device.friendly_name,
                    "new playback device"
                );
                devices.insert(
                    device.id.clone(),
                    SpeakerEntry {
                        info: DeviceInfo {
                            id: device.id.clone(),
                            friendly_name: device.friendly_name.clone(),
                            address: device.address(),
                            state: ConnectionState::Discovered,
                        },
                        speaker,
                    },
                );
            }
        }
    }

    /// Drops a device immediately. Returns whether it was present.
    pub fn remove(&self, id: &DeviceId) -> bool {
        let removed = self
            .devices
            .write()
            .expect("speaker registry lock failed")
            .remove(id)
            .is_some();
        if removed {
            info!(device = %id, "playback device removed");
        }
        removed
    }

    pub fn get(&self, id: &DeviceId) -> Option<Arc<dyn Speaker>> {
        self.devices
            .read()
            .expect("speaker registry lock failed")
            .get(id)
            .map(|entry| Arc::clone(&entry.speaker))
    }

    /// Copy-on-read view for iteration; safe under concurrent mutation.
    pub fn snapshot(&self) -> Vec<(DeviceInfo, Arc<dyn Speaker>)> {
        self.devices
            .read()
            .expect("speaker registry lock failed")
            .values()
            .map(|entry| (entry.info.clone(), Arc::clone(&entry.speaker)))
            .collect()
    }

    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        self.devices
            .read()
            .expect("speaker registry lock failed")
            .values()
            .map(|entry| entry.info.clone())
            .collect()
    }

    pub fn set_state(&self, id: &DeviceId, state: ConnectionState) {
        if let Some(entry) = self
            .devices
            .write()
            .expect("speaker registry lock failed")
            .get_mut(id)
        {
            entry.info.state = state;
        }
    }

    pub fn len(&self) -> usize {
        self.devices
            .read()
            .expect("speaker registry lock failed")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds a live [`Speaker`] handle out of a discovery notification.
/// Resolution may require network I/O.
pub trait SpeakerFactory: Send + Sync {
    fn build(&self, device: &DiscoveredDevice) -> Result<Arc<dyn Speaker>, CastError>;
}

pub struct ChromecastFactory;

impl SpeakerFactory for ChromecastFactory {
    fn build(&self, device: &DiscoveredDevice) -> Result<Arc<dyn Speaker>, CastError> {
        Ok(Arc::new(ChromecastSpeaker::from_discovered(device)))
    }
}

/// Applies discovery notifications to the registry until the feed closes.
///
/// A failed handle resolution is logged and skipped; the device will be
/// retried on its next announcement.
pub async fn run_discovery_feed(
    registry: Arc<SpeakerRegistry>,
    factory: Arc<dyn SpeakerFactory>,
    mut events: mpsc::Receiver<DiscoveryEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            DiscoveryEvent::Added(device) | DiscoveryEvent::Updated(device) => {
                match factory.build(&device) {
                    Ok(speaker) => registry.upsert(&device, speaker),
                    Err(err) => {
                        warn!(device = %device.id, error = %err, "failed to build speaker handle");
                    }
                }
            }
            DiscoveryEvent::Removed(id) => {
                registry.remove(&id);
            }
        }
    }
    debug!("discovery feed closed");
}
