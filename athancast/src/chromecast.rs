//! Chromecast backend for the [`Speaker`] trait, on top of `rust_cast`.
//!
//! A fresh connection is created for each operation to avoid holding the
//! `CastDevice` lifetime across calls; receiver and media session ids are
//! cached in between so repeated commands reuse the running app.

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::time::Duration;

use rust_cast::CastDevice;
use rust_cast::channels::media::{Image, Media, Metadata, MusicTrackMediaMetadata, PlayerState, StreamType};
use rust_cast::channels::receiver::CastDeviceApp;
use tracing::debug;

use crate::errors::CastError;
use crate::model::{DeviceId, DiscoveredDevice, MediaItem};
use crate::speaker::Speaker;

/// Default Chromecast control port.
pub const DEFAULT_CHROMECAST_PORT: u16 = 8009;

/// Session ids cached between operations.
#[derive(Debug, Default)]
struct SessionState {
    receiver_session_id: Option<String>,
    media_session_id: Option<i32>,
    destination_id: Option<String>,
}

impl SessionState {
    fn clear(&mut self) {
        self.receiver_session_id = None;
        self.media_session_id = None;
        self.destination_id = None;
    }
}

#[derive(Debug)]
pub struct ChromecastSpeaker {
    id: DeviceId,
    friendly_name: String,
    host: String,
    port: u16,
    session: Mutex<SessionState>,
}

impl ChromecastSpeaker {
    pub fn from_discovered(device: &DiscoveredDevice) -> Self {
        debug!(
            device = %device.id,
            name = %device.friendly_name,
            address = %device.address(),
            "creating Chromecast speaker"
        );
        Self {
            id: device.id.clone(),
            friendly_name: device.friendly_name.clone(),
            host: device.host.clone(),
            port: device.port,
            session: Mutex::new(SessionState::default()),
        }
    }

    fn device(&self) -> Result<CastDevice<'_>, CastError> {
        CastDevice::connect(&self.host, self.port).map_err(CastError::chromecast)
    }

    /// Launches the Default Media Receiver if no session is cached, and
    /// returns a live connection.
    fn ensure_session(&self) -> Result<CastDevice<'_>, CastError> {
        let device = self.device()?;
        let mut session = self.session.lock().expect("session state lock failed");

        if session.receiver_session_id.is_none() {
            debug!(device = %self.id, "launching Default Media Receiver");
            let app = device
                .receiver
                .launch_app(&CastDeviceApp::DefaultMediaReceiver)
                .map_err(CastError::chromecast)?;
            session.receiver_session_id = Some(app.session_id.clone());
            session.destination_id = Some(app.transport_id.clone());
        }

        Ok(device)
    }

    fn build_media(media: &MediaItem) -> Media {
        let images = media
            .artwork_url
            .clone()
            .map(|url| {
                vec![Image {
                    url,
                    dimensions: None,
                }]
            })
            .unwrap_or_default();

        let metadata = MusicTrackMediaMetadata {
            title: media.title.clone(),
            images,
            ..Default::default()
        };

        Media {
            content_id: media.url.clone(),
            content_type: media.content_type.clone(),
            stream_type: StreamType::Buffered,
            metadata: Some(Metadata::MusicTrack(metadata)),
            duration: None,
        }
    }
}

impl Speaker for ChromecastSpeaker {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    fn connect(&self, timeout: Duration) -> Result<(), CastError> {
        let address = format!("{}:{}", self.host, self.port);
        let socket_addr = address
            .to_socket_addrs()
            .map_err(|_| CastError::InvalidAddress(address.clone()))?
            .next()
            .ok_or_else(|| CastError::InvalidAddress(address.clone()))?;

        // Reachability probe only; the control connection itself is opened
        // per operation.
        TcpStream::connect_timeout(&socket_addr, timeout)
            .map(|_| ())
            .map_err(|_| CastError::ConnectTimeout(self.friendly_name.clone(), timeout))
    }

    fn set_volume(&self, level: f32) -> Result<(), CastError> {
        let device = self.device()?;
        device
            .receiver
            .set_volume(level.clamp(0.0, 1.0))
            .map(|_| ())
            .map_err(CastError::chromecast)
    }

    fn load_media(&self, media: &MediaItem) -> Result<(), CastError> {
        let device = self.ensure_session()?;

        let (destination_id, session_id) = {
            let session = self.session.lock().expect("session state lock failed");
            (
                session
                    .destination_id
                    .clone()
                    .ok_or_else(|| CastError::NoSession(self.friendly_name.clone()))?,
                session
                    .receiver_session_id
                    .clone()
                    .ok_or_else(|| CastError::NoSession(self.friendly_name.clone()))?,
            )
        };

        let status = device
            .media
            .load(&destination_id, &session_id, &Self::build_media(media))
            .map_err(CastError::chromecast)?;

        if let Some(entry) = status.entries.first() {
            self.session
                .lock()
                .expect("session state lock failed")
                .media_session_id = Some(entry.media_session_id);
            debug!(
                device = %self.id,
                media_session = entry.media_session_id,
                "media loaded"
            );
        }

        Ok(())
    }

    fn media_loaded(&self) -> Result<bool, CastError> {
        let destination_id = {
            let session = self.session.lock().expect("session state lock failed");
            match session.destination_id.clone() {
                Some(id) => id,
                None => return Ok(false),
            }
        };

        let device = self.device()?;
        let status = device
            .media
            .get_status(destination_id, None)
            .map_err(CastError::chromecast)?;

        Ok(status
            .entries
            .iter()
            .any(|entry| !matches!(entry.player_state, PlayerState::Idle)))
    }

    fn stop_media(&self) -> Result<(), CastError> {
        let (destination_id, media_session_id) = {
            let session = self.session.lock().expect("session state lock failed");
            match (session.destination_id.clone(), session.media_session_id) {
                (Some(destination), Some(media_session)) => (destination, media_session),
                _ => return Err(CastError::NoSession(self.friendly_name.clone())),
            }
        };

        let device = self.device()?;
        device
            .media
            .stop(&destination_id, media_session_id)
            .map(|_| ())
            .map_err(CastError::chromecast)
    }

    fn quit(&self) -> Result<(), CastError> {
        let receiver_session_id = {
            let session = self.session.lock().expect("session state lock failed");
            session.receiver_session_id.clone()
        };

        if let Some(session_id) = receiver_session_id {
            let device = self.device()?;
            device
                .receiver
                .stop_app(&session_id)
                .map_err(CastError::chromecast)?;
        }

        self.session
            .lock()
            .expect("session state lock failed")
            .clear();
        Ok(())
    }
}
