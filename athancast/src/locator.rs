//! Résolution des références audio locales en URLs récupérables par les
//! appareils.
//!
//! Les fichiers vivent sous `audio/athan` et `audio/reminders`; le serveur
//! HTTP externe les expose sous `/audio/...`. La résolution applique les
//! chaînes de repli: fichier demandé → fichier par défaut → premier fichier
//! disponible (athan) ou `beep.mp3` (reminder).

use std::fs;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::model::AudioRef;

const ATHAN_DIR: &str = "athan";
const REMINDER_DIR: &str = "reminders";
const DEFAULT_ATHAN_FILE: &str = "athan_alqahera.mp3";
const DEFAULT_REMINDER_FILE: &str = "beep.mp3";

/// Resolves media references to URLs the playback devices can fetch.
pub trait MediaLocator: Send + Sync {
    /// Fetchable URL for an audio reference, `None` when nothing resolves.
    fn audio_url(&self, reference: &AudioRef) -> Option<String>;

    /// Fetchable URL for an artwork reference.
    fn artwork_url(&self, reference: &str) -> Option<String>;
}

/// Directory-backed media locator.
pub struct AudioLibrary {
    base_dir: PathBuf,
    /// `http://host:port`, no trailing slash.
    base_url: String,
    default_athan: String,
}

impl AudioLibrary {
    pub fn new(base_dir: impl Into<PathBuf>, http_port: u16, default_athan: Option<String>) -> Self {
        let base_url = format!("http://{}:{}", guess_local_ip(), http_port);
        Self::with_base_url(base_dir, base_url, default_athan)
    }

    pub fn with_base_url(
        base_dir: impl Into<PathBuf>,
        base_url: String,
        default_athan: Option<String>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            base_url,
            default_athan: default_athan
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ATHAN_FILE.to_string()),
        }
    }

    fn list_mp3(dir: &Path) -> Vec<String> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut files: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".mp3"))
            .collect();
        files.sort();
        files
    }

    /// Requested file → configured default → first available file.
    fn resolve_athan(&self, file: Option<&str>) -> Option<PathBuf> {
        let dir = self.base_dir.join(ATHAN_DIR);
        let requested = file.unwrap_or(&self.default_athan);

        let path = dir.join(requested);
        if path.is_file() {
            return Some(path);
        }

        let default_path = dir.join(&self.default_athan);
        if default_path.is_file() {
            warn!(file = requested, "athan file not found, using default");
            return Some(default_path);
        }

        if let Some(first) = Self::list_mp3(&dir).into_iter().next() {
            warn!(file = %first, "default athan not found, using first available");
            return Some(dir.join(first));
        }

        error!("no athan files available");
        None
    }

    /// Requested file → `beep.mp3`.
    fn resolve_reminder(&self, file: Option<&str>) -> Option<PathBuf> {
        let dir = self.base_dir.join(REMINDER_DIR);
        let requested = file.unwrap_or(DEFAULT_REMINDER_FILE);

        let path = dir.join(requested);
        if path.is_file() {
            return Some(path);
        }

        let beep = dir.join(DEFAULT_REMINDER_FILE);
        if beep.is_file() {
            warn!(file = requested, "reminder file not found, using beep.mp3");
            return Some(beep);
        }

        error!("no reminder files available");
        None
    }

    fn url_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_dir).ok()?;
        Some(format!(
            "{}/audio/{}",
            self.base_url,
            relative.to_string_lossy().replace('\\', "/")
        ))
    }
}

impl MediaLocator for AudioLibrary {
    fn audio_url(&self, reference: &AudioRef) -> Option<String> {
        let path = match reference {
            AudioRef::Athan { file } => self.resolve_athan(file.as_deref())?,
            AudioRef::Reminder { file } => self.resolve_reminder(file.as_deref())?,
        };
        self.url_for(&path)
    }

    fn artwork_url(&self, reference: &str) -> Option<String> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Some(reference.to_string());
        }
        let name = Path::new(reference).file_name()?.to_string_lossy();
        Some(format!("{}/static/img/{}", self.base_url, name))
    }
}

/// Devine l'adresse IP locale de la machine via une connexion UDP (jamais
/// émise) vers un serveur public; repli sur `127.0.0.1`.
pub fn guess_local_ip() -> String {
    match UdpSocket::bind("0.0.0.0:0") {
        Ok(socket) => {
            if socket.connect("8.8.8.8:80").is_ok() {
                if let Ok(local_addr) = socket.local_addr() {
                    return local_addr.ip().to_string();
                }
            }
            "127.0.0.1".to_string()
        }
        Err(_) => "127.0.0.1".to_string(),
    }
}
