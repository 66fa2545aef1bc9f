//! Settings file loading and validation
//!
//! Settings are read from a TOML file once at startup and validated before
//! anything else happens, so a broken configuration fails fast instead of
//! halfway through a run.

use crate::catalog::ShowId;
use lettre::message::Mailbox;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading the settings file
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to determine the default config directory location
    #[error("Failed to determine config directory location")]
    ConfigDirectoryNotFound,

    /// Failed to read the settings file
    #[error("Failed to read settings file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The settings file is not valid TOML or has the wrong shape
    #[error("Failed to parse settings file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A setting is missing or has an unusable value
    #[error("Invalid setting `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}

fn check_mailbox(field: &str, address: &str) -> Result<(), SettingsError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map(|_| ())
        .map_err(|e| invalid(field, format!("`{address}` is not a valid email address: {e}")))
}

/// How closely a show is watched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    /// Report new seasons, episodes and schedule changes
    #[default]
    Notify,
    /// Additionally look for downloads of freshly aired episodes
    Download,
}

/// A show to monitor
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShowConfig {
    /// TVMaze show id
    pub id: u64,
    /// Display name, also used as the download search title
    pub name: String,
    #[serde(default)]
    pub mode: MonitorMode,
}

impl ShowConfig {
    /// The snapshot key of this show
    pub fn show_id(&self) -> ShowId {
        self.id.to_string()
    }
}

/// SMTP report settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    /// If false, no report is sent
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Account to send from (also the From address)
    pub username: String,
    pub password: String,
    pub recipients: Vec<String>,
    pub subject: String,
    /// Text placed above the list of changes
    pub intro: String,
    /// Commit the snapshot even if the report could not be sent
    pub commit_on_failure: bool,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            recipients: Vec::new(),
            subject: "Your daily TV update!".to_string(),
            intro: "Hi,\r\nYour daily TV update is here.\r\nEnjoy!".to_string(),
            commit_on_failure: true,
        }
    }
}

/// TorrentLeech download settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TorrentLeechSettings {
    pub username: String,
    pub password: String,
    /// Directory the .torrent files are saved to
    pub torrents_directory: PathBuf,
    /// Resolutions to look for, most preferred first
    pub qualities: Vec<String>,
    /// Episodes that aired longer ago than this are not looked for
    pub maximum_torrent_days: u32,
    /// Free space (in MB) that must remain after saving a download
    pub minimum_free_space_mb: u64,
}

impl Default for TorrentLeechSettings {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            torrents_directory: std::env::temp_dir().join("torrents"),
            qualities: vec!["720p".to_string(), "1080p".to_string()],
            maximum_torrent_days: 2,
            minimum_free_space_mb: 3 * 1024,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_skip_statuses() -> Vec<String> {
    vec!["ended".to_string()]
}

/// Complete, validated settings of one monitor installation
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Where the snapshot is kept; defaults to the platform data directory
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// Log file; when unset, logs go to stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Timeout applied to every HTTP request
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Shows whose last recorded status is listed here are not checked again
    #[serde(default = "default_skip_statuses")]
    pub skip_statuses: Vec<String>,
    #[serde(default)]
    pub email: EmailSettings,
    #[serde(default)]
    pub torrentleech: Option<TorrentLeechSettings>,
    #[serde(default)]
    pub shows: Vec<ShowConfig>,
}

impl Settings {
    /// Default settings location in the system's standard config directory
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let proj_dirs = directories::ProjectDirs::from("", "", "show-sentinel")
            .ok_or(SettingsError::ConfigDirectoryNotFound)?;
        Ok(proj_dirs.config_dir().join("settings.toml"))
    }

    /// Reads and validates the settings file at `path`
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|e| SettingsError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let settings: Settings =
            toml::from_str(&content).map_err(|e| SettingsError::ParseFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Checks every constraint that cannot be expressed in the types
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.shows.is_empty() {
            return Err(invalid("shows", "at least one show must be configured"));
        }

        let mut seen = HashSet::new();
        for (index, show) in self.shows.iter().enumerate() {
            if show.name.trim().is_empty() {
                return Err(invalid(format!("shows[{index}].name"), "must not be empty"));
            }
            if !seen.insert(show.id) {
                return Err(invalid(
                    format!("shows[{index}].id"),
                    format!("show id {} is configured more than once", show.id),
                ));
            }
        }

        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be greater than zero"));
        }

        if self.email.enabled {
            if self.email.smtp_host.trim().is_empty() {
                return Err(invalid("email.smtp_host", "must not be empty"));
            }
            if self.email.username.trim().is_empty() {
                return Err(invalid("email.username", "must not be empty"));
            }
            if self.email.recipients.is_empty() {
                return Err(invalid("email.recipients", "at least one recipient is required"));
            }
            check_mailbox("email.username", &self.email.username)?;
            for (index, recipient) in self.email.recipients.iter().enumerate() {
                check_mailbox(&format!("email.recipients[{index}]"), recipient)?;
            }
        }

        let wants_downloads = self.shows.iter().any(|s| s.mode == MonitorMode::Download);
        match &self.torrentleech {
            None if wants_downloads => {
                return Err(invalid(
                    "torrentleech",
                    "section is required when a show uses download mode",
                ));
            }
            Some(torrentleech) if wants_downloads => {
                if torrentleech.username.trim().is_empty() {
                    return Err(invalid("torrentleech.username", "must not be empty"));
                }
                if torrentleech.qualities.is_empty() {
                    return Err(invalid(
                        "torrentleech.qualities",
                        "at least one quality is required",
                    ));
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// The configured request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether any configured show wants downloads
    pub fn downloads_enabled(&self) -> bool {
        self.torrentleech.is_some() && self.shows.iter().any(|s| s.mode == MonitorMode::Download)
    }
}
