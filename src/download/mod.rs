//! Download triggering module
//!
//! This module looks up downloads for episodes that became available and
//! starts them exactly once. Whether an episode was already requested is
//! persisted in the snapshot, so repeated runs never request it again.

mod cached;
mod release;
mod torrentleech;

pub use cached::CachedDownloadSource;
pub use torrentleech::TorrentLeechClient;

use crate::ProgressEvent;
use crate::catalog::ShowId;
use crate::diff::ChangeEvent;
use crate::settings::ShowConfig;
use crate::snapshot::Snapshot;
use log::{info, warn};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while looking up or starting a download
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    /// No download exists for the episode
    #[error("No download found")]
    NotFound,

    /// The download was requested before
    #[error("Download was already requested")]
    AlreadyTriggered,

    /// Request to the download source failed
    #[error("Request failed: {0}")]
    Network(String),

    /// The download could not be saved locally
    #[error("Failed to store download: {0}")]
    Storage(String),

    /// Saving the download would eat into the reserved free space
    #[error("Not enough free space: {required_mb} MB needed, {available_mb} MB usable")]
    InsufficientSpace { required_mb: u64, available_mb: u64 },
}

/// A located download that can be triggered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadHandle {
    /// Release name as listed by the source
    pub title: String,
    /// Where the download is fetched from
    pub url: String,
    /// Resolution of the release (e.g. 720p)
    pub quality: String,
    /// Size of the release in bytes, if the source lists it
    pub size_bytes: Option<u64>,
}

/// Trait for sources episodes can be downloaded from
pub trait DownloadSource {
    /// Looks up a download for one episode of a show
    ///
    /// # Errors
    ///
    /// `DownloadError::NotFound` if the source has nothing for the episode,
    /// `DownloadError::Network` if the source could not be asked.
    fn find_download(
        &self,
        show_name: &str,
        season: u32,
        episode: u32,
    ) -> Result<DownloadHandle, DownloadError>;

    /// Starts a download located by `find_download`
    ///
    /// # Errors
    ///
    /// `DownloadError::AlreadyTriggered` if this download was started before.
    fn trigger(&self, handle: &DownloadHandle) -> Result<(), DownloadError>;
}

/// What happened to one available episode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Triggered(DownloadHandle),
    NotFound,
    AlreadyTriggered,
    Failed(DownloadError),
}

impl DownloadOutcome {
    /// Whether the episode counts as requested afterwards
    pub fn is_requested(&self) -> bool {
        matches!(
            self,
            DownloadOutcome::Triggered(_) | DownloadOutcome::AlreadyTriggered
        )
    }
}

/// The outcome of one download attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRecord {
    pub show_id: ShowId,
    pub season: u32,
    pub episode: u32,
    pub outcome: DownloadOutcome,
}

impl DownloadRecord {
    /// The error of a failed attempt
    pub fn error(&self) -> Option<&DownloadError> {
        match &self.outcome {
            DownloadOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for DownloadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Show {} S{:02}E{:02}: ", self.show_id, self.season, self.episode)?;
        match &self.outcome {
            DownloadOutcome::Triggered(handle) => write!(f, "requested {}", handle.title),
            DownloadOutcome::NotFound => write!(f, "not found"),
            DownloadOutcome::AlreadyTriggered => write!(f, "already requested"),
            DownloadOutcome::Failed(error) => write!(f, "{}", error),
        }
    }
}

/// Starts downloads for the episodes that became available during a run
pub struct DownloadTrigger<'a> {
    source: &'a dyn DownloadSource,
    names: HashMap<ShowId, String>,
}

impl<'a> DownloadTrigger<'a> {
    /// Creates a trigger searching the source with the configured show names
    pub fn new(source: &'a dyn DownloadSource, shows: &[ShowConfig]) -> Self {
        let names = shows.iter().map(|s| (s.show_id(), s.name.clone())).collect();
        Self { source, names }
    }

    /// Handles every `EpisodeAvailableForDownload` event of a run
    ///
    /// Episodes already marked as requested in `snapshot` are skipped without
    /// asking the source. Requested episodes get their marker set; episodes
    /// that could not be requested lose their availability flag, so the next
    /// scan looks for them again. A failure for one episode does not stop the
    /// others.
    pub fn run<F>(
        &self,
        events: &[ChangeEvent],
        snapshot: &mut Snapshot,
        progress_callback: &mut F,
    ) -> Vec<DownloadRecord>
    where
        F: FnMut(ProgressEvent),
    {
        let mut records = Vec::new();

        for event in events {
            let ChangeEvent::EpisodeAvailableForDownload {
                show_id,
                season,
                episode,
            } = event
            else {
                continue;
            };
            let (season, episode) = (*season, *episode);

            let name = self
                .names
                .get(show_id)
                .cloned()
                .or_else(|| snapshot.get(show_id).map(|s| s.name.clone()))
                .unwrap_or_else(|| show_id.clone());

            progress_callback(ProgressEvent::Downloading {
                show_name: name.clone(),
                season,
                episode,
            });

            let already_requested = snapshot
                .get(show_id)
                .and_then(|s| s.episode(season, episode))
                .is_some_and(|e| e.download_triggered);

            let outcome = if already_requested {
                DownloadOutcome::AlreadyTriggered
            } else {
                self.request(&name, season, episode)
            };

            match &outcome {
                DownloadOutcome::Triggered(handle) => {
                    info!("{name} S{season:02}E{episode:02}: requested {}", handle.title)
                }
                DownloadOutcome::Failed(error) => {
                    warn!("{name} S{season:02}E{episode:02}: download failed: {error}")
                }
                other => info!("{name} S{season:02}E{episode:02}: {other:?}"),
            }

            if let Some(recorded) = snapshot.episode_mut(show_id, season, episode) {
                if outcome.is_requested() {
                    recorded.download_triggered = true;
                } else {
                    recorded.available = false;
                }
            }

            progress_callback(ProgressEvent::DownloadFinished {
                show_name: name,
                season,
                episode,
                outcome: outcome.clone(),
            });

            records.push(DownloadRecord {
                show_id: show_id.clone(),
                season,
                episode,
                outcome,
            });
        }

        records
    }

    fn request(&self, show_name: &str, season: u32, episode: u32) -> DownloadOutcome {
        let handle = match self.source.find_download(show_name, season, episode) {
            Ok(handle) => handle,
            Err(DownloadError::NotFound) => return DownloadOutcome::NotFound,
            Err(error) => return DownloadOutcome::Failed(error),
        };

        match self.source.trigger(&handle) {
            Ok(()) => DownloadOutcome::Triggered(handle),
            Err(DownloadError::AlreadyTriggered) => DownloadOutcome::AlreadyTriggered,
            Err(error) => DownloadOutcome::Failed(error),
        }
    }
}
