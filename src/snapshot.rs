//! Snapshot storage module
//!
//! This module provides the persisted state of all monitored shows. The
//! snapshot is serialized as one JSON document mapping show identifiers to
//! their last recorded structure, and is replaced atomically on every save.

use crate::catalog::{Episode, Show, ShowId};
use crate::temp::stage_file;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading or saving the snapshot
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to determine the default data directory location
    #[error("Failed to determine data directory location")]
    DataDirectoryNotFound,

    /// Failed to create the directory holding the snapshot
    #[error("Failed to create snapshot directory at {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read the snapshot file
    #[error("Failed to read snapshot file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write the snapshot file
    #[error("Failed to write snapshot file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The snapshot file exists but is not a valid snapshot
    #[error("Failed to deserialize snapshot file {path}: {source}")]
    DeserializationFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to serialize the snapshot
    #[error("Failed to serialize snapshot: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// The recorded structure of every monitored show, keyed by show identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    shows: BTreeMap<ShowId, Show>,
}

impl Snapshot {
    /// The recorded structure of a show, if it was seen before
    pub fn get(&self, id: &str) -> Option<&Show> {
        self.shows.get(id)
    }

    /// Records the structure of a show, replacing any previous entry
    pub fn insert(&mut self, id: impl Into<ShowId>, show: Show) {
        self.shows.insert(id.into(), show);
    }

    /// Looks up a recorded episode for modification
    pub fn episode_mut(&mut self, id: &str, season: u32, episode: u32) -> Option<&mut Episode> {
        self.shows
            .get_mut(id)
            .and_then(|show| show.episode_mut(season, episode))
    }

    /// Iterates over all recorded shows in identifier order
    pub fn iter(&self) -> impl Iterator<Item = (&ShowId, &Show)> {
        self.shows.iter()
    }

    pub fn len(&self) -> usize {
        self.shows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shows.is_empty()
    }
}

/// Trait for stores that persist the snapshot between runs
pub trait SnapshotStore {
    /// Loads the last committed snapshot, or an empty one if none exists yet
    fn load(&self) -> Result<Snapshot, StoreError>;

    /// Replaces the stored snapshot with `snapshot`
    ///
    /// Implementations must be atomic: a crash mid-save leaves the previous
    /// snapshot intact.
    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// Snapshot store backed by a single JSON file
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    /// Creates a store for the snapshot file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default snapshot location in the system's standard data directory
    ///
    /// - Linux: ~/.local/share/show-sentinel/snapshot.json
    /// - macOS: ~/Library/Application Support/show-sentinel/snapshot.json
    /// - Windows: %APPDATA%\show-sentinel\data\snapshot.json
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let proj_dirs = directories::ProjectDirs::from("", "", "show-sentinel")
            .ok_or(StoreError::DataDirectoryNotFound)?;
        Ok(proj_dirs.data_dir().join("snapshot.json"))
    }

    /// Returns the path of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        info!("Loading snapshot from {}", self.path.display());

        // A missing file means this is the first run
        if !self.path.exists() {
            info!("Snapshot file doesn't exist, starting from scratch");
            return Ok(Snapshot::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| StoreError::ReadFailed {
            path: self.path.clone(),
            source: e,
        })?;

        let snapshot: Snapshot =
            serde_json::from_str(&content).map_err(|e| StoreError::DeserializationFailed {
                path: self.path.clone(),
                source: e,
            })?;

        debug!("Loaded {} show(s) from snapshot", snapshot.len());
        Ok(snapshot)
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let content = serde_json::to_string_pretty(snapshot)?;

        let write_failed = |e| StoreError::WriteFailed {
            path: self.path.clone(),
            source: e,
        };
        stage_file(&self.path, content.as_bytes())
            .and_then(|staged| staged.persist(&self.path))
            .map_err(write_failed)?;

        info!("Snapshot saved to {}", self.path.display());
        Ok(())
    }
}
