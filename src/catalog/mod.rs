/// Data structures and traits for the show catalog.
///
/// This module provides structures to represent a monitored show, its seasons
/// and episodes with their air dates, as well as the trait for catalog clients
/// that fetch the current structure of a show.
mod tvmaze;
mod tvmaze_types;

pub use tvmaze::TvMazeCatalog;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable catalog key of a show (the TVMaze show id rendered as a string).
pub type ShowId = String;

/// Errors that can occur while fetching a show from the catalog.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The catalog does not know the requested show
    #[error("Show not found: {0}")]
    ShowNotFound(ShowId),

    /// The catalog asked us to slow down
    #[error("Rate limited by the catalog")]
    RateLimited,

    /// Request to the catalog failed
    #[error("Request failed: {0}")]
    Network(String),

    /// The request did not complete within the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// The catalog returned invalid or unexpected data
    #[error("Catalog returned invalid data: {0}")]
    InvalidData(String),
}

/// Lifecycle status of a show as reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShowStatus {
    Running,
    Ended,
    ToBeDetermined,
    InDevelopment,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ShowStatus {
    /// The persisted, lowercase name of this status
    pub fn as_str(&self) -> &'static str {
        match self {
            ShowStatus::Running => "running",
            ShowStatus::Ended => "ended",
            ShowStatus::ToBeDetermined => "to-be-determined",
            ShowStatus::InDevelopment => "in-development",
            ShowStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ShowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Airing status of a single season, derived from its episodes' air dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonStatus {
    /// No episode has aired yet
    #[default]
    Upcoming,
    /// Some episodes have aired, others are still pending or undated
    Airing,
    /// Every episode has a date in the past
    Ended,
}

impl SeasonStatus {
    /// Derives the status of a season from its episodes as seen on `today`.
    pub fn derive(episodes: &[Episode], today: NaiveDate) -> Self {
        let aired = episodes.iter().filter(|e| e.has_aired(today)).count();
        if aired == 0 {
            SeasonStatus::Upcoming
        } else if aired == episodes.len() {
            SeasonStatus::Ended
        } else {
            SeasonStatus::Airing
        }
    }
}

/// A single episode of a show.
///
/// Identity is the pair (season number, episode number); title and air date
/// may change upstream without changing which episode this is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    /// The episode number within its season
    pub number: u32,
    /// The episode title
    #[serde(default)]
    pub title: String,
    /// Air date, `None` while unannounced
    #[serde(default)]
    pub air_date: Option<NaiveDate>,
    /// Whether a download has been found for this episode
    #[serde(default)]
    pub available: bool,
    /// Whether a download has already been requested for this episode
    #[serde(default)]
    pub download_triggered: bool,
}

impl Episode {
    /// Creates a catalog episode without any local download state.
    pub fn new(number: u32, title: impl Into<String>, air_date: Option<NaiveDate>) -> Self {
        Self {
            number,
            title: title.into(),
            air_date,
            available: false,
            download_triggered: false,
        }
    }

    /// Whether the episode has a known air date on or before `today`
    pub fn has_aired(&self, today: NaiveDate) -> bool {
        self.air_date.is_some_and(|date| date <= today)
    }
}

/// A season of a show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    /// The season number
    pub number: u32,
    /// Airing status of this season
    #[serde(default)]
    pub status: SeasonStatus,
    /// Episodes ordered by episode number
    pub episodes: Vec<Episode>,
}

impl Season {
    /// Looks up an episode by its number.
    pub fn episode(&self, number: u32) -> Option<&Episode> {
        self.episodes.iter().find(|e| e.number == number)
    }

    /// The earliest known air date in this season, if any
    pub fn premiere(&self) -> Option<NaiveDate> {
        self.episodes.iter().filter_map(|e| e.air_date).min()
    }
}

/// The structure of a show as known at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Show {
    /// The name of the show as reported by the catalog
    #[serde(default)]
    pub name: String,
    /// Lifecycle status of the show
    #[serde(default)]
    pub status: ShowStatus,
    /// When this structure was fetched
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    /// Seasons ordered by season number
    pub seasons: Vec<Season>,
}

impl Show {
    /// Looks up a season by its number.
    pub fn season(&self, number: u32) -> Option<&Season> {
        self.seasons.iter().find(|s| s.number == number)
    }

    /// Looks up an episode by its identity.
    pub fn episode(&self, season: u32, episode: u32) -> Option<&Episode> {
        self.season(season).and_then(|s| s.episode(episode))
    }

    /// Looks up an episode by its identity for modification.
    pub fn episode_mut(&mut self, season: u32, episode: u32) -> Option<&mut Episode> {
        self.seasons
            .iter_mut()
            .find(|s| s.number == season)
            .and_then(|s| s.episodes.iter_mut().find(|e| e.number == episode))
    }

    /// Copies local download state (availability, download marker) from a
    /// previously recorded structure onto this freshly fetched one.
    pub fn inherit_download_state(&mut self, previous: &Show) {
        for season in &mut self.seasons {
            for episode in &mut season.episodes {
                if let Some(old) = previous.episode(season.number, episode.number) {
                    episode.available = old.available;
                    episode.download_triggered = old.download_triggered;
                }
            }
        }
    }
}

/// Trait for catalog clients that can fetch the current structure of a show.
///
/// Implementors of this trait retrieve season and episode information from
/// sources such as TVMaze, TVDB or TMDB.
pub trait CatalogClient {
    /// Fetches the current structure of a show.
    ///
    /// # Arguments
    ///
    /// * `id` - The stable catalog identifier of the show
    ///
    /// # Returns
    ///
    /// The show with its seasons ordered by number and each season's episodes
    /// ordered by number, or a FetchError
    fn fetch_show(&self, id: &str) -> Result<Show, FetchError>;
}
