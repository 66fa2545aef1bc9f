/// TVMaze catalog client implementation.
use super::tvmaze_types::{TvMazeEpisode, TvMazeShow};
use super::{CatalogClient, Episode, FetchError, Season, SeasonStatus, Show, ShowStatus};
use chrono::{Local, NaiveDate, Utc};
use log::debug;
use std::collections::BTreeMap;
use std::time::Duration;

/// Catalog client for the TVMaze API.
///
/// This client fetches show information from https://api.tvmaze.com
/// using the show endpoint with embedded episodes.
pub struct TvMazeCatalog {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl TvMazeCatalog {
    /// Creates a new TVMaze client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://api.tvmaze.com".to_string(),
        })
    }

    /// Converts a TVMaze episode to our internal Episode structure.
    ///
    /// Specials without an episode number have no stable identity and are skipped.
    fn convert_episode(tvmaze_episode: TvMazeEpisode) -> Option<(u32, Episode)> {
        let number = tvmaze_episode.number?;
        let air_date = tvmaze_episode
            .airdate
            .filter(|d| !d.is_empty())
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok());

        Some((
            tvmaze_episode.season,
            Episode::new(
                number,
                tvmaze_episode.name.unwrap_or_else(|| "TBA".to_string()),
                air_date,
            ),
        ))
    }

    fn convert_status(status: Option<&str>) -> ShowStatus {
        match status {
            Some("Running") => ShowStatus::Running,
            Some("Ended") => ShowStatus::Ended,
            Some("To Be Determined") => ShowStatus::ToBeDetermined,
            Some("In Development") => ShowStatus::InDevelopment,
            _ => ShowStatus::Unknown,
        }
    }

    /// Converts TVMaze show data to our internal Show structure.
    ///
    /// Groups episodes by season, orders seasons and episodes by number and
    /// derives each season's status relative to `today`.
    fn convert_to_show(tvmaze_show: TvMazeShow, today: NaiveDate) -> Result<Show, FetchError> {
        // Extract episodes from embedded data
        let episodes = tvmaze_show
            .embedded
            .ok_or_else(|| {
                FetchError::InvalidData("No episodes found in API response".to_string())
            })?
            .episodes;

        // BTreeMap keeps seasons sorted by number
        let mut seasons_map: BTreeMap<u32, Vec<Episode>> = BTreeMap::new();

        for (season_number, episode) in episodes.into_iter().filter_map(Self::convert_episode) {
            seasons_map.entry(season_number).or_default().push(episode);
        }

        let seasons = seasons_map
            .into_iter()
            .map(|(number, mut episodes)| {
                episodes.sort_by_key(|e| e.number);
                episodes.dedup_by_key(|e| e.number);
                Season {
                    number,
                    status: SeasonStatus::derive(&episodes, today),
                    episodes,
                }
            })
            .collect();

        Ok(Show {
            name: tvmaze_show.name,
            status: Self::convert_status(tvmaze_show.status.as_deref()),
            last_checked: Some(Utc::now()),
            seasons,
        })
    }
}

impl CatalogClient for TvMazeCatalog {
    fn fetch_show(&self, id: &str) -> Result<Show, FetchError> {
        // Build the API URL
        let url = format!("{}/shows/{}", self.base_url, id);
        debug!("Fetching {url}");

        let response = self
            .client
            .get(&url)
            .query(&[("embed", "episodes")])
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

        // Check if the show was found
        if response.status() == 404 {
            return Err(FetchError::ShowNotFound(id.to_string()));
        }

        if response.status() == 429 {
            return Err(FetchError::RateLimited);
        }

        // Ensure request was successful
        if !response.status().is_success() {
            return Err(FetchError::Network(format!(
                "HTTP {} {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        // Parse the JSON response
        let tvmaze_show: TvMazeShow = response.json().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::InvalidData(e.to_string())
            }
        })?;

        Self::convert_to_show(tvmaze_show, Local::now().date_naive())
    }
}
