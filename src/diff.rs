//! Change detection between two recorded structures of a show
//!
//! The diff is a pure function of the previous and the current structure.
//! Events come out in season-ascending, episode-ascending order with
//! `ShowEnded` last, so reports and tests can rely on a stable order.

use crate::catalog::{Season, Show, ShowId, ShowStatus};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// A single, classified difference between two snapshots of one show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A season appeared (or, for a newly monitored show, has a dated episode)
    NewSeasonAnnounced {
        show_id: ShowId,
        season: u32,
        premiere: Option<NaiveDate>,
        episode_count: usize,
    },

    /// An episode appeared in an already known season
    NewEpisodeAnnounced {
        show_id: ShowId,
        season: u32,
        episode: u32,
        title: String,
        air_date: Option<NaiveDate>,
    },

    /// A known episode's air date was set, moved or withdrawn
    EpisodeAirDateChanged {
        show_id: ShowId,
        season: u32,
        episode: u32,
        old: Option<NaiveDate>,
        new: Option<NaiveDate>,
    },

    /// A download was found for a known episode
    EpisodeAvailableForDownload {
        show_id: ShowId,
        season: u32,
        episode: u32,
    },

    /// The show's status changed to ended
    ShowEnded { show_id: ShowId },
}

impl ChangeEvent {
    /// The show this event belongs to
    pub fn show_id(&self) -> &str {
        match self {
            ChangeEvent::NewSeasonAnnounced { show_id, .. }
            | ChangeEvent::NewEpisodeAnnounced { show_id, .. }
            | ChangeEvent::EpisodeAirDateChanged { show_id, .. }
            | ChangeEvent::EpisodeAvailableForDownload { show_id, .. }
            | ChangeEvent::ShowEnded { show_id } => show_id,
        }
    }
}

fn season_announced(show_id: &str, season: &Season) -> ChangeEvent {
    ChangeEvent::NewSeasonAnnounced {
        show_id: show_id.to_string(),
        season: season.number,
        premiere: season.premiere(),
        episode_count: season.episodes.len(),
    }
}

/// Computes the ordered change events between the previous and current
/// structure of a show.
///
/// A show seen for the first time (`old` is `None`) only reports its seasons
/// that have at least one dated episode, so onboarding a show does not flood
/// the report with its whole history.
pub fn diff_show(show_id: &str, old: Option<&Show>, new: &Show) -> Vec<ChangeEvent> {
    let mut new_seasons: Vec<&Season> = new.seasons.iter().collect();
    new_seasons.sort_by_key(|s| s.number);

    let Some(old) = old else {
        return new_seasons
            .into_iter()
            .filter(|s| s.premiere().is_some())
            .map(|s| season_announced(show_id, s))
            .collect();
    };

    let old_seasons: BTreeMap<u32, &Season> = old.seasons.iter().map(|s| (s.number, s)).collect();
    let mut events = Vec::new();

    for season in new_seasons {
        let Some(old_season) = old_seasons.get(&season.number) else {
            events.push(season_announced(show_id, season));
            continue;
        };

        let old_episodes: BTreeMap<u32, _> =
            old_season.episodes.iter().map(|e| (e.number, e)).collect();
        let mut episodes: Vec<_> = season.episodes.iter().collect();
        episodes.sort_by_key(|e| e.number);

        for episode in episodes {
            match old_episodes.get(&episode.number) {
                None => events.push(ChangeEvent::NewEpisodeAnnounced {
                    show_id: show_id.to_string(),
                    season: season.number,
                    episode: episode.number,
                    title: episode.title.clone(),
                    air_date: episode.air_date,
                }),
                Some(old_episode) => {
                    if old_episode.air_date != episode.air_date {
                        events.push(ChangeEvent::EpisodeAirDateChanged {
                            show_id: show_id.to_string(),
                            season: season.number,
                            episode: episode.number,
                            old: old_episode.air_date,
                            new: episode.air_date,
                        });
                    }
                    if !old_episode.available && episode.available {
                        events.push(ChangeEvent::EpisodeAvailableForDownload {
                            show_id: show_id.to_string(),
                            season: season.number,
                            episode: episode.number,
                        });
                    }
                }
            }
        }
    }

    if new.status == ShowStatus::Ended && old.status != ShowStatus::Ended {
        events.push(ChangeEvent::ShowEnded {
            show_id: show_id.to_string(),
        });
    }

    events
}
