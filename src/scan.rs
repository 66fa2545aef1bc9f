//! Scan orchestration
//!
//! A scan fetches every configured show, looks for downloads of freshly aired
//! episodes, diffs each show against its previous snapshot entry and builds
//! the snapshot to commit. It never writes the snapshot or sends anything:
//! both results are handed back to the caller.

use crate::ProgressEvent;
use crate::catalog::{CatalogClient, FetchError, Show, ShowId};
use crate::diff::{ChangeEvent, diff_show};
use crate::download::{DownloadError, DownloadSource};
use crate::settings::{MonitorMode, ShowConfig};
use crate::snapshot::Snapshot;
use chrono::{Days, NaiveDate};
use log::{debug, info, warn};

/// A show that could not be fetched during a scan
#[derive(Debug)]
pub struct FetchFailure {
    pub show_id: ShowId,
    pub show_name: String,
    pub error: FetchError,
}

/// Everything one scan produced
#[derive(Debug)]
pub struct RunResult {
    /// Change events grouped by show in configured order
    pub events: Vec<ChangeEvent>,
    /// One record per show that could not be fetched
    pub failures: Vec<FetchFailure>,
    /// The snapshot to commit once the run is done
    pub snapshot: Snapshot,
}

/// Walks the configured shows and collects their changes
pub struct Scanner<'a> {
    catalog: &'a dyn CatalogClient,
    download_source: Option<&'a dyn DownloadSource>,
    maximum_download_age_days: u32,
    skip_statuses: Vec<String>,
}

impl<'a> Scanner<'a> {
    /// Creates a scanner that reads show structures from `catalog`
    pub fn new(catalog: &'a dyn CatalogClient) -> Self {
        Self {
            catalog,
            download_source: None,
            maximum_download_age_days: 0,
            skip_statuses: Vec::new(),
        }
    }

    /// Probes `source` for downloads of episodes of download-mode shows that
    /// aired within the last `maximum_age_days` days
    pub fn with_download_source(
        mut self,
        source: &'a dyn DownloadSource,
        maximum_age_days: u32,
    ) -> Self {
        self.download_source = Some(source);
        self.maximum_download_age_days = maximum_age_days;
        self
    }

    /// Shows whose last recorded status is one of `statuses` are not fetched again
    pub fn skip_statuses(mut self, statuses: &[String]) -> Self {
        self.skip_statuses = statuses.iter().map(|s| s.to_lowercase()).collect();
        self
    }

    /// Scans all `shows` against the `previous` snapshot as seen on `today`
    ///
    /// A show that cannot be fetched is recorded as a failure and keeps its
    /// previous snapshot entry unchanged; the remaining shows are scanned as
    /// usual. Entries of shows that are no longer configured are kept as well.
    pub fn scan<F>(
        &self,
        shows: &[ShowConfig],
        previous: &Snapshot,
        today: NaiveDate,
        progress_callback: &mut F,
    ) -> RunResult
    where
        F: FnMut(ProgressEvent),
    {
        let mut snapshot = previous.clone();
        let mut events = Vec::new();
        let mut failures = Vec::new();

        for (index, show) in shows.iter().enumerate() {
            let show_id = show.show_id();
            let old = previous.get(&show_id);

            progress_callback(ProgressEvent::CheckingShow {
                index,
                total: shows.len(),
                show_name: show.name.clone(),
            });

            if let Some(old) = old {
                if self.skip_statuses.iter().any(|s| s == old.status.as_str()) {
                    info!("{} status is {}, skipping", show.name, old.status);
                    progress_callback(ProgressEvent::ShowSkipped {
                        show_name: show.name.clone(),
                        status: old.status,
                    });
                    continue;
                }
            }

            let mut current = match self.catalog.fetch_show(&show_id) {
                Ok(current) => current,
                Err(error) => {
                    warn!("Couldn't fetch {} ({}): {}", show.name, show_id, error);
                    progress_callback(ProgressEvent::ShowFailed {
                        show_name: show.name.clone(),
                        reason: error.to_string(),
                    });
                    failures.push(FetchFailure {
                        show_id,
                        show_name: show.name.clone(),
                        error,
                    });
                    continue;
                }
            };

            // First-seen shows are not probed, so onboarding never floods downloads
            if let Some(old) = old {
                current.inherit_download_state(old);
                if show.mode == MonitorMode::Download {
                    if let Some(source) = self.download_source {
                        self.probe_availability(source, &show.name, old, &mut current, today);
                    }
                }
            }

            let show_events = diff_show(&show_id, old, &current);
            debug!("{}: {} change(s)", show.name, show_events.len());

            progress_callback(ProgressEvent::ShowChecked {
                show_name: show.name.clone(),
                change_count: show_events.len(),
            });

            events.extend(show_events);
            snapshot.insert(show_id, current);
        }

        RunResult {
            events,
            failures,
            snapshot,
        }
    }

    /// Marks recently aired episodes as available when the source has them
    ///
    /// Only episodes already recorded in `old` are probed. Episodes new to
    /// this scan are announced first; their availability is picked up by the
    /// next scan, where the false to true flip yields a download event.
    fn probe_availability(
        &self,
        source: &dyn DownloadSource,
        show_name: &str,
        old: &Show,
        show: &mut Show,
        today: NaiveDate,
    ) {
        let earliest = today
            .checked_sub_days(Days::new(u64::from(self.maximum_download_age_days)))
            .unwrap_or(NaiveDate::MIN);

        for season in &mut show.seasons {
            for episode in &mut season.episodes {
                if episode.available || episode.download_triggered {
                    continue;
                }
                if old.episode(season.number, episode.number).is_none() {
                    continue;
                }
                let Some(air_date) = episode.air_date else {
                    continue;
                };
                if air_date > today || air_date < earliest {
                    continue;
                }

                match source.find_download(show_name, season.number, episode.number) {
                    Ok(handle) => {
                        info!(
                            "{show_name} S{:02}E{:02} is available: {}",
                            season.number, episode.number, handle.title
                        );
                        episode.available = true;
                    }
                    Err(DownloadError::NotFound) => {
                        debug!(
                            "{show_name} S{:02}E{:02} not available yet",
                            season.number, episode.number
                        );
                    }
                    Err(error) => {
                        warn!(
                            "Couldn't look for {show_name} S{:02}E{:02}: {error}",
                            season.number, episode.number
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Episode, Season, SeasonStatus, ShowStatus};
    use crate::download::DownloadTrigger;
    use crate::download::tests::FakeSource;
    use std::cell::Cell;
    use std::collections::HashMap;

    /// Catalog answering from a fixed map; unknown ids time out
    struct FakeCatalog {
        shows: HashMap<String, Show>,
        calls: Cell<usize>,
    }

    impl FakeCatalog {
        fn new(shows: Vec<(&str, Show)>) -> Self {
            Self {
                shows: shows
                    .into_iter()
                    .map(|(id, show)| (id.to_string(), show))
                    .collect(),
                calls: Cell::new(0),
            }
        }
    }

    impl CatalogClient for FakeCatalog {
        fn fetch_show(&self, id: &str) -> Result<Show, FetchError> {
            self.calls.set(self.calls.get() + 1);
            self.shows.get(id).cloned().ok_or(FetchError::Timeout)
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn config(id: u64, name: &str, mode: MonitorMode) -> ShowConfig {
        ShowConfig {
            id,
            name: name.to_string(),
            mode,
        }
    }

    fn show(name: &str, status: ShowStatus, episodes: Vec<Episode>) -> Show {
        Show {
            name: name.to_string(),
            status,
            last_checked: None,
            seasons: vec![Season {
                number: 1,
                status: SeasonStatus::Airing,
                episodes,
            }],
        }
    }

    #[test]
    fn test_failed_show_keeps_previous_entry() {
        let old_a = show(
            "Andor",
            ShowStatus::Running,
            vec![Episode::new(1, "Kassa", Some(date("2022-09-21")))],
        );
        let old_b = show(
            "Bluey",
            ShowStatus::Running,
            vec![Episode::new(1, "Magic Xylophone", Some(date("2018-10-01")))],
        );
        let mut new_b = old_b.clone();
        new_b.seasons[0]
            .episodes
            .push(Episode::new(2, "Hospital", Some(date("2018-10-02"))));

        let mut previous = Snapshot::default();
        previous.insert("1", old_a.clone());
        previous.insert("2", old_b);

        // Show 1 is unknown to the catalog and fails
        let catalog = FakeCatalog::new(vec![("2", new_b.clone())]);
        let shows = vec![
            config(1, "Andor", MonitorMode::Notify),
            config(2, "Bluey", MonitorMode::Notify),
        ];

        let result =
            Scanner::new(&catalog).scan(&shows, &previous, date("2018-10-03"), &mut |_| {});

        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].show_id, "1");
        assert!(matches!(result.failures[0].error, FetchError::Timeout));
        assert_eq!(result.snapshot.get("1"), Some(&old_a));
        assert_eq!(result.snapshot.get("2"), Some(&new_b));
        assert_eq!(
            result.events,
            vec![ChangeEvent::NewEpisodeAnnounced {
                show_id: "2".to_string(),
                season: 1,
                episode: 2,
                title: "Hospital".to_string(),
                air_date: Some(date("2018-10-02")),
            }]
        );
    }

    #[test]
    fn test_events_grouped_in_configured_order() {
        let first = show(
            "Zorro",
            ShowStatus::Ended,
            vec![Episode::new(1, "Z", Some(date("2020-01-01")))],
        );
        let second = show(
            "Alf",
            ShowStatus::Running,
            vec![Episode::new(1, "A", Some(date("2020-01-01")))],
        );
        let catalog = FakeCatalog::new(vec![("20", first), ("10", second)]);
        let shows = vec![
            config(20, "Zorro", MonitorMode::Notify),
            config(10, "Alf", MonitorMode::Notify),
        ];

        let result = Scanner::new(&catalog).scan(
            &shows,
            &Snapshot::default(),
            date("2020-02-01"),
            &mut |_| {},
        );

        let order: Vec<&str> = result.events.iter().map(|e| e.show_id()).collect();
        assert_eq!(order, vec!["20", "10"]);
    }

    #[test]
    fn test_rescan_without_changes_is_quiet() {
        let current = show(
            "Shogun",
            ShowStatus::Running,
            vec![Episode::new(1, "Anjin", Some(date("2024-02-27")))],
        );
        let catalog = FakeCatalog::new(vec![("3", current)]);
        let shows = vec![config(3, "Shogun", MonitorMode::Notify)];
        let scanner = Scanner::new(&catalog);

        let first = scanner.scan(&shows, &Snapshot::default(), date("2024-03-01"), &mut |_| {});
        assert_eq!(first.events.len(), 1);

        let second = scanner.scan(&shows, &first.snapshot, date("2024-03-01"), &mut |_| {});
        assert!(second.events.is_empty());
        assert_eq!(second.snapshot, first.snapshot);
    }

    #[test]
    fn test_skipped_status_is_not_fetched() {
        let ended = show(
            "Lost",
            ShowStatus::Ended,
            vec![Episode::new(1, "Pilot", Some(date("2004-09-22")))],
        );
        let mut previous = Snapshot::default();
        previous.insert("4", ended.clone());
        let catalog = FakeCatalog::new(vec![("4", ended.clone())]);

        let mut progress = Vec::new();
        let result = Scanner::new(&catalog)
            .skip_statuses(&["Ended".to_string()])
            .scan(
                &[config(4, "Lost", MonitorMode::Notify)],
                &previous,
                date("2024-01-01"),
                &mut |event| progress.push(event),
            );

        assert_eq!(catalog.calls.get(), 0);
        assert!(result.events.is_empty());
        assert_eq!(result.snapshot.get("4"), Some(&ended));
        assert!(progress.iter().any(|e| matches!(
            e,
            ProgressEvent::ShowSkipped {
                status: ShowStatus::Ended,
                ..
            }
        )));
    }

    #[test]
    fn test_unconfigured_entries_are_retained() {
        let mut previous = Snapshot::default();
        previous.insert("99", show("Firefly", ShowStatus::Ended, vec![]));
        let catalog = FakeCatalog::new(vec![]);

        let result = Scanner::new(&catalog).scan(&[], &previous, date("2024-01-01"), &mut |_| {});
        assert_eq!(result.snapshot, previous);
    }

    #[test]
    fn test_probe_marks_recent_episodes_available() {
        let today = date("2024-06-10");
        let old = show(
            "Dark",
            ShowStatus::Running,
            vec![
                Episode::new(1, "Secrets", Some(date("2024-06-01"))),
                Episode::new(2, "Lies", Some(date("2024-06-09"))),
                Episode::new(3, "Past and Present", Some(date("2024-06-16"))),
            ],
        );
        let mut previous = Snapshot::default();
        previous.insert("5", old.clone());

        let catalog = FakeCatalog::new(vec![("5", old)]);
        let source = FakeSource::with(&[("Dark", 1, 1), ("Dark", 1, 2), ("Dark", 1, 3)]);
        let shows = vec![config(5, "Dark", MonitorMode::Download)];
        let scanner = Scanner::new(&catalog).with_download_source(&source, 2);

        let result = scanner.scan(&shows, &previous, today, &mut |_| {});

        // Only episode 2 aired within the window
        assert_eq!(source.searches.get(), 1);
        assert_eq!(
            result.events,
            vec![ChangeEvent::EpisodeAvailableForDownload {
                show_id: "5".to_string(),
                season: 1,
                episode: 2,
            }]
        );
        assert!(result.snapshot.get("5").unwrap().episode(1, 2).unwrap().available);

        // Availability is carried over, so the next scan does not report it again
        let again = scanner.scan(&shows, &result.snapshot, today, &mut |_| {});
        assert!(again.events.is_empty());
        assert_eq!(source.searches.get(), 1);
    }

    #[test]
    fn test_probe_skips_first_seen_and_notify_shows() {
        let today = date("2024-06-10");
        let current = show(
            "Dark",
            ShowStatus::Running,
            vec![Episode::new(1, "Secrets", Some(date("2024-06-09")))],
        );
        let catalog = FakeCatalog::new(vec![("5", current.clone()), ("6", current.clone())]);
        let source = FakeSource::with(&[("Dark", 1, 1)]);

        let mut previous = Snapshot::default();
        previous.insert("6", current);
        let shows = vec![
            config(5, "Dark", MonitorMode::Download),
            config(6, "Dark", MonitorMode::Notify),
        ];

        let result = Scanner::new(&catalog)
            .with_download_source(&source, 2)
            .scan(&shows, &previous, today, &mut |_| {});

        assert_eq!(source.searches.get(), 0);
        assert!(!result.snapshot.get("5").unwrap().episode(1, 1).unwrap().available);
    }

    #[test]
    fn test_episode_new_and_already_aired_is_downloaded_on_next_scan() {
        let today = date("2024-06-10");
        let old = show(
            "Dark",
            ShowStatus::Running,
            vec![Episode::new(1, "Secrets", Some(date("2024-06-01")))],
        );
        let mut current = old.clone();
        current.seasons[0]
            .episodes
            .push(Episode::new(2, "Lies", Some(date("2024-06-09"))));

        let mut snapshot = Snapshot::default();
        snapshot.insert("5", old);

        let catalog = FakeCatalog::new(vec![("5", current)]);
        let source = FakeSource::with(&[("Dark", 1, 2)]);
        let shows = vec![config(5, "Dark", MonitorMode::Download)];
        let scanner = Scanner::new(&catalog).with_download_source(&source, 2);
        let trigger = DownloadTrigger::new(&source, &shows);

        let mut all_events = Vec::new();
        for _ in 0..3 {
            let mut result = scanner.scan(&shows, &snapshot, today, &mut |_| {});
            trigger.run(&result.events, &mut result.snapshot, &mut |_| {});
            all_events.extend(result.events);
            snapshot = result.snapshot;
        }

        assert_eq!(
            all_events,
            vec![
                ChangeEvent::NewEpisodeAnnounced {
                    show_id: "5".to_string(),
                    season: 1,
                    episode: 2,
                    title: "Lies".to_string(),
                    air_date: Some(date("2024-06-09")),
                },
                ChangeEvent::EpisodeAvailableForDownload {
                    show_id: "5".to_string(),
                    season: 1,
                    episode: 2,
                },
            ]
        );
        let recorded = snapshot.get("5").unwrap().episode(1, 2).unwrap();
        assert!(recorded.available && recorded.download_triggered);
        assert_eq!(source.triggered.borrow().len(), 1);
    }
}
