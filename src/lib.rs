//! ShowSentinel - Keep an eye on TV shows and report what changed
//!
//! This library provides the scan, diff, download and report pipeline: it
//! fetches the current structure of every monitored show, compares it with the
//! snapshot recorded by the previous run, downloads freshly available episodes
//! and sends a single report about everything that changed.

mod catalog;
mod diff;
mod download;
mod logging;
mod notify;
mod scan;
mod settings;
mod snapshot;
mod temp;

pub use catalog::{
    CatalogClient, Episode, FetchError, Season, SeasonStatus, Show, ShowId, ShowStatus,
    TvMazeCatalog,
};
pub use diff::{ChangeEvent, diff_show};
pub use download::{
    CachedDownloadSource, DownloadError, DownloadHandle, DownloadOutcome, DownloadRecord,
    DownloadSource, DownloadTrigger, TorrentLeechClient,
};
pub use logging::{LOG_ROTATE_BYTES, open_log_file};
pub use notify::{Notifier, NotifyError, SmtpNotifier, render_report};
pub use scan::{FetchFailure, RunResult, Scanner};
pub use settings::{
    EmailSettings, MonitorMode, Settings, SettingsError, ShowConfig, TorrentLeechSettings,
};
pub use snapshot::{JsonSnapshotStore, Snapshot, SnapshotStore, StoreError};

use chrono::{Local, NaiveDate};
use log::{info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Progress event emitted during a run
///
/// These events allow library users to track progress and provide feedback
/// while shows are checked, downloads are started and the report is sent.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Run started
    Started { show_count: usize },

    /// Previous snapshot loaded
    SnapshotLoaded { path: PathBuf, known_shows: usize },

    /// Downloads are disabled for this run
    DownloadsUnavailable { reason: String },

    /// Checking a specific show
    CheckingShow {
        index: usize,
        total: usize,
        show_name: String,
    },

    /// The show's last status is on the skip list
    ShowSkipped {
        show_name: String,
        status: ShowStatus,
    },

    /// The show could not be fetched
    ShowFailed { show_name: String, reason: String },

    /// The show was fetched and compared
    ShowChecked {
        show_name: String,
        change_count: usize,
    },

    /// Looking for a download of an available episode
    Downloading {
        show_name: String,
        season: u32,
        episode: u32,
    },

    /// Download attempt finished
    DownloadFinished {
        show_name: String,
        season: u32,
        episode: u32,
        outcome: DownloadOutcome,
    },

    /// No changes, no report
    NothingToReport,

    /// The report was rendered but there is no channel to send it through
    ReportNotSent,

    /// The report was delivered
    ReportSent { change_count: usize },

    /// The report could not be delivered
    ReportFailed { reason: String },

    /// The new snapshot was written
    SnapshotSaved { path: PathBuf },

    /// The previous snapshot was kept because the report failed
    SnapshotKept { path: PathBuf },

    /// Run complete
    Complete {
        change_count: usize,
        error_count: usize,
    },
}

/// A non-fatal error that occurred during a run
#[derive(Debug, Error)]
pub enum RunError {
    /// A show could not be fetched; its snapshot entry was left unchanged
    #[error("{}: {}", .0.show_name, .0.error)]
    Fetch(FetchFailure),

    /// A download could not be requested; it is retried next run
    #[error("{0}")]
    Download(DownloadRecord),

    /// The report could not be delivered
    #[error("Report: {0}")]
    Notify(NotifyError),
}

/// Summary of a completed run
///
/// Per-show, per-episode and delivery failures do not abort a run; they are
/// collected here instead.
#[derive(Debug)]
pub struct RunReport {
    /// All change events of the run, grouped by show
    pub events: Vec<ChangeEvent>,
    /// Download attempts and their outcomes
    pub downloads: Vec<DownloadRecord>,
    /// Non-fatal errors in the order they occurred
    pub errors: Vec<RunError>,
    /// Whether the new snapshot was written
    pub snapshot_committed: bool,
}

impl RunReport {
    /// Number of non-fatal errors that occurred during the run
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Whether the report could not be delivered
    pub fn notify_failed(&self) -> bool {
        self.errors.iter().any(|e| matches!(e, RunError::Notify(_)))
    }
}

/// Top-level error type for ShowSentinel operations
///
/// Only errors that make a run impossible or unsafe to finish end up here.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Error in the settings file
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// The snapshot could not be loaded or written
    #[error("Snapshot error: {0}")]
    Store(#[from] StoreError),

    /// The catalog client could not be set up
    #[error("Catalog error: {0}")]
    Catalog(#[from] FetchError),

    /// The report channel could not be set up
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

/// The collaborators one run talks to
pub struct Services<'a> {
    pub catalog: &'a dyn CatalogClient,
    pub store: &'a dyn SnapshotStore,
    pub download_source: Option<&'a dyn DownloadSource>,
    pub notifier: Option<&'a dyn Notifier>,
}

/// Runs one scan: load, scan, download, report, commit
///
/// The snapshot is loaded once at the start and written once at the very end,
/// so an aborted run leaves the previous snapshot untouched. Whether the
/// snapshot is committed after a failed report is decided by
/// `email.commit_on_failure`.
///
/// # Arguments
///
/// * `settings` - Validated settings (show list, skip statuses, download window)
/// * `services` - The catalog, store, download source and notifier to use
/// * `today` - The date air dates are compared against
/// * `progress_callback` - Closure called with progress events
///
/// # Errors
///
/// Only snapshot load/save failures are returned as errors.
pub fn run_monitor<F>(
    settings: &Settings,
    services: Services<'_>,
    today: NaiveDate,
    mut progress_callback: F,
) -> Result<RunReport, MonitorError>
where
    F: FnMut(ProgressEvent),
{
    progress_callback(ProgressEvent::Started {
        show_count: settings.shows.len(),
    });

    let previous = services.store.load()?;
    progress_callback(ProgressEvent::SnapshotLoaded {
        path: settings.snapshot_path.clone().unwrap_or_default(),
        known_shows: previous.len(),
    });

    let mut scanner = Scanner::new(services.catalog).skip_statuses(&settings.skip_statuses);
    if let (Some(source), Some(torrentleech)) = (services.download_source, &settings.torrentleech)
    {
        scanner = scanner.with_download_source(source, torrentleech.maximum_torrent_days);
    }

    let mut result = scanner.scan(&settings.shows, &previous, today, &mut progress_callback);

    let downloads = match services.download_source {
        Some(source) => DownloadTrigger::new(source, &settings.shows).run(
            &result.events,
            &mut result.snapshot,
            &mut progress_callback,
        ),
        None => Vec::new(),
    };

    let names: HashMap<ShowId, String> = settings
        .shows
        .iter()
        .map(|s| (s.show_id(), s.name.clone()))
        .collect();

    let mut notify_error = None;
    match render_report(&result.events, &downloads, &names) {
        None => {
            info!("Nothing to report, no mail was sent");
            progress_callback(ProgressEvent::NothingToReport);
        }
        Some(report) => match services.notifier {
            None => progress_callback(ProgressEvent::ReportNotSent),
            Some(notifier) => match notifier.send(&report) {
                Ok(()) => progress_callback(ProgressEvent::ReportSent {
                    change_count: result.events.len(),
                }),
                Err(error) => {
                    warn!("Report delivery failed: {error}");
                    progress_callback(ProgressEvent::ReportFailed {
                        reason: error.to_string(),
                    });
                    notify_error = Some(error);
                }
            },
        },
    }

    let snapshot_path = settings.snapshot_path.clone().unwrap_or_default();
    let snapshot_committed = if notify_error.is_some() && !settings.email.commit_on_failure {
        warn!("Keeping the previous snapshot so the changes are reported again next run");
        progress_callback(ProgressEvent::SnapshotKept {
            path: snapshot_path,
        });
        false
    } else {
        services.store.save(&result.snapshot)?;
        progress_callback(ProgressEvent::SnapshotSaved {
            path: snapshot_path,
        });
        true
    };

    let mut errors: Vec<RunError> = result.failures.into_iter().map(RunError::Fetch).collect();
    errors.extend(
        downloads
            .iter()
            .filter(|record| record.error().is_some())
            .cloned()
            .map(RunError::Download),
    );
    errors.extend(notify_error.map(RunError::Notify));

    let report = RunReport {
        events: result.events,
        downloads,
        errors,
        snapshot_committed,
    };

    progress_callback(ProgressEvent::Complete {
        change_count: report.events.len(),
        error_count: report.error_count(),
    });

    Ok(report)
}

/// Runs one scan with the real collaborators described by `settings`
///
/// Builds the TVMaze catalog client, the JSON snapshot store, the SMTP
/// notifier (if email is enabled) and the TorrentLeech client (if any show
/// wants downloads). A failed TorrentLeech login disables downloads for this
/// run instead of failing it.
///
/// # Examples
///
/// ```no_run
/// use show_sentinel::{Settings, run_with_settings};
/// use std::path::Path;
///
/// let settings = Settings::load(Path::new("settings.toml")).unwrap();
/// let report = run_with_settings(&settings, |_| {}).unwrap();
/// println!("{} change(s)", report.events.len());
/// ```
pub fn run_with_settings<F>(
    settings: &Settings,
    mut progress_callback: F,
) -> Result<RunReport, MonitorError>
where
    F: FnMut(ProgressEvent),
{
    let timeout = settings.request_timeout();

    let catalog = TvMazeCatalog::new(timeout)?;

    let snapshot_path = match &settings.snapshot_path {
        Some(path) => path.clone(),
        None => JsonSnapshotStore::default_path()?,
    };
    let store = JsonSnapshotStore::new(&snapshot_path);

    let notifier = if settings.email.enabled {
        Some(SmtpNotifier::new(&settings.email, timeout)?)
    } else {
        None
    };

    let download_source = match &settings.torrentleech {
        Some(torrentleech) if settings.downloads_enabled() => {
            match TorrentLeechClient::connect(torrentleech, timeout) {
                Ok(client) => Some(CachedDownloadSource::new(client)),
                Err(error) => {
                    warn!("Couldn't log into TorrentLeech: {error}");
                    progress_callback(ProgressEvent::DownloadsUnavailable {
                        reason: error.to_string(),
                    });
                    None
                }
            }
        }
        _ => None,
    };

    let effective = Settings {
        snapshot_path: Some(snapshot_path),
        ..settings.clone()
    };

    let services = Services {
        catalog: &catalog,
        store: &store,
        download_source: download_source
            .as_ref()
            .map(|source| source as &dyn DownloadSource),
        notifier: notifier.as_ref().map(|n| n as &dyn Notifier),
    };

    run_monitor(
        &effective,
        services,
        Local::now().date_naive(),
        progress_callback,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::tests::FakeSource;
    use std::cell::{Cell, RefCell};

    struct FixedCatalog {
        shows: HashMap<String, Show>,
    }

    impl CatalogClient for FixedCatalog {
        fn fetch_show(&self, id: &str) -> Result<Show, FetchError> {
            self.shows
                .get(id)
                .cloned()
                .ok_or_else(|| FetchError::ShowNotFound(id.to_string()))
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        snapshot: RefCell<Snapshot>,
        saves: Cell<usize>,
        fail_load: bool,
    }

    impl SnapshotStore for MemoryStore {
        fn load(&self) -> Result<Snapshot, StoreError> {
            if self.fail_load {
                return Err(StoreError::DataDirectoryNotFound);
            }
            Ok(self.snapshot.borrow().clone())
        }

        fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
            self.saves.set(self.saves.get() + 1);
            *self.snapshot.borrow_mut() = snapshot.clone();
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: RefCell<Vec<String>>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, report: &str) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Transport("connection refused".to_string()));
            }
            self.sent.borrow_mut().push(report.to_string());
            Ok(())
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn settings(commit_on_failure: bool) -> Settings {
        let content = format!(
            r#"
            [email]
            username = "me@example.com"
            recipients = ["you@example.com"]
            commit_on_failure = {commit_on_failure}

            [[shows]]
            id = 1
            name = "Reservation Dogs"
            "#
        );
        let settings: Settings = toml::from_str(&content).unwrap();
        settings.validate().unwrap();
        settings
    }

    fn catalog() -> FixedCatalog {
        let show = Show {
            name: "Reservation Dogs".to_string(),
            status: ShowStatus::Running,
            last_checked: None,
            seasons: vec![Season {
                number: 1,
                status: SeasonStatus::Ended,
                episodes: vec![Episode::new(1, "F*ckin' Rez Dogs", Some(date("2021-08-09")))],
            }],
        };
        FixedCatalog {
            shows: HashMap::from([("1".to_string(), show)]),
        }
    }

    #[test]
    fn test_first_run_reports_and_commits_then_goes_quiet() {
        let settings = settings(true);
        let catalog = catalog();
        let store = MemoryStore::default();
        let notifier = RecordingNotifier::default();
        let services = || Services {
            catalog: &catalog,
            store: &store,
            download_source: None,
            notifier: Some(&notifier),
        };

        let report = run_monitor(&settings, services(), date("2021-09-01"), |_| {}).unwrap();
        assert_eq!(report.events.len(), 1);
        assert!(report.snapshot_committed);
        assert_eq!(notifier.sent.borrow().len(), 1);
        assert!(notifier.sent.borrow()[0].starts_with("Reservation Dogs:\r\n"));

        let second = run_monitor(&settings, services(), date("2021-09-02"), |_| {}).unwrap();
        assert!(second.events.is_empty());
        assert_eq!(notifier.sent.borrow().len(), 1);
        assert_eq!(store.saves.get(), 2);
    }

    #[test]
    fn test_notify_failure_commits_by_default() {
        let settings = settings(true);
        let catalog = catalog();
        let store = MemoryStore::default();
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let services = Services {
            catalog: &catalog,
            store: &store,
            download_source: None,
            notifier: Some(&notifier),
        };

        let report = run_monitor(&settings, services, date("2021-09-01"), |_| {}).unwrap();
        assert!(report.snapshot_committed);
        assert!(report.notify_failed());
        assert_eq!(report.error_count(), 1);
        assert!(store.snapshot.borrow().get("1").is_some());
    }

    #[test]
    fn test_notify_failure_can_keep_previous_snapshot() {
        let settings = settings(false);
        let catalog = catalog();
        let store = MemoryStore::default();
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let services = Services {
            catalog: &catalog,
            store: &store,
            download_source: None,
            notifier: Some(&notifier),
        };

        let mut events = Vec::new();
        let report =
            run_monitor(&settings, services, date("2021-09-01"), |e| events.push(e)).unwrap();
        assert!(!report.snapshot_committed);
        assert_eq!(store.saves.get(), 0);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ProgressEvent::SnapshotKept { .. }))
        );
    }

    #[test]
    fn test_unloadable_snapshot_is_fatal() {
        let settings = settings(true);
        let catalog = catalog();
        let store = MemoryStore {
            fail_load: true,
            ..Default::default()
        };
        let services = Services {
            catalog: &catalog,
            store: &store,
            download_source: None,
            notifier: None,
        };

        let result = run_monitor(&settings, services, date("2021-09-01"), |_| {});
        assert!(matches!(result, Err(MonitorError::Store(_))));
        assert_eq!(store.saves.get(), 0);
    }

    #[test]
    fn test_fetch_failure_is_reported_not_fatal() {
        let settings = settings(true);
        let catalog = FixedCatalog {
            shows: HashMap::new(),
        };
        let store = MemoryStore::default();
        let services = Services {
            catalog: &catalog,
            store: &store,
            download_source: None,
            notifier: None,
        };

        let report = run_monitor(&settings, services, date("2021-09-01"), |_| {}).unwrap();
        assert_eq!(report.error_count(), 1);
        match &report.errors[0] {
            RunError::Fetch(failure) => {
                assert!(matches!(failure.error, FetchError::ShowNotFound(_)))
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(report.events.is_empty());
        assert!(report.snapshot_committed);
        assert!(store.snapshot.borrow().is_empty());
    }

    #[test]
    fn test_available_episode_is_triggered_once_across_runs() {
        let content = r#"
            [email]
            enabled = false

            [torrentleech]
            username = "leech"

            [[shows]]
            id = 1
            name = "Reservation Dogs"
            mode = "download"
        "#;
        let settings: Settings = toml::from_str(content).unwrap();
        settings.validate().unwrap();

        let catalog = catalog();
        let store = MemoryStore::default();
        store
            .snapshot
            .borrow_mut()
            .insert("1", catalog.shows["1"].clone());
        let source = FakeSource::with(&[("Reservation Dogs", 1, 1)]);
        let services = || Services {
            catalog: &catalog,
            store: &store,
            download_source: Some(&source),
            notifier: None,
        };

        let first = run_monitor(&settings, services(), date("2021-08-10"), |_| {}).unwrap();
        assert_eq!(
            first.events,
            vec![ChangeEvent::EpisodeAvailableForDownload {
                show_id: "1".to_string(),
                season: 1,
                episode: 1,
            }]
        );
        assert!(matches!(
            first.downloads[0].outcome,
            DownloadOutcome::Triggered(_)
        ));
        let recorded = store
            .snapshot
            .borrow()
            .get("1")
            .unwrap()
            .episode(1, 1)
            .cloned()
            .unwrap();
        assert!(recorded.available && recorded.download_triggered);

        let second = run_monitor(&settings, services(), date("2021-08-11"), |_| {}).unwrap();
        assert!(second.events.is_empty());
        assert!(second.downloads.is_empty());
        assert_eq!(source.triggered.borrow().len(), 1);
    }

    #[test]
    fn test_download_error_is_reported_once() {
        let record = DownloadRecord {
            show_id: "1".to_string(),
            season: 2,
            episode: 5,
            outcome: DownloadOutcome::Failed(DownloadError::Network("reset".to_string())),
        };
        assert!(record.error().is_some());

        let error = RunError::Download(record);
        assert_eq!(error.to_string(), "Show 1 S02E05: Request failed: reset");
    }
}
