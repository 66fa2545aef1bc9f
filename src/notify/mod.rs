//! Report rendering and delivery
//!
//! One run produces at most one report: the change events grouped by show, in
//! the order the scan produced them. Runs without changes produce no report.

mod smtp;

pub use smtp::SmtpNotifier;

use crate::catalog::ShowId;
use crate::diff::ChangeEvent;
use crate::download::{DownloadOutcome, DownloadRecord};
use chrono::NaiveDate;
use humansize::{DECIMAL, format_size};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur while sending the report
#[derive(Debug, Error)]
pub enum NotifyError {
    /// A configured address is not a valid mailbox
    #[error("Invalid email address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The mail transport could not be set up
    #[error("Mail transport error: {0}")]
    Transport(String),

    /// The message could not be built
    #[error("Failed to build message: {0}")]
    Message(String),

    /// Some recipients did not get the report
    #[error("Report not delivered to {failed} of {total} recipient(s): {reason}")]
    Delivery {
        failed: usize,
        total: usize,
        reason: String,
    },
}

/// Trait for channels the report is delivered through
pub trait Notifier {
    /// Delivers a rendered report
    ///
    /// Delivery is attempted once; failures are reported, never retried.
    fn send(&self, report: &str) -> Result<(), NotifyError>;
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|| "TBA".to_string())
}

fn describe_download(outcome: &DownloadOutcome) -> String {
    match outcome {
        DownloadOutcome::Triggered(handle) => match handle.size_bytes {
            Some(size) => format!(
                "downloading {} ({})",
                handle.quality,
                format_size(size, DECIMAL)
            ),
            None => format!("downloading {}", handle.quality),
        },
        DownloadOutcome::AlreadyTriggered => "already downloading".to_string(),
        DownloadOutcome::NotFound => "download not found".to_string(),
        DownloadOutcome::Failed(error) => format!("download failed: {}", error),
    }
}

fn render_event(event: &ChangeEvent, downloads: &[DownloadRecord]) -> String {
    match event {
        ChangeEvent::NewSeasonAnnounced {
            season,
            premiere,
            episode_count,
            ..
        } => format!(
            "\tSeason {} announced - {} episode(s), premieres {}",
            season,
            episode_count,
            format_date(*premiere)
        ),
        ChangeEvent::NewEpisodeAnnounced {
            season,
            episode,
            title,
            air_date,
            ..
        } => format!(
            "\tSeason {} - Episode {}, {} ({})",
            season,
            episode,
            title,
            format_date(*air_date)
        ),
        ChangeEvent::EpisodeAirDateChanged {
            season,
            episode,
            old,
            new,
            ..
        } => format!(
            "\tSeason {} - Episode {} moved from {} to {}",
            season,
            episode,
            format_date(*old),
            format_date(*new)
        ),
        ChangeEvent::EpisodeAvailableForDownload {
            show_id,
            season,
            episode,
        } => {
            let mut line = format!("\tSeason {} - Episode {} is available", season, episode);
            if let Some(record) = downloads
                .iter()
                .find(|r| &r.show_id == show_id && r.season == *season && r.episode == *episode)
            {
                line.push_str(", ");
                line.push_str(&describe_download(&record.outcome));
            }
            line
        }
        ChangeEvent::ShowEnded { .. } => "\tThe show has ended".to_string(),
    }
}

/// Renders the report body for one run
///
/// Events are grouped under a `<show name>:` header per show, keeping the
/// order in which they were produced. Availability lines mention what
/// happened to the download. Returns `None` when there is nothing to report.
///
/// # Arguments
///
/// * `events` - All change events of the run, grouped by show
/// * `downloads` - Download outcomes of the run
/// * `names` - Display names by show id; unknown ids are shown as-is
pub fn render_report(
    events: &[ChangeEvent],
    downloads: &[DownloadRecord],
    names: &HashMap<ShowId, String>,
) -> Option<String> {
    if events.is_empty() {
        return None;
    }

    let mut report = String::new();
    let mut current_show: Option<&str> = None;

    for event in events {
        let show_id = event.show_id();
        if current_show != Some(show_id) {
            if current_show.is_some() {
                report.push_str("\r\n");
            }
            let name = names.get(show_id).map(String::as_str).unwrap_or(show_id);
            report.push_str(&format!("{}:\r\n", name));
            current_show = Some(show_id);
        }

        report.push_str(&render_event(event, downloads));
        report.push_str("\r\n");
    }

    Some(report)
}
