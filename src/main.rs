use clap::Parser;
use env_logger::{Env, Target};
use show_sentinel::{
    DownloadOutcome, LOG_ROTATE_BYTES, ProgressEvent, Settings, open_log_file, run_with_settings,
};
use std::path::PathBuf;
use std::process;

/// Check monitored TV shows for news and mail a report of the changes
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Settings file (defaults to settings.toml in the user config directory)
    #[arg(short, long, env = "SHOW_SENTINEL_SETTINGS")]
    settings: Option<PathBuf>,
}

/// Handles progress events and prints formatted output to stdout
fn handle_progress_event(event: ProgressEvent) {
    match event {
        ProgressEvent::Started { show_count } => {
            println!("ShowSentinel on duty: checking {} show(s)...", show_count);
        }
        ProgressEvent::SnapshotLoaded { path, known_shows } => {
            println!(
                "Loaded snapshot {} ({} known show(s))\n",
                path.display(),
                known_shows
            );
        }
        ProgressEvent::DownloadsUnavailable { reason } => {
            println!("Downloads disabled for this run: {}\n", reason);
        }
        ProgressEvent::CheckingShow {
            index,
            total,
            show_name,
        } => {
            println!("[{}/{}] Checking: {}", index + 1, total, show_name);
        }
        ProgressEvent::ShowSkipped { status, .. } => {
            println!("  Skipped, show is {}", status);
        }
        ProgressEvent::ShowFailed { reason, .. } => {
            println!("  Failed: {}", reason);
        }
        ProgressEvent::ShowChecked { change_count, .. } => {
            if change_count == 0 {
                println!("  No changes");
            } else {
                println!("  {} change(s)", change_count);
            }
        }
        ProgressEvent::Downloading {
            show_name,
            season,
            episode,
        } => {
            println!("\nLooking for {} S{:02}E{:02}...", show_name, season, episode);
        }
        ProgressEvent::DownloadFinished { outcome, .. } => match outcome {
            DownloadOutcome::Triggered(handle) => println!("  Downloading {}", handle.title),
            DownloadOutcome::AlreadyTriggered => println!("  Already downloading"),
            DownloadOutcome::NotFound => println!("  Not found, will retry next run"),
            DownloadOutcome::Failed(error) => println!("  Failed: {}", error),
        },
        ProgressEvent::NothingToReport => {
            println!("\nNothing new, no report sent.");
        }
        ProgressEvent::ReportNotSent => {
            println!("\nEmail is disabled, report not sent.");
        }
        ProgressEvent::ReportSent { change_count } => {
            println!("\nReport with {} change(s) sent.", change_count);
        }
        ProgressEvent::ReportFailed { reason } => {
            println!("\nReport could not be sent: {}", reason);
        }
        ProgressEvent::SnapshotSaved { path } => {
            println!("Snapshot saved to {}", path.display());
        }
        ProgressEvent::SnapshotKept { path } => {
            println!("Snapshot {} left unchanged", path.display());
        }
        ProgressEvent::Complete {
            change_count,
            error_count,
        } => {
            println!(
                "\nRun complete! {} change(s), {} error(s).",
                change_count, error_count
            );
        }
    }
}

fn init_logging(settings: &Settings) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));

    if let Some(log_file) = &settings.log_file {
        match open_log_file(log_file, LOG_ROTATE_BYTES) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not open log file {}: {}, logging to stderr",
                    log_file.display(),
                    e
                );
            }
        }
    }

    builder.init();
}

fn main() {
    let cli = Cli::parse();

    let settings_path = match cli.settings {
        Some(path) => path,
        None => match Settings::default_path() {
            Ok(path) => path,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
    };

    let settings = match Settings::load(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    init_logging(&settings);

    match run_with_settings(&settings, handle_progress_event) {
        Ok(report) => {
            if report.error_count() == 0 {
                return;
            }

            println!("\n=== Errors ===\n");
            for error in &report.errors {
                println!("  {}", error);
            }
        }
        Err(e) => {
            eprintln!("\nError during run: {}", e);
            process::exit(2);
        }
    }
}
