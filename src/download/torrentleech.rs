//! TorrentLeech download source
//!
//! TorrentLeech is a private tracker with form-based login. This client logs
//! in once per run, scrapes the TV search results for the wanted episode and
//! saves the matching `.torrent` file into a watch directory, where a torrent
//! client is expected to pick it up.

use super::release::parse_release;
use super::{DownloadError, DownloadHandle, DownloadSource};
use crate::settings::TorrentLeechSettings;
use crate::temp::stage_file;
use log::debug;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::Disks;

const BASE_URL: &str = "https://www.torrentleech.org";

const BYTES_PER_MB: u64 = 1000 * 1000;

/// Download source backed by a TorrentLeech account
pub struct TorrentLeechClient {
    client: Client,
    base_url: String,
    qualities: Vec<String>,
    torrents_directory: PathBuf,
    minimum_free_space_mb: u64,
}

impl TorrentLeechClient {
    /// Creates a client and logs into TorrentLeech with the configured account
    pub fn connect(
        settings: &TorrentLeechSettings,
        timeout: Duration,
    ) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .map_err(|e| DownloadError::Network(e.to_string()))?;

        let tracker = Self {
            client,
            base_url: BASE_URL.to_string(),
            qualities: settings.qualities.clone(),
            torrents_directory: settings.torrents_directory.clone(),
            minimum_free_space_mb: settings.minimum_free_space_mb,
        };
        tracker.login(&settings.username, &settings.password)?;

        Ok(tracker)
    }

    fn login(&self, username: &str, password: &str) -> Result<(), DownloadError> {
        let response = self
            .client
            .post(format!("{}/user/account/login/", self.base_url))
            .form(&[
                ("username", username),
                ("password", password),
                ("remember_me", "on"),
                ("login", "submit"),
            ])
            .send()
            .map_err(|e| DownloadError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DownloadError::Network(format!(
                "login failed with HTTP {}",
                response.status().as_u16()
            )));
        }

        debug!("Logged into TorrentLeech as {username}");
        Ok(())
    }

    fn search_url(&self, show_name: &str, season: u32, episode: u32, quality: &str) -> String {
        format!(
            "{}/torrents/browse/index/query/{}+s{:02}e{:02}+{}/facets/category%253ATV",
            self.base_url,
            show_name.trim().replace(' ', "+"),
            season,
            episode,
            quality
        )
    }

    /// Searches one quality and returns the first result that really is the wanted episode
    fn search(
        &self,
        show_name: &str,
        season: u32,
        episode: u32,
        quality: &str,
    ) -> Result<Option<DownloadHandle>, DownloadError> {
        let url = self.search_url(show_name, season, episode, quality);
        debug!("Searching {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| DownloadError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DownloadError::Network(format!(
                "HTTP {} while searching",
                response.status().as_u16()
            )));
        }

        let body = response
            .text()
            .map_err(|e| DownloadError::Network(e.to_string()))?;

        Ok(parse_search_results(&body, &self.base_url)
            .into_iter()
            .find(|candidate| {
                parse_release(&candidate.title)
                    .is_some_and(|r| r.matches(show_name, season, episode, quality))
            })
            .map(|candidate| DownloadHandle {
                quality: quality.to_string(),
                ..candidate
            }))
    }

    fn target_path(&self, handle: &DownloadHandle) -> PathBuf {
        let name = sanitize_filename(handle.url.rsplit('/').next().unwrap_or(&handle.title));
        let name = if name.ends_with(".torrent") {
            name
        } else {
            format!("{name}.torrent")
        };
        self.torrents_directory.join(name)
    }

    fn ensure_free_space(&self, handle: &DownloadHandle) -> Result<(), DownloadError> {
        let Some(size) = handle.size_bytes else {
            return Ok(());
        };
        let Some(available) = available_space(&self.torrents_directory) else {
            debug!(
                "Free space of {} unknown, skipping check",
                self.torrents_directory.display()
            );
            return Ok(());
        };

        let usable_mb = (available / BYTES_PER_MB).saturating_sub(self.minimum_free_space_mb);
        let required_mb = size.div_ceil(BYTES_PER_MB);
        if required_mb >= usable_mb {
            return Err(DownloadError::InsufficientSpace {
                required_mb,
                available_mb: usable_mb,
            });
        }

        Ok(())
    }
}

impl DownloadSource for TorrentLeechClient {
    fn find_download(
        &self,
        show_name: &str,
        season: u32,
        episode: u32,
    ) -> Result<DownloadHandle, DownloadError> {
        for quality in &self.qualities {
            if let Some(handle) = self.search(show_name, season, episode, quality)? {
                debug!("Found {} ({})", handle.title, quality);
                return Ok(handle);
            }
        }

        Err(DownloadError::NotFound)
    }

    fn trigger(&self, handle: &DownloadHandle) -> Result<(), DownloadError> {
        fs::create_dir_all(&self.torrents_directory)
            .map_err(|e| DownloadError::Storage(e.to_string()))?;

        let target = self.target_path(handle);
        if target.exists() {
            return Err(DownloadError::AlreadyTriggered);
        }

        self.ensure_free_space(handle)?;

        let response = self
            .client
            .get(&handle.url)
            .send()
            .map_err(|e| DownloadError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DownloadError::Network(format!(
                "HTTP {} while downloading {}",
                response.status().as_u16(),
                handle.url
            )));
        }

        let content = response
            .bytes()
            .map_err(|e| DownloadError::Network(e.to_string()))?;
        if content.is_empty() {
            return Err(DownloadError::Network(format!(
                "empty response while downloading {}",
                handle.url
            )));
        }

        stage_file(&target, &content)
            .and_then(|staged| staged.persist(&target))
            .map_err(|e| DownloadError::Storage(e.to_string()))?;

        debug!("Saved {}", target.display());
        Ok(())
    }
}

/// Extracts the download links and sizes from a search result page
///
/// Every row of the `#torrenttable` with a quick download link becomes one
/// candidate. The returned handles carry no quality yet.
fn parse_search_results(html: &str, base_url: &str) -> Vec<DownloadHandle> {
    let document = Html::parse_document(html);
    let (Ok(row_selector), Ok(link_selector), Ok(cell_selector)) = (
        Selector::parse("#torrenttable tr"),
        Selector::parse("td.quickdownload a"),
        Selector::parse("td"),
    ) else {
        return Vec::new();
    };

    let mut candidates = Vec::new();

    for row in document.select(&row_selector) {
        let Some(href) = row
            .select(&link_selector)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };

        let size_bytes = row
            .select(&cell_selector)
            .map(|cell| cell.text().collect::<String>())
            .find_map(|text| parse_size(&text));

        let title = href.rsplit('/').next().unwrap_or(href).to_string();
        let url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{}", base_url, href)
        };

        candidates.push(DownloadHandle {
            title,
            url,
            quality: String::new(),
            size_bytes,
        });
    }

    candidates
}

/// Parses a listed size like "1.4 GB" or "350 MB" into bytes
fn parse_size(text: &str) -> Option<u64> {
    let mut parts = text.split_whitespace();
    let value: f64 = parts.next()?.parse().ok()?;
    let multiplier = match parts.next()? {
        "GB" => 1000.0 * 1000.0 * 1000.0,
        "MB" => 1000.0 * 1000.0,
        "KB" => 1000.0,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((value * multiplier).round() as u64)
}

/// Available space on the disk holding `path`, if it can be determined
fn available_space(path: &Path) -> Option<u64> {
    let path = path.canonicalize().ok()?;
    let disks = Disks::new_with_refreshed_list();

    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

/// Sanitizes a string for use in filenames by replacing problematic characters
///
/// Replaces path separators, reserved characters (: * ? " < > |) and control
/// characters, and trims leading/trailing whitespace and dots.
fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();

    sanitized
        .trim_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string()
}
