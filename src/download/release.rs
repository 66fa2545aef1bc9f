//! Release name parsing for scene-style torrent names
//!
//! Parses names like:
//! - "The.Bear.S03E04.1080p.WEB.h264-ETHEL"
//! - "Slow Horses S04E01 720p ATVP WEB-DL DDP5 1 H 264-NTb.torrent"

use regex::Regex;
use std::sync::LazyLock;

static EPISODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)\s+S(\d{1,2})E(\d{1,3})\b").expect("episode pattern is valid")
});

static RESOLUTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(2160p|1080p|720p|480p)\b").expect("resolution pattern is valid")
});

static YEAR_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r" (?:19|20)\d{2}$").expect("year pattern is valid")
});

/// Episode information parsed from a release name
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedRelease {
    /// Show title, normalized by `normalize_title`
    pub title: String,
    pub season: u32,
    pub episode: u32,
    /// Lowercase resolution such as "720p"
    pub resolution: Option<String>,
}

impl ParsedRelease {
    /// Whether this release is the wanted episode of `show_name` in `quality`
    pub fn matches(&self, show_name: &str, season: u32, episode: u32, quality: &str) -> bool {
        titles_match(&self.title, &normalize_title(show_name))
            && self.season == season
            && self.episode == episode
            && self
                .resolution
                .as_deref()
                .is_some_and(|r| r.eq_ignore_ascii_case(quality))
    }
}

/// Lowercases a title and collapses all punctuation and separators to single spaces
pub(crate) fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compares normalized titles, ignoring a trailing year on either side
///
/// Releases of remakes carry the year ("Doctor.Who.2005.S01E01") while the
/// configured name usually does not, and vice versa.
fn titles_match(release: &str, wanted: &str) -> bool {
    release == wanted
        || YEAR_SUFFIX_RE.replace(release, "") == YEAR_SUFFIX_RE.replace(wanted, "")
}

/// Parses a release (or torrent file) name into its episode information
///
/// Returns `None` for names without an SxxEyy marker, e.g. season packs.
pub(crate) fn parse_release(name: &str) -> Option<ParsedRelease> {
    let name = name.strip_suffix(".torrent").unwrap_or(name);
    let cleaned = name.replace(['.', '_'], " ");

    let caps = EPISODE_RE.captures(&cleaned)?;
    let title = normalize_title(caps.get(1)?.as_str());
    let season = caps.get(2)?.as_str().parse().ok()?;
    let episode = caps.get(3)?.as_str().parse().ok()?;

    let resolution = RESOLUTION_RE
        .captures(&cleaned)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase());

    Some(ParsedRelease {
        title,
        season,
        episode,
        resolution,
    })
}
