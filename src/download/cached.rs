//! Cached download source implementation
//!
//! This module provides a caching wrapper for download sources that remembers
//! located downloads for the lifetime of one run, so an episode found while
//! scanning is not searched for a second time when it is triggered.

use super::{DownloadError, DownloadHandle, DownloadSource};
use std::cell::RefCell;
use std::collections::HashMap;

/// A caching wrapper for download sources
///
/// Only successful lookups are remembered; misses are asked again, since a
/// release may show up at any time.
pub struct CachedDownloadSource<S>
where
    S: DownloadSource,
{
    /// The underlying download source
    source: S,
    /// Located downloads by search key
    found: RefCell<HashMap<String, DownloadHandle>>,
}

impl<S> CachedDownloadSource<S>
where
    S: DownloadSource,
{
    /// Creates a new cached download source wrapping the given source
    pub fn new(source: S) -> Self {
        Self {
            source,
            found: RefCell::new(HashMap::new()),
        }
    }

    /// Generates a cache key for an episode lookup
    fn cache_key(show_name: &str, season: u32, episode: u32) -> String {
        format!("{}_s{:02}e{:02}", show_name.to_lowercase(), season, episode)
    }
}

impl<S> DownloadSource for CachedDownloadSource<S>
where
    S: DownloadSource,
{
    fn find_download(
        &self,
        show_name: &str,
        season: u32,
        episode: u32,
    ) -> Result<DownloadHandle, DownloadError> {
        let cache_key = Self::cache_key(show_name, season, episode);

        if let Some(handle) = self.found.borrow().get(&cache_key) {
            return Ok(handle.clone());
        }

        let handle = self.source.find_download(show_name, season, episode)?;
        self.found.borrow_mut().insert(cache_key, handle.clone());

        Ok(handle)
    }

    fn trigger(&self, handle: &DownloadHandle) -> Result<(), DownloadError> {
        self.source.trigger(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::tests::FakeSource;

    #[test]
    fn test_hits_are_remembered_misses_are_not() {
        let cached = CachedDownloadSource::new(FakeSource::with(&[("Dark", 1, 1)]));

        let first = cached.find_download("Dark", 1, 1).unwrap();
        let second = cached.find_download("dark", 1, 1).unwrap();
        assert_eq!(first, second);
        assert_eq!(cached.source.searches.get(), 1);

        assert_eq!(cached.find_download("Dark", 1, 2), Err(DownloadError::NotFound));
        assert_eq!(cached.find_download("Dark", 1, 2), Err(DownloadError::NotFound));
        assert_eq!(cached.source.searches.get(), 3);
    }

    #[test]
    fn test_trigger_passes_through() {
        let cached = CachedDownloadSource::new(FakeSource::with(&[("Dark", 2, 3)]));
        let handle = cached.find_download("Dark", 2, 3).unwrap();

        assert_eq!(cached.trigger(&handle), Ok(()));
        assert_eq!(cached.trigger(&handle), Err(DownloadError::AlreadyTriggered));
    }
}
