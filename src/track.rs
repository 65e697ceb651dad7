//! # Track Records
//!
//! A [`TrackRecord`] is how every other module talks about a song: the poll shows
//! them, the recommender consumes and produces them, the queue orders them and the
//! playback layer resolves them into something playable.
//!
//! Records are immutable once built. "Editing" a queue entry means replacing it.
//!
//! ## Matching Rules
//!
//! Two rules are used across the crate and nowhere else:
//!
//! - **Identity**: case-insensitive exact match on the trimmed title and artist
//!   ([`TrackRecord::key`], [`identity_key`]).
//! - **Search**: case-insensitive substring match ([`contains_ignore_case`]), used only
//!   by "find the full name" lookups.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a track record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackSource {
    /// A row of one of the attribute datasets.
    Dataset,
    /// Free-text query typed by a user (`play <song>`).
    ExternalQuery,
    /// A link typed by a user, played as given.
    DirectUrl,
}

/// A song as the queue and recommender see it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackRecord {
    title: String,
    artist: String,
    source: TrackSource,
    /// Opaque external handle, resolved lazily by the metadata resolver.
    locator: Option<String>,
}

impl TrackRecord {
    #[must_use]
    pub fn new(title: impl Into<String>, artist: impl Into<String>, source: TrackSource) -> Self {
        Self {
            title: title.into().trim().to_string(),
            artist: artist.into().trim().to_string(),
            source,
            locator: None,
        }
    }

    /// Shorthand for a dataset row.
    #[must_use]
    pub fn from_dataset(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self::new(title, artist, TrackSource::Dataset)
    }

    /// Returns a copy carrying `locator`. The original record is left untouched.
    #[must_use]
    pub fn with_locator(&self, locator: impl Into<String>) -> Self {
        Self {
            locator: Some(locator.into()),
            ..self.clone()
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn source(&self) -> TrackSource {
        self.source
    }

    pub fn locator(&self) -> Option<&str> {
        self.locator.as_deref()
    }

    /// Title-only comparison, used by the title-addressed queue commands.
    #[must_use]
    pub fn title_matches(&self, title: &str) -> bool {
        eq_ignore_case(&self.title, title)
    }

    /// Key for hash lookups that follow the identity rule.
    #[must_use]
    pub fn key(&self) -> (String, String) {
        identity_key(&self.title, &self.artist)
    }
}

impl fmt::Display for TrackRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.artist.is_empty() {
            f.write_str(&self.title)
        } else {
            write!(f, "{} by {}", self.title, self.artist)
        }
    }
}

/// Normalised `(title, artist)` key.
#[must_use]
pub fn identity_key(title: &str, artist: &str) -> (String, String) {
    (title.trim().to_lowercase(), artist.trim().to_lowercase())
}

#[must_use]
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Case-insensitive substring test. An empty needle matches everything.
#[must_use]
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_lowercase()
        .contains(&needle.trim().to_lowercase())
}

/// Parses `"Title|Artist"`, the form the CLI accepts for seed tracks.
/// A missing artist part yields an empty artist.
#[must_use]
pub fn parse_title_artist(raw: &str) -> TrackRecord {
    match raw.split_once('|') {
        Some((title, artist)) => TrackRecord::from_dataset(title, artist),
        None => TrackRecord::new(raw, "", TrackSource::ExternalQuery),
    }
}
