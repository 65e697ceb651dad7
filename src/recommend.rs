//! # Recommendation Engine
//!
//! Ranks general-table tracks against a set of seed tracks.
//!
//! ## Algorithm
//!
//! 1. Resolve every seed's vectors (general first, curated as fallback). Seeds with
//!    neither are dropped; no resolved seeds means no recommendations.
//! 2. Collect the seeds' genres from the general table.
//! 3. Candidate pool: general-table tracks in one of those genres, minus the seeds.
//! 4. Shuffle the pool and keep at most [`CANDIDATE_LIMIT`] candidates.
//! 5. Score each candidate against every resolved seed and average over the
//!    resolved seeds.
//! 6. Stable sort by score, descending, and keep the first [`RESULT_SIZE`].
//!
//! Because step 4 shuffles, two calls with the same seeds can return different
//! lists. Ties keep their post-shuffle order.
//!
//! Mood recommendations skip all of this and filter the general table by fixed
//! feature ranges (see [`Mood`]).

use crate::attributes::AttributeStore;
use crate::similarity::{score_tracks, TrackVectors};
use crate::track::TrackRecord;
use clap::ValueEnum;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Upper bound on candidates scored per request. Trades quality for latency on the
/// 28k-row general table.
pub const CANDIDATE_LIMIT: usize = 500;

/// Number of recommendations returned.
pub const RESULT_SIZE: usize = 10;

/// Number of mood matches returned.
pub const MOOD_RESULT_LIMIT: usize = 20;

/// Tunables of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendOptions {
    pub candidate_limit: usize,
    pub result_size: usize,
    pub mood_limit: usize,
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self {
            candidate_limit: CANDIDATE_LIMIT,
            result_size: RESULT_SIZE,
            mood_limit: MOOD_RESULT_LIMIT,
        }
    }
}

/// A recommended track and its averaged similarity to the seeds.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTrack {
    pub track: TrackRecord,
    pub score: f64,
}

/// Moods a user can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Mood {
    Happy,
    Sad,
    Party,
    Chill,
    Romantic,
}

impl Mood {
    pub const ALL: [Mood; 5] = [Self::Happy, Self::Sad, Self::Party, Self::Chill, Self::Romantic];

    /// Inclusive `(feature, min, max)` ranges over the general table.
    #[must_use]
    pub fn ranges(self) -> &'static [(&'static str, f64, f64)] {
        match self {
            Self::Happy => &[("valence", 0.7, 1.0), ("energy", 0.5, 1.0)],
            Self::Sad => &[("sadness", 0.5, 1.0), ("valence", 0.0, 0.3), ("energy", 0.2, 0.5)],
            Self::Party => &[("danceability", 0.7, 1.0), ("valence", 0.6, 1.0), ("energy", 0.6, 1.0)],
            Self::Chill => &[("acousticness", 0.6, 1.0), ("energy", 0.1, 0.5)],
            Self::Romantic => &[("romantic", 0.5, 1.0), ("valence", 0.2, 0.5)],
        }
    }

    /// Reaction marker shown in the mood picker.
    #[must_use]
    pub fn marker(self) -> &'static str {
        match self {
            Self::Happy => "😊",
            Self::Sad => "😢",
            Self::Party => "🎉",
            Self::Chill => "😌",
            Self::Romantic => "❤️",
        }
    }

    #[must_use]
    pub fn from_marker(marker: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mood| mood.marker() == marker)
    }

    /// Capitalised name for display.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Happy => "Happy",
            Self::Sad => "Sad",
            Self::Party => "Party",
            Self::Chill => "Chill",
            Self::Romantic => "Romantic",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label().to_lowercase())
    }
}

/// Seed-based and mood-based recommendations over a shared [`AttributeStore`].
#[derive(Debug, Clone)]
pub struct Recommender {
    store: Arc<AttributeStore>,
    options: RecommendOptions,
}

impl Recommender {
    #[must_use]
    pub fn new(store: Arc<AttributeStore>) -> Self {
        Self::with_options(store, RecommendOptions::default())
    }

    #[must_use]
    pub fn with_options(store: Arc<AttributeStore>, options: RecommendOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &AttributeStore {
        &self.store
    }

    pub fn options(&self) -> RecommendOptions {
        self.options
    }

    /// Recommends up to `result_size` tracks similar to `seeds`.
    #[must_use]
    pub fn recommend(&self, seeds: &[TrackRecord]) -> Vec<TrackRecord> {
        self.recommend_scored(seeds, &mut thread_rng())
            .into_iter()
            .map(|scored| scored.track)
            .collect()
    }

    /// Full algorithm with an explicit source of randomness for the shuffle.
    pub fn recommend_scored<R: Rng + ?Sized>(&self, seeds: &[TrackRecord], rng: &mut R) -> Vec<ScoredTrack> {
        let store = self.store.as_ref();

        let resolved_seeds: Vec<(&TrackRecord, TrackVectors<'_>)> = seeds
            .iter()
            .map(|seed| (seed, TrackVectors::resolve(store, seed)))
            .filter(|(seed, vectors)| {
                if !vectors.is_resolved() {
                    debug!("Seed '{seed}' has no attributes in either dataset");
                }
                vectors.is_resolved()
            })
            .collect();

        if resolved_seeds.is_empty() {
            warn!("None of the {} seed tracks could be resolved", seeds.len());
            return Vec::new();
        }

        let genres: HashSet<String> = resolved_seeds
            .iter()
            .filter_map(|(seed, _)| store.genre_of(seed.title(), seed.artist()))
            .map(str::to_lowercase)
            .collect();

        if genres.is_empty() {
            warn!("Resolved seeds have no genre in the general dataset");
            return Vec::new();
        }

        let seed_keys: HashSet<(String, String)> = seeds.iter().map(TrackRecord::key).collect();
        let mut seen = HashSet::new();
        let mut pool: Vec<&TrackRecord> = store
            .general()
            .rows()
            .iter()
            .filter(|row| {
                row.genre
                    .as_deref()
                    .is_some_and(|genre| genres.contains(&genre.to_lowercase()))
            })
            .map(|row| &row.track)
            .filter(|track| {
                let key = track.key();
                !seed_keys.contains(&key) && seen.insert(key)
            })
            .collect();

        debug!(
            "Candidate pool: {} tracks in genres {:?}",
            pool.len(),
            genres
        );

        pool.shuffle(rng);
        pool.truncate(self.options.candidate_limit);

        let candidates: Vec<(&TrackRecord, TrackVectors<'_>)> = pool
            .into_iter()
            .map(|track| (track, TrackVectors::resolve(store, track)))
            .filter(|(_, vectors)| vectors.is_resolved())
            .collect();

        let seed_vectors: Vec<TrackVectors<'_>> = resolved_seeds.iter().map(|(_, v)| *v).collect();
        let seed_count = seed_vectors.len() as f64;

        // par_iter().map().collect() keeps candidate order, so the sort below stays a
        // stable tie-break over the shuffled order.
        let mut scored: Vec<ScoredTrack> = candidates
            .par_iter()
            .map(|(track, vectors)| {
                let total: f64 = seed_vectors
                    .iter()
                    .map(|seed| score_tracks(vectors, seed))
                    .sum();
                ScoredTrack {
                    track: (*track).clone(),
                    score: total / seed_count,
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.options.result_size);

        info!(
            "Recommended {} tracks from {} seeds ({} resolved)",
            scored.len(),
            seeds.len(),
            resolved_seeds.len()
        );
        scored
    }

    /// Tracks matching a mood, in dataset order.
    #[must_use]
    pub fn recommend_by_mood(&self, mood: Mood) -> Vec<TrackRecord> {
        let tracks = self.store.filter_general(mood.ranges(), self.options.mood_limit);
        if tracks.is_empty() {
            warn!("No tracks match the {mood} mood");
        }
        tracks
    }
}
