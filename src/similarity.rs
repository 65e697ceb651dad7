//! # Similarity Scorer
//!
//! Cosine similarity between attribute vectors, and the pairwise dataset fallback
//! the recommender uses to decide *which* vectors of two tracks to compare.
//!
//! ## Rules
//!
//! - `cos(a, b) = a·b / (|a| |b|)`, clamped to `[-1, 1]`.
//! - A zero-magnitude input (including the all-zero "not found" sentinel) scores `0.0`.
//! - Vectors from different datasets are never compared; such a pair scores `0.0`.
//! - For two tracks, the general vectors are used when both tracks have one,
//!   otherwise the curated vectors when both have one, otherwise the pair scores `0.0`.
//!
//! Everything here is pure and deterministic.

use crate::attributes::{AttributeStore, AttributeVector};
use crate::track::TrackRecord;
use log::trace;

/// Cosine similarity of two equal-length slices.
///
/// # Examples
///
/// ```
/// use jukebox::similarity::cosine_similarity;
///
/// assert_eq!(cosine_similarity(&[3.0, 4.0], &[3.0, 4.0]), 1.0);
/// assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
/// assert_eq!(cosine_similarity(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
/// ```
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "cosine similarity of mismatched lengths");
    if a.len() != b.len() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0, 0.0, 0.0), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Scores two attribute vectors. Cross-dataset pairs and sentinels score `0.0`.
#[must_use]
pub fn score(a: &AttributeVector, b: &AttributeVector) -> f64 {
    if a.dataset() != b.dataset() {
        trace!(
            "Refusing to compare {} and {} vectors",
            a.dataset().name(),
            b.dataset().name()
        );
        return 0.0;
    }
    cosine_similarity(a.values(), b.values())
}

/// The vectors a track has in each dataset.
#[derive(Debug, Clone, Copy)]
pub struct TrackVectors<'a> {
    pub primary: Option<&'a AttributeVector>,
    pub alternate: Option<&'a AttributeVector>,
}

impl<'a> TrackVectors<'a> {
    #[must_use]
    pub fn resolve(store: &'a AttributeStore, track: &TrackRecord) -> Self {
        Self {
            primary: store.lookup_primary(track.title(), track.artist()),
            alternate: store.lookup_alternate(track.title(), track.artist()),
        }
    }

    /// True when the track has a vector in at least one dataset.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.primary.is_some() || self.alternate.is_some()
    }
}

/// Similarity of two tracks with dataset fallback.
#[must_use]
pub fn score_tracks(a: &TrackVectors<'_>, b: &TrackVectors<'_>) -> f64 {
    match (a.primary, b.primary) {
        (Some(pa), Some(pb)) => score(pa, pb),
        _ => match (a.alternate, b.alternate) {
            (Some(aa), Some(ab)) => score(aa, ab),
            _ => 0.0,
        },
    }
}
