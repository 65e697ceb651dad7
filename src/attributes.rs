//! # Attribute Store
//!
//! Loads the two song datasets into typed, read-only tables and answers
//! "what is the attribute vector of (title, artist)?".
//!
//! ## Datasets
//!
//! | Table | File (default) | Role | Features |
//! |---|---|---|---|
//! | [`Dataset::General`] | `tcc_ceds_music.csv` | primary lookup, candidate pool, genres, moods | 22 lyric-topic and audio scores |
//! | [`Dataset::Curated`] | `songs.csv` | alternate lookup, poll sampling | 9 audio descriptors |
//!
//! The two feature spaces are unrelated. An [`AttributeVector`] remembers which table
//! it came from and the scorer refuses to compare vectors across tables.
//!
//! ## Degradation
//!
//! A missing file or a file without the expected columns becomes an empty table and a
//! recorded [`LoadFailure`]; the store still works, recommendations just get worse.
//! Rows that cannot be parsed are skipped. Nothing in here panics on bad data.

use crate::track::{contains_ignore_case, identity_key, TrackRecord};
use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use rand::seq::index;
use rand::Rng;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Feature columns of the general table, in vector order.
pub const GENERAL_FEATURES: [&str; 22] = [
    "dating",
    "violence",
    "world/life",
    "night/time",
    "shake the audience",
    "family/gospel",
    "romantic",
    "communication",
    "obscene",
    "music",
    "movement/places",
    "light/visual perceptions",
    "family/spiritual",
    "like/girls",
    "sadness",
    "feelings",
    "danceability",
    "loudness",
    "acousticness",
    "instrumentalness",
    "valence",
    "energy",
];

/// Feature columns of the curated table, in vector order:
/// tempo, energy, danceability, liveness, valence, duration, acousticness,
/// speechiness, popularity.
pub const CURATED_FEATURES: [&str; 9] = [
    "bpm", "nrgy", "dnce", "live", "val", "dur", "acous", "spch", "pop",
];

const TITLE_COLUMNS: [&str; 3] = ["track_name", "title", "track"];
const ARTIST_COLUMNS: [&str; 2] = ["artist_name", "artist"];
const GENRE_COLUMNS: [&str; 2] = ["genre", "top genre"];
const YEAR_COLUMNS: [&str; 2] = ["year", "release_date"];

/// Which dataset a table or vector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    General,
    Curated,
}

impl Dataset {
    #[must_use]
    pub fn features(self) -> &'static [&'static str] {
        match self {
            Self::General => &GENERAL_FEATURES,
            Self::Curated => &CURATED_FEATURES,
        }
    }

    /// Native vector length of this dataset.
    #[must_use]
    pub fn dimension(self) -> usize {
        self.features().len()
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Curated => "curated",
        }
    }
}

/// Numeric features of one track in one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeVector {
    dataset: Dataset,
    values: Vec<f64>,
}

impl AttributeVector {
    /// Builds a vector, rejecting one whose length does not match the dataset.
    pub fn new(dataset: Dataset, values: Vec<f64>) -> Result<Self> {
        if values.len() != dataset.dimension() {
            return Err(anyhow!(
                "{} vectors have {} features, got {}",
                dataset.name(),
                dataset.dimension(),
                values.len()
            ));
        }
        Ok(Self { dataset, values })
    }

    /// The all-zero "not found" vector of a dataset.
    #[must_use]
    pub fn sentinel(dataset: Dataset) -> Self {
        Self {
            dataset,
            values: vec![0.0; dataset.dimension()],
        }
    }

    /// True for an all-zero vector. Such a vector carries no direction and scores 0.0.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    pub fn dataset(&self) -> Dataset {
        self.dataset
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of a named feature, if this dataset has it.
    #[must_use]
    pub fn feature(&self, name: &str) -> Option<f64> {
        self.dataset
            .features()
            .iter()
            .position(|f| *f == name)
            .map(|i| self.values[i])
    }
}

/// One parsed dataset row.
#[derive(Debug, Clone)]
pub struct DatasetRow {
    pub track: TrackRecord,
    pub genre: Option<String>,
    pub year: Option<u32>,
    pub vector: AttributeVector,
}

/// Counters reported after parsing a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub loaded: usize,
    pub skipped: usize,
}

/// A dataset that could not be loaded and was replaced by an empty table.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub dataset: Dataset,
    pub path: PathBuf,
    pub reason: String,
}

/// Resolved header positions for one file.
struct ColumnMap {
    title: usize,
    artist: usize,
    genre: Option<usize>,
    year: Option<usize>,
    features: Vec<usize>,
}

impl ColumnMap {
    fn from_headers(dataset: Dataset, headers: &csv::StringRecord) -> Result<Self> {
        let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| normalized.iter().position(|h| h == name))
        };

        let title = find(&TITLE_COLUMNS).ok_or_else(|| anyhow!("no track name column"))?;
        let artist = find(&ARTIST_COLUMNS).ok_or_else(|| anyhow!("no artist column"))?;
        let features = dataset
            .features()
            .iter()
            .map(|feature| find(&[*feature]).ok_or_else(|| anyhow!("missing feature column `{feature}`")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            title,
            artist,
            genre: find(&GENRE_COLUMNS),
            year: find(&YEAR_COLUMNS),
            features,
        })
    }

    fn parse_row(&self, dataset: Dataset, record: &csv::StringRecord) -> Option<DatasetRow> {
        let title = record.get(self.title)?.trim();
        let artist = record.get(self.artist)?.trim();
        if title.is_empty() || artist.is_empty() {
            return None;
        }

        let values = self
            .features
            .iter()
            .map(|&i| record.get(i)?.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
            .collect::<Option<Vec<_>>>()?;

        let genre = self
            .genre
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string);
        let year = self
            .year
            .and_then(|i| record.get(i))
            .and_then(|y| y.trim().parse::<f64>().ok())
            .filter(|y| *y >= 0.0)
            .map(|y| y as u32);

        Some(DatasetRow {
            track: TrackRecord::from_dataset(title, artist),
            genre,
            year,
            vector: AttributeVector::new(dataset, values).ok()?,
        })
    }
}

/// An immutable, indexed dataset.
#[derive(Debug, Clone)]
pub struct AttributeTable {
    dataset: Dataset,
    rows: Vec<DatasetRow>,
    index: HashMap<(String, String), usize>,
}

impl AttributeTable {
    #[must_use]
    pub fn empty(dataset: Dataset) -> Self {
        Self {
            dataset,
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Builds a table from already parsed rows. The first row of a duplicated
    /// `(title, artist)` pair wins lookups.
    #[must_use]
    pub fn from_rows(dataset: Dataset, rows: Vec<DatasetRow>) -> Self {
        let mut index = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            index.entry(row.track.key()).or_insert(i);
        }
        Self { dataset, rows, index }
    }

    /// Parses CSV from any reader. Fails only when the header is unusable.
    pub fn from_reader<R: Read>(dataset: Dataset, reader: R) -> Result<(Self, LoadStats)> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);
        let headers = csv_reader
            .headers()
            .context("Failed to read CSV header")?
            .clone();
        let columns = ColumnMap::from_headers(dataset, &headers)
            .with_context(|| format!("Unexpected {} dataset schema", dataset.name()))?;

        let mut stats = LoadStats::default();
        let mut rows = Vec::new();
        for (line, record) in csv_reader.records().enumerate() {
            match record.ok().and_then(|r| columns.parse_row(dataset, &r)) {
                Some(row) => {
                    rows.push(row);
                    stats.loaded += 1;
                }
                None => {
                    debug!("Skipping malformed {} row {}", dataset.name(), line + 2);
                    stats.skipped += 1;
                }
            }
        }

        if stats.skipped > 0 {
            warn!(
                "Skipped {} malformed rows in {} dataset ({} loaded)",
                stats.skipped,
                dataset.name(),
                stats.loaded
            );
        }

        Ok((Self::from_rows(dataset, rows), stats))
    }

    /// Reads a CSV file from disk.
    pub fn load(dataset: Dataset, path: &Path) -> Result<(Self, LoadStats)> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open {} dataset at {}", dataset.name(), path.display()))?;
        Self::from_reader(dataset, file)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn dataset(&self) -> Dataset {
        self.dataset
    }

    pub fn rows(&self) -> &[DatasetRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Exact, case-insensitive lookup.
    #[must_use]
    pub fn lookup(&self, title: &str, artist: &str) -> Option<&DatasetRow> {
        self.index
            .get(&identity_key(title, artist))
            .map(|&i| &self.rows[i])
    }

    /// First row whose title and artist both contain the given fragments.
    #[must_use]
    pub fn search(&self, partial_title: &str, partial_artist: &str) -> Option<&DatasetRow> {
        self.rows.iter().find(|row| {
            contains_ignore_case(row.track.title(), partial_title)
                && contains_ignore_case(row.track.artist(), partial_artist)
        })
    }
}

/// Both datasets plus what went wrong while loading them.
#[derive(Debug, Clone)]
pub struct AttributeStore {
    general: AttributeTable,
    curated: AttributeTable,
    failures: Vec<LoadFailure>,
}

impl AttributeStore {
    #[must_use]
    pub fn new(general: AttributeTable, curated: AttributeTable) -> Self {
        Self {
            general,
            curated,
            failures: Vec::new(),
        }
    }

    /// Loads both files. Never fails: an unreadable file becomes an empty table
    /// and a [`LoadFailure`].
    #[must_use]
    pub fn load(general_path: &Path, curated_path: &Path) -> Self {
        let mut failures = Vec::new();
        let mut load_table = |dataset: Dataset, path: &Path| match AttributeTable::load(dataset, path) {
            Ok((table, stats)) => {
                info!(
                    "Loaded {} dataset from {}: {} rows",
                    dataset.name(),
                    path.display(),
                    stats.loaded
                );
                table
            }
            Err(e) => {
                error!("{e:#}. The {} dataset is empty.", dataset.name());
                failures.push(LoadFailure {
                    dataset,
                    path: path.to_path_buf(),
                    reason: format!("{e:#}"),
                });
                AttributeTable::empty(dataset)
            }
        };

        let general = load_table(Dataset::General, general_path);
        let curated = load_table(Dataset::Curated, curated_path);

        Self {
            general,
            curated,
            failures,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(
            AttributeTable::empty(Dataset::General),
            AttributeTable::empty(Dataset::Curated),
        )
    }

    pub fn general(&self) -> &AttributeTable {
        &self.general
    }

    pub fn curated(&self) -> &AttributeTable {
        &self.curated
    }

    pub fn load_failures(&self) -> &[LoadFailure] {
        &self.failures
    }

    /// Primary lookup (general table, 22 features).
    #[must_use]
    pub fn lookup_primary(&self, title: &str, artist: &str) -> Option<&AttributeVector> {
        self.general.lookup(title, artist).map(|row| &row.vector)
    }

    /// Alternate lookup (curated table, 9 features).
    #[must_use]
    pub fn lookup_alternate(&self, title: &str, artist: &str) -> Option<&AttributeVector> {
        self.curated.lookup(title, artist).map(|row| &row.vector)
    }

    /// Genre of a track according to the general table.
    #[must_use]
    pub fn genre_of(&self, title: &str, artist: &str) -> Option<&str> {
        self.general
            .lookup(title, artist)
            .and_then(|row| row.genre.as_deref())
    }

    /// Canonical `(title, artist)` for partial input, curated table first.
    #[must_use]
    pub fn find_full_name(&self, partial_title: &str, partial_artist: &str) -> Option<TrackRecord> {
        let found = self
            .curated
            .search(partial_title, partial_artist)
            .or_else(|| self.general.search(partial_title, partial_artist));

        if found.is_none() {
            warn!("Song '{partial_title}' by '{partial_artist}' not found in datasets");
        }
        found.map(|row| row.track.clone())
    }

    /// Exact, case-insensitive `(title, artist)` match, curated table first.
    #[must_use]
    pub fn find_exact(&self, title: &str, artist: &str) -> Option<TrackRecord> {
        self.curated
            .lookup(title, artist)
            .or_else(|| self.general.lookup(title, artist))
            .map(|row| row.track.clone())
    }

    /// `n` distinct random tracks of the curated table, fewer if it is smaller.
    pub fn sample_curated<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<TrackRecord> {
        if self.curated.is_empty() {
            warn!("Cannot sample: curated dataset is empty");
            return Vec::new();
        }
        let amount = n.min(self.curated.len());
        index::sample(rng, self.curated.len(), amount)
            .into_iter()
            .map(|i| self.curated.rows[i].track.clone())
            .collect()
    }

    /// General-table tracks whose features fall inside every inclusive range,
    /// in file order, at most `limit`. Ranges naming unknown features are ignored.
    #[must_use]
    pub fn filter_general(&self, ranges: &[(&str, f64, f64)], limit: usize) -> Vec<TrackRecord> {
        let known: Vec<_> = ranges
            .iter()
            .filter(|(feature, _, _)| {
                let present = GENERAL_FEATURES.contains(feature);
                if !present {
                    warn!("Feature '{feature}' not found in the general dataset columns");
                }
                present
            })
            .collect();

        self.general
            .rows
            .iter()
            .filter(|row| {
                known.iter().all(|(feature, min, max)| {
                    row.vector
                        .feature(feature)
                        .is_some_and(|v| v >= *min && v <= *max)
                })
            })
            .take(limit)
            .map(|row| row.track.clone())
            .collect()
    }
}
