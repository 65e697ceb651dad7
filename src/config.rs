//! # Configuration Module
//!
//! Runtime configuration for Jukebox: where the datasets live and the tunables of
//! the recommender and the session.
//!
//! ## Sources
//!
//! Lowest to highest precedence:
//!
//! 1. Built-in defaults ([`RuntimeConfig::default`])
//! 2. `config.json` in the platform config directory
//! 3. A `.env` file and the process environment (`JUKEBOX_DATA_DIR`, or the older `DATA_DIR`)
//! 4. Command-line flags, applied by `main`
//!
//! ## Platform Directories
//!
//! | Platform | Config file | Default data directory |
//! |---|---|---|
//! | Linux | `~/.config/jukebox/config.json` | `~/.local/share/jukebox/` |
//! | macOS | `~/Library/Application Support/jukebox/config.json` | `~/Library/Application Support/jukebox/` |
//! | Windows | `%APPDATA%\jukebox\config.json` | `%APPDATA%\jukebox\` |
//!
//! A config file that cannot be read or parsed is reported and ignored.

use crate::recommend::{RecommendOptions, CANDIDATE_LIMIT, MOOD_RESULT_LIMIT, RESULT_SIZE};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "jukebox";
pub const CONFIG_FILE: &str = "config.json";
pub const DATA_DIR_ENV: &str = "JUKEBOX_DATA_DIR";
/// Older variable name, still honoured.
pub const LEGACY_DATA_DIR_ENV: &str = "DATA_DIR";

/// Returns the path of the optional JSON config file.
///
/// # Errors
///
/// Fails when the platform has no config directory.
pub fn get_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| {
        anyhow::anyhow!("Could not determine system config directory.")
    })?;
    Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
}

/// Returns the platform data directory for Jukebox, creating it if needed.
///
/// # Errors
///
/// Fails when the platform has no data directory or it cannot be created.
///
/// # Examples
///
/// ```no_run
/// use jukebox::config::get_data_dir;
///
/// let dir = get_data_dir()?;
/// println!("Put songs.csv and tcc_ceds_music.csv in {}", dir.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Pass --data-dir or set {DATA_DIR_ENV}."
        )
    })?;

    let jukebox_dir = data_dir.join(APP_NAME);
    fs::create_dir_all(&jukebox_dir).with_context(|| {
        format!(
            "Failed to create Jukebox data directory at {}. Please check file permissions.",
            jukebox_dir.display()
        )
    })?;

    Ok(jukebox_dir)
}

/// Configuration for runtime behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory holding both dataset files
    pub data_dir: PathBuf,
    /// Curated dataset (9 audio features), used for polls
    pub curated_file: String,
    /// General dataset (22 features), used for candidates, genres and moods
    pub general_file: String,
    pub poll_size: usize,
    pub candidate_limit: usize,
    pub recommendation_size: usize,
    pub mood_result_limit: usize,
    /// Seconds to wait for the append/replace/cancel answer
    pub decision_timeout_secs: u64,
    /// Seconds to wait for a mood pick
    pub mood_timeout_secs: u64,
    pub default_volume: u8,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .map(|dir| dir.join(APP_NAME))
                .unwrap_or_else(|| PathBuf::from("data")),
            curated_file: "songs.csv".to_string(),
            general_file: "tcc_ceds_music.csv".to_string(),
            poll_size: 10,
            candidate_limit: CANDIDATE_LIMIT,
            recommendation_size: RESULT_SIZE,
            mood_result_limit: MOOD_RESULT_LIMIT,
            decision_timeout_secs: 60,
            mood_timeout_secs: 30,
            default_volume: 50,
        }
    }
}

impl RuntimeConfig {
    /// Defaults, then the config file, then `.env` and the environment.
    #[must_use]
    pub fn load() -> Self {
        let mut config = match get_config_path() {
            Ok(path) => Self::from_file(&path),
            Err(e) => {
                debug!("{e:#} Using defaults.");
                Self::default()
            }
        };

        if let Ok(path) = dotenv::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Reads a JSON config file. A missing file yields the defaults silently; an
    /// unreadable or invalid one is reported and also yields the defaults.
    #[must_use]
    pub fn from_file(path: &Path) -> Self {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Self::default();
        }

        let parsed = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))
            .and_then(|contents| {
                serde_json::from_str::<Self>(&contents)
                    .with_context(|| format!("Failed to parse {}", path.display()))
            });

        match parsed {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("{e:#}. Using defaults.");
                Self::default()
            }
        }
    }

    /// Applies environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup(DATA_DIR_ENV)
            .or_else(|| lookup(LEGACY_DATA_DIR_ENV))
            .filter(|dir| !dir.trim().is_empty());
        if let Some(dir) = data_dir {
            debug!("Data directory overridden by environment: {dir}");
            self.data_dir = PathBuf::from(dir);
        }
    }

    /// Create configuration with an explicit data directory
    #[must_use]
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn curated_path(&self) -> PathBuf {
        self.data_dir.join(&self.curated_file)
    }

    #[must_use]
    pub fn general_path(&self) -> PathBuf {
        self.data_dir.join(&self.general_file)
    }

    #[must_use]
    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision_timeout_secs)
    }

    #[must_use]
    pub fn mood_timeout(&self) -> Duration {
        Duration::from_secs(self.mood_timeout_secs)
    }

    #[must_use]
    pub fn recommend_options(&self) -> RecommendOptions {
        RecommendOptions {
            candidate_limit: self.candidate_limit,
            result_size: self.recommendation_size,
            mood_limit: self.mood_result_limit,
        }
    }
}
