//! Shared music queue with poll-driven, content-based song recommendations.
//!
//! Core modules:
//! - [`attributes`] - Dataset loading and attribute lookup
//! - [`similarity`] - Cosine similarity with dataset fallback
//! - [`recommend`] - Seed-based and mood-based recommendations
//! - [`queue`] - The playback queue and its cursor
//! - [`playback`] - Playback state machine, driver and resolver seams
//! - [`session`] - Per-context orchestration of polls, prompts and playback
//!
//! ### Supporting Modules
//!
//! - [`track`] - Track identity and matching rules
//! - [`directive`] - Presentation-neutral responses
//! - [`commands`] - Command names, aliases and argument parsing
//! - [`config`] - Configuration and data directory management
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//! - [`console`] - Terminal front end for a session
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use jukebox::attributes::AttributeStore;
//! use jukebox::config::RuntimeConfig;
//! use jukebox::recommend::{Mood, Recommender};
//! use jukebox::track::TrackRecord;
//! use std::sync::Arc;
//!
//! let config = RuntimeConfig::load();
//! let store = Arc::new(AttributeStore::load(&config.general_path(), &config.curated_path()));
//! let recommender = Recommender::with_options(store, config.recommend_options());
//!
//! let seeds = [TrackRecord::from_dataset("Hey, Soul Sister", "Train")];
//! for track in recommender.recommend(&seeds) {
//!     println!("{track}");
//! }
//!
//! let chill = recommender.recommend_by_mood(Mood::Chill);
//! println!("{} chill songs", chill.len());
//! ```
//!
//! ## Recommendation Details
//!
//! Every track may have a 22-feature vector in the general dataset and a 9-feature
//! vector in the curated one. Two tracks are compared in the general space when both
//! have it, otherwise in the curated space, otherwise they score 0. A request scores
//! a bounded, shuffled sample of same-genre candidates against every seed and
//! returns the best averages.
//!
//! ## Error Handling
//!
//! Startup and I/O paths return `anyhow::Result` with context. Expected failures of
//! user commands are typed (`QueueError`, `PlaybackError`, `SessionError`) and end up
//! as notifications rather than crashes.
//!
//! ## Testing
//!
//! Run tests with:
//! ```bash
//! cargo test
//! cargo bench
//! ```

pub mod attributes;
pub mod cli;
pub mod commands;
pub mod completion;
pub mod config;
pub mod console;
pub mod directive;
pub mod playback;
pub mod queue;
pub mod recommend;
pub mod session;
pub mod similarity;
pub mod track;
