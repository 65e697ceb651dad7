//! # Jukebox
//!
//! Command-line entry point. Loads the configuration and the datasets, then runs the
//! requested command.
//!
//! ## Usage
//!
//! ```bash
//! # Interactive session with polls, recommendations and a queue
//! jukebox console
//!
//! # One-off recommendations
//! jukebox recommend "Hey, Soul Sister|Train" "Just the Way You Are"
//!
//! # Songs for a mood
//! jukebox mood party
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use jukebox::attributes::AttributeStore;
use jukebox::cli::{self, Command};
use jukebox::completion;
use jukebox::config::RuntimeConfig;
use jukebox::console;
use jukebox::playback::{DatasetResolver, RecordingDriver};
use jukebox::recommend::Recommender;
use jukebox::session::{Session, SessionRegistry, SessionSettings, POLL_MARKERS};
use jukebox::track::{parse_title_artist, TrackRecord};
use log::{debug, info};
use std::sync::{Arc, Mutex};

/// Loads both datasets on a blocking thread.
async fn load_store(config: &RuntimeConfig) -> Result<Arc<AttributeStore>> {
    let general = config.general_path();
    let curated = config.curated_path();
    let store = tokio::task::spawn_blocking(move || AttributeStore::load(&general, &curated))
        .await
        .context("Dataset loading task failed")?;

    for failure in store.load_failures() {
        eprintln!(
            "Warning: the {} dataset could not be loaded from {}.",
            failure.dataset.name(),
            failure.path.display()
        );
    }
    if !store.load_failures().is_empty() {
        eprintln!(
            "Set --data-dir or {} to the directory holding {} and {}.",
            jukebox::config::DATA_DIR_ENV,
            config.curated_file,
            config.general_file
        );
    }
    Ok(Arc::new(store))
}

/// Turns `Title|Artist` or a bare title into a dataset track where possible.
fn resolve_seed(store: &AttributeStore, raw: &str) -> TrackRecord {
    let seed = parse_title_artist(raw);
    match store.find_full_name(seed.title(), seed.artist()) {
        Some(found) => found,
        None => {
            debug!("Seed '{raw}' is not in the datasets");
            seed
        }
    }
}

/// Main entry point for the Jukebox application.
///
/// # Logging
///
/// Initializes environment logger which can be controlled via `RUST_LOG`:
/// - `RUST_LOG=debug jukebox console` - Enable debug logging
/// - `RUST_LOG=jukebox::recommend=trace jukebox recommend "Baby"` - Module-specific logging
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    if let Command::Completion { shell } = &args.command {
        let mut cmd = cli::Args::command();
        completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        return Ok(());
    }

    let mut config = RuntimeConfig::load();
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(timeout) = args.timeout {
        config.decision_timeout_secs = timeout;
    }
    debug!("Runtime config: {config:?}");

    let store = load_store(&config).await?;
    let recommender = Recommender::with_options(Arc::clone(&store), config.recommend_options());

    match args.command {
        Command::Console { json } => {
            let events = Arc::new(Mutex::new(Vec::new()));
            let settings = SessionSettings::from(&config);
            let driver_events = Arc::clone(&events);
            let registry = SessionRegistry::new(move |context| {
                info!("Starting session for context {context}");
                Session::new(
                    recommender.clone(),
                    Arc::new(DatasetResolver::new(Arc::clone(&store))),
                    Box::new(RecordingDriver::with_events(Arc::clone(&driver_events))),
                    settings,
                )
            });
            console::run(&registry, Some(events), json).await?;
        }
        Command::Recommend { songs, verbose } => {
            let seeds: Vec<TrackRecord> = songs.iter().map(|raw| resolve_seed(&store, raw)).collect();
            info!("Recommending from {} seeds", seeds.len());

            let scored = tokio::task::spawn_blocking(move || {
                recommender.recommend_scored(&seeds, &mut rand::thread_rng())
            })
            .await
            .context("Recommendation task failed")?;

            if scored.is_empty() {
                println!("No recommendations. Check that the seed songs are in the datasets.");
            }
            for (i, item) in scored.iter().enumerate() {
                if verbose {
                    println!("{:>2}. {} ({:.4})", i + 1, item.track, item.score);
                } else {
                    println!("{:>2}. {}", i + 1, item.track);
                }
            }
        }
        Command::Mood { mood } => {
            let tracks = recommender.recommend_by_mood(mood);
            if tracks.is_empty() {
                println!("No songs found for the selected mood.");
            }
            for track in tracks {
                println!("{} {track}", mood.marker());
            }
        }
        Command::Poll { count } => {
            let tracks = store.sample_curated(count.min(POLL_MARKERS.len()), &mut rand::thread_rng());
            for (marker, track) in POLL_MARKERS.iter().zip(&tracks) {
                println!("{marker} {track}");
            }
        }
        Command::CompleteSongs => {
            completion::write_song_completions(&store, &mut std::io::stdout())
                .context("Failed to write song completions")?;
        }
        Command::Completion { .. } => {}
    }

    Ok(())
}
