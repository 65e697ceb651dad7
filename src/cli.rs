//! # Command-Line Interface Module
//!
//! This module defines the command-line interface for Jukebox using Clap derive macros.
//!
//! ## Commands
//!
//! - `console`: Run an interactive session in the terminal (polls, queue, playback)
//! - `recommend`: Print recommendations for one or more seed songs
//! - `mood`: Print songs matching a mood
//! - `poll`: Print a random sample of the curated dataset
//! - `completion`: Generate shell completions
//!
//! ## Examples
//!
//! ```bash
//! jukebox console
//! jukebox recommend "Hey, Soul Sister|Train" "Marry You|Bruno Mars"
//! jukebox --data-dir ~/datasets mood chill
//! ```

use crate::recommend::Mood;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
///
/// Global options override the config file and the environment.
#[derive(Parser, Debug)]
#[command(name = "jukebox")]
#[command(about = "Jukebox: a shared music queue with poll-driven song recommendations")]
#[command(version)]
pub struct Args {
    /// Directory containing songs.csv and tcc_ceds_music.csv
    #[arg(long, global = true, env = "JUKEBOX_DATA_DIR", value_hint = clap::ValueHint::DirPath)]
    pub data_dir: Option<PathBuf>,

    /// Seconds to wait for an answer to the append/replace/cancel prompt
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an interactive session in the terminal
    ///
    /// Type chat-style commands such as `!poll`, `!react 1 3` and `!recommend`.
    /// Playback goes to a recording driver that prints what it would play.
    Console {
        /// Print every message as a JSON line instead of text
        #[arg(long)]
        json: bool,
    },

    /// Recommend songs similar to the given seeds
    ///
    /// Each seed is "Title|Artist" or just a title; partial names are looked up
    /// in the datasets.
    Recommend {
        /// Seed songs
        #[arg(required = true, value_hint = clap::ValueHint::Other)]
        songs: Vec<String>,

        /// Show the similarity score of each recommendation
        #[arg(short, long)]
        verbose: bool,
    },

    /// List songs that match a mood
    Mood {
        /// Mood to match
        mood: Mood,
    },

    /// Print a random sample of the curated dataset, like a chat poll
    Poll {
        /// Number of songs to sample
        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// Generate shell completions
    ///
    /// Usage: jukebox completion bash > ~/.local/share/bash-completion/completions/jukebox
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// List curated song names for completion (hidden command)
    #[command(hide = true)]
    CompleteSongs,
}
