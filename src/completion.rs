//! # Shell Completion Module
//!
//! Completion scripts for the supported shells, plus the song list that scripts can
//! offer for `jukebox recommend`.
//!
//! ## Usage
//!
//! ```bash
//! # Generate bash completions
//! jukebox completion bash > ~/.local/share/bash-completion/completions/jukebox
//!
//! # Generate zsh completions
//! jukebox completion zsh > ~/.config/zsh/completions/_jukebox
//! ```

use crate::attributes::AttributeStore;
use crate::cli::Shell;
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io::{self, Write};

/// Generate shell completions for the given shell
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

/// Convert our Shell enum to clap_complete's Shell enum
pub fn shell_to_completion_shell(shell: &Shell) -> CompletionShell {
    match shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    }
}

/// Seed strings in the `Title|Artist` form, from the curated table, sorted and
/// without duplicates.
#[must_use]
pub fn get_song_completions(store: &AttributeStore) -> Vec<String> {
    let mut completions: Vec<String> = store
        .curated()
        .rows()
        .iter()
        .map(|row| format!("{}|{}", row.track.title(), row.track.artist()))
        .collect();
    completions.sort();
    completions.dedup();
    completions
}

/// Writes one completion per line, quoting entries that contain whitespace.
pub fn write_song_completions<W: Write>(store: &AttributeStore, out: &mut W) -> io::Result<()> {
    for completion in get_song_completions(store) {
        if completion.contains(char::is_whitespace) {
            writeln!(out, "\"{}\"", completion.replace('"', "\\\""))?;
        } else {
            writeln!(out, "{completion}")?;
        }
    }
    Ok(())
}
