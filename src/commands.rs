//! # Commands
//!
//! Turns a triggered `(name, args)` pair from the command router into a typed
//! [`Command`]. Names are case-insensitive and may use an alias. Indices typed by
//! users are 1-based here; the session converts them.

use std::fmt;
use thiserror::Error;

/// Prefix used by chat-style front ends.
pub const PREFIX: char = '!';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Poll,
    Recommend,
    Mood,
    Play(String),
    Add(String),
    Pause,
    Resume,
    Stop,
    Next,
    Previous,
    NowPlaying,
    Volume(i64),
    Queue,
    Clear,
    Shuffle,
    /// 1-based index.
    Remove(usize),
    /// Removes the first track with this title.
    RemoveTitle(String),
    /// 1-based indices.
    Move { from: usize, to: usize },
    /// Moves the first track with this title to a 1-based slot.
    MoveTitle { title: String, position: usize },
}

/// Static description of a command, used for parsing and for `help`.
#[derive(Debug, Clone, Copy)]
pub struct CommandInfo {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub help: &'static str,
}

pub const COMMANDS: &[CommandInfo] = &[
    CommandInfo { name: "help", aliases: &["show", "commands"], usage: "help", help: "Shows all the commands available" },
    CommandInfo { name: "poll", aliases: &[], usage: "poll", help: "Shows 10 random songs to react to. Run recommend afterwards" },
    CommandInfo { name: "recommend", aliases: &["get_songs"], usage: "recommend", help: "Recommends songs based on the poll reactions" },
    CommandInfo { name: "mood", aliases: &["mood_recommend"], usage: "mood", help: "Recommends songs based on your mood or activity" },
    CommandInfo { name: "play", aliases: &["play_song"], usage: "play <song>", help: "Clears the queue and plays a song, it does not need to be in the datasets" },
    CommandInfo { name: "add", aliases: &["add_song"], usage: "add <song>", help: "Adds a song to the end of the queue" },
    CommandInfo { name: "pause", aliases: &[], usage: "pause", help: "Pauses the song" },
    CommandInfo { name: "resume", aliases: &[], usage: "resume", help: "Resumes the song" },
    CommandInfo { name: "stop", aliases: &[], usage: "stop", help: "Stops the song" },
    CommandInfo { name: "next", aliases: &["skip", "next_song"], usage: "next", help: "Plays the next song in the queue" },
    CommandInfo { name: "prev", aliases: &["previous", "prev_song"], usage: "prev", help: "Plays the previous song in the queue" },
    CommandInfo { name: "now", aliases: &["np", "nowplaying"], usage: "now", help: "Shows the song that is playing" },
    CommandInfo { name: "volume", aliases: &["vol"], usage: "volume <0-100>", help: "Sets the playback volume" },
    CommandInfo { name: "queue", aliases: &["q"], usage: "queue", help: "Shows the queue" },
    CommandInfo { name: "clear", aliases: &[], usage: "clear", help: "Clears all songs in the queue" },
    CommandInfo { name: "shuffle", aliases: &[], usage: "shuffle", help: "Shuffles the queue, the current song stays put" },
    CommandInfo { name: "remove", aliases: &[], usage: "remove <index> | remove <title>", help: "Removes a song from the queue by its index or title" },
    CommandInfo { name: "move", aliases: &[], usage: "move <index> <new index> | move <title> <position>", help: "Moves a song within the queue" },
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command '{0}', try help")]
    Unknown(String),
    #[error("missing argument, usage: {0}")]
    MissingArgument(&'static str),
    #[error("'{value}' is not a valid number, usage: {usage}")]
    InvalidNumber { value: String, usage: &'static str },
}

/// Looks a command up by name or alias.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static CommandInfo> {
    let name = name.trim().trim_start_matches(PREFIX).to_lowercase();
    COMMANDS
        .iter()
        .find(|info| info.name == name || info.aliases.contains(&name.as_str()))
}

/// Parses a triggered command.
pub fn parse(name: &str, args: &[String]) -> Result<Command, ParseError> {
    let info = lookup(name).ok_or_else(|| ParseError::Unknown(name.to_string()))?;
    let usage = info.usage;
    let rest = || {
        let joined = args.join(" ");
        let joined = joined.trim();
        if joined.is_empty() {
            Err(ParseError::MissingArgument(usage))
        } else {
            Ok(joined.to_string())
        }
    };
    let number = |raw: Option<&String>| -> Result<i64, ParseError> {
        let raw = raw.ok_or(ParseError::MissingArgument(usage))?;
        raw.trim().parse().map_err(|_| ParseError::InvalidNumber {
            value: raw.clone(),
            usage,
        })
    };
    let index = |raw: Option<&String>| -> Result<usize, ParseError> {
        let value = number(raw)?;
        usize::try_from(value).map_err(|_| ParseError::InvalidNumber {
            value: value.to_string(),
            usage,
        })
    };

    let command = match info.name {
        "help" => Command::Help,
        "poll" => Command::Poll,
        "recommend" => Command::Recommend,
        "mood" => Command::Mood,
        "play" => Command::Play(rest()?),
        "add" => Command::Add(rest()?),
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "stop" => Command::Stop,
        "next" => Command::Next,
        "prev" => Command::Previous,
        "now" => Command::NowPlaying,
        "volume" => Command::Volume(number(args.first())?),
        "queue" => Command::Queue,
        "clear" => Command::Clear,
        "shuffle" => Command::Shuffle,
        "remove" => match args {
            [raw] if raw.trim().parse::<i64>().is_ok() => Command::Remove(index(Some(raw))?),
            _ => Command::RemoveTitle(rest()?),
        },
        "move" => parse_move(args, usage, index)?,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(command)
}

fn parse_move(
    args: &[String],
    usage: &'static str,
    index: impl Fn(Option<&String>) -> Result<usize, ParseError>,
) -> Result<Command, ParseError> {
    match args {
        [] | [_] => Err(ParseError::MissingArgument(usage)),
        [from, to] if from.trim().parse::<i64>().is_ok() => Ok(Command::Move {
            from: index(Some(from))?,
            to: index(Some(to))?,
        }),
        [title @ .., position] => Ok(Command::MoveTitle {
            title: title.join(" "),
            position: index(Some(position))?,
        }),
    }
}

/// Parses a typed line such as `!move 3 1`. Returns `None` for lines without the
/// prefix.
#[must_use]
pub fn parse_line(line: &str) -> Option<Result<Command, ParseError>> {
    let line = line.trim().strip_prefix(PREFIX)?;
    let mut words = line.split_whitespace();
    let name = words.next()?;
    let args: Vec<String> = words.map(str::to_string).collect();
    Some(parse(name, &args))
}

impl fmt::Display for CommandInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{} - {}", self.usage, self.help)
    }
}
