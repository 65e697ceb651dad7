//! # Console Front End
//!
//! Drives a [`Session`] from a terminal. It stands in for a chat client: commands
//! are typed with the `!` prefix, and reactions and prompt answers are typed as well.
//!
//! ```text
//! !poll                  show a poll
//! !react 1 3             react to the latest poll with markers 1 and 3
//! !recommend             recommend from the reactions, then answer:
//! add | replace | cancel
//! !mood                  then answer with a mood name or marker, e.g. happy or 😊
//! !finish                pretend the playing track ended
//! !quit
//! ```
//!
//! Answers go straight to the session's response channels, so they reach a prompt
//! that is already waiting. Answers typed while no prompt is showing are discarded.
//! Everything else is handled in order on the main task.

use crate::commands::PREFIX;
use crate::directive::Directive;
use crate::playback::DriverEvent;
use crate::recommend::Mood;
use crate::session::{
    response_channels, Invocation, MergeChoice, MessageId, Presenter, ReactionTally, ResponseSenders,
    SessionRegistry, UserId, POLL_MARKERS,
};
use anyhow::Result;
use clap::ValueEnum;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Context id of the single console session.
pub const CONSOLE_CONTEXT: u64 = 0;
/// The person at the keyboard.
pub const CONSOLE_USER: UserId = 1;

/// One line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Command { name: String, args: Vec<String> },
    /// 1-based poll markers to react with.
    React(Vec<usize>),
    Merge(MergeChoice),
    Mood(Mood),
    Finish,
    Quit,
    Unrecognized(String),
}

/// Classifies a typed line. Blank lines yield `None`.
#[must_use]
pub fn parse_input(line: &str) -> Option<ConsoleInput> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(rest) = line.strip_prefix(PREFIX) {
        let mut words = rest.split_whitespace();
        let name = words.next()?.to_lowercase();
        let args: Vec<String> = words.map(str::to_string).collect();
        let input = match name.as_str() {
            "react" => ConsoleInput::React(
                args.iter()
                    .filter_map(|raw| match raw.parse::<usize>() {
                        Ok(n) if (1..=POLL_MARKERS.len()).contains(&n) => Some(n),
                        _ => {
                            warn!("Ignoring reaction '{raw}'");
                            None
                        }
                    })
                    .collect(),
            ),
            "finish" => ConsoleInput::Finish,
            "quit" | "exit" => ConsoleInput::Quit,
            _ => ConsoleInput::Command { name, args },
        };
        return Some(input);
    }

    if let Some(choice) = MergeChoice::from_word(line) {
        return Some(ConsoleInput::Merge(choice));
    }
    Mood::from_marker(line)
        .or_else(|| Mood::from_str(line, true).ok())
        .map(ConsoleInput::Mood)
        .or_else(|| Some(ConsoleInput::Unrecognized(line.to_string())))
}

/// Writes directives to a terminal (or any writer), as text or as JSON lines.
pub struct ConsolePresenter<W: Write + Send> {
    out: W,
    json: bool,
    next_id: MessageId,
    reactions: HashMap<MessageId, Vec<ReactionTally>>,
    last_poll: Option<MessageId>,
}

impl<W: Write + Send> ConsolePresenter<W> {
    #[must_use]
    pub fn new(out: W, json: bool) -> Self {
        Self {
            out,
            json,
            next_id: 0,
            reactions: HashMap::new(),
            last_poll: None,
        }
    }

    /// Reacts to the latest poll with the given 1-based markers, replacing earlier
    /// reactions. Returns `false` when no poll has been shown.
    pub fn react(&mut self, markers: &[usize]) -> bool {
        let Some(poll) = self.last_poll else {
            return false;
        };
        let tallies = POLL_MARKERS
            .iter()
            .enumerate()
            .map(|(i, marker)| ReactionTally::new(*marker, u32::from(markers.contains(&(i + 1)))))
            .collect();
        self.reactions.insert(poll, tallies);
        true
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(&mut self, id: MessageId, directive: &Directive) -> Result<()> {
        if self.json {
            let line = serde_json::json!({ "id": id, "directive": directive });
            writeln!(self.out, "{line}")?;
            return Ok(());
        }

        if let Some(text) = &directive.text {
            writeln!(self.out, "{text}")?;
        }
        if let Some(panel) = &directive.panel {
            writeln!(self.out, "== {} ==", panel.title)?;
            if !panel.body.is_empty() {
                writeln!(self.out, "{}", panel.body)?;
            }
            for field in &panel.fields {
                writeln!(self.out, "-- {} --\n{}", field.name, field.value)?;
            }
        }
        if !directive.reactions.is_empty() {
            writeln!(self.out, "[message {id}, react with: {}]", directive.reactions.join(" "))?;
        }
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> Presenter for ConsolePresenter<W> {
    fn present(&mut self, directive: Directive) -> MessageId {
        self.next_id += 1;
        let id = self.next_id;
        if directive.reactions.first().map(String::as_str) == Some(POLL_MARKERS[0]) {
            self.last_poll = Some(id);
        }
        if let Err(e) = self.render(id, &directive) {
            warn!("Failed to write message {id}: {e:#}");
        }
        id
    }

    fn delete(&mut self, message: MessageId) {
        debug!("Deleting message {message}");
        self.reactions.remove(&message);
        if self.last_poll == Some(message) {
            self.last_poll = None;
        }
        if !self.json {
            if let Err(e) = writeln!(self.out, "(message {message} deleted)") {
                warn!("Failed to write deletion of message {message}: {e}");
            }
        }
    }

    fn reactions(&self, message: MessageId) -> Vec<ReactionTally> {
        self.reactions.get(&message).cloned().unwrap_or_default()
    }
}

/// Hands an answer to a waiting prompt. A full buffer means no prompt is reading, so
/// the answer is dropped rather than blocking the reader.
fn offer<T>(answers: &mpsc::Sender<(UserId, T)>, answer: T) -> bool {
    match answers.try_send((CONSOLE_USER, answer)) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!("Dropping an answer, no prompt is waiting");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Routes answers to the prompt channels and everything else to `inputs`.
async fn forward(input: ConsoleInput, answers: &ResponseSenders, inputs: &mpsc::Sender<ConsoleInput>) -> bool {
    let delivered = match input {
        ConsoleInput::Merge(choice) => offer(&answers.merge, choice),
        ConsoleInput::Mood(mood) => offer(&answers.mood, mood),
        other => inputs.send(other).await.is_ok(),
    };
    if !delivered {
        debug!("Console input channel closed");
    }
    delivered
}

/// Runs the console until `!quit` or end of input.
///
/// `driver_events` is the event log of the session's recording driver; new events are
/// echoed after each input.
pub async fn run(
    registry: &SessionRegistry,
    driver_events: Option<Arc<Mutex<Vec<DriverEvent>>>>,
    json: bool,
) -> Result<()> {
    let (answers, mut responses) = response_channels(8);
    let (input_tx, mut input_rx) = mpsc::channel::<ConsoleInput>(32);

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let Some(input) = parse_input(&line) else {
                        continue;
                    };
                    let quit = input == ConsoleInput::Quit;
                    if !forward(input, &answers, &input_tx).await || quit {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read from stdin: {e}");
                    break;
                }
            }
        }
    });

    let session = registry.get_or_create(CONSOLE_CONTEXT);
    let mut presenter = ConsolePresenter::new(std::io::stdout(), json);
    let mut echoed = 0;
    let invocation = Invocation::new(CONSOLE_USER);
    info!("Console ready, type {PREFIX}help for commands");

    while let Some(input) = input_rx.recv().await {
        let mut session = session.lock().await;
        match input {
            ConsoleInput::Command { name, args } => {
                session
                    .trigger(&name, &args, invocation, &mut presenter, &mut responses)
                    .await;
            }
            ConsoleInput::React(markers) => {
                if !presenter.react(&markers) {
                    presenter.present(Directive::text("There is no poll to react to."));
                }
            }
            ConsoleInput::Finish => {
                let handle = session.player().handle();
                match handle {
                    Some(handle) => session.playback_finished(handle, &mut presenter).await,
                    None => {
                        presenter.present(Directive::text("Nothing is playing."));
                    }
                }
            }
            ConsoleInput::Quit => break,
            ConsoleInput::Unrecognized(line) => {
                presenter.present(Directive::text(format!(
                    "Unrecognized input '{line}'. Commands start with {PREFIX}, try {PREFIX}help."
                )));
            }
            // Answers never reach this loop.
            ConsoleInput::Merge(_) | ConsoleInput::Mood(_) => {}
        }

        if let Some(events) = &driver_events {
            let events = events.lock().unwrap_or_else(PoisonError::into_inner);
            for event in events.iter().skip(echoed) {
                if !json {
                    println!("  [driver] {event:?}");
                }
            }
            echoed = events.len();
        }
    }

    reader.abort();
    registry.remove(CONSOLE_CONTEXT);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(presenter: ConsolePresenter<Vec<u8>>) -> String {
        String::from_utf8(presenter.into_inner()).unwrap()
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("   "), None);
        assert_eq!(
            parse_input("!move 3 1"),
            Some(ConsoleInput::Command {
                name: "move".to_string(),
                args: vec!["3".to_string(), "1".to_string()]
            })
        );
        assert_eq!(parse_input("!react 1 3 12 x"), Some(ConsoleInput::React(vec![1, 3])));
        assert_eq!(parse_input("!FINISH"), Some(ConsoleInput::Finish));
        assert_eq!(parse_input("!exit"), Some(ConsoleInput::Quit));
        assert_eq!(parse_input("replace"), Some(ConsoleInput::Merge(MergeChoice::Replace)));
        assert_eq!(parse_input("✅"), Some(ConsoleInput::Merge(MergeChoice::Append)));
        assert_eq!(parse_input("Chill"), Some(ConsoleInput::Mood(Mood::Chill)));
        assert_eq!(parse_input("😢"), Some(ConsoleInput::Mood(Mood::Sad)));
        assert_eq!(
            parse_input("hello"),
            Some(ConsoleInput::Unrecognized("hello".to_string()))
        );
    }

    #[test]
    fn test_react_targets_latest_poll() {
        let mut presenter = ConsolePresenter::new(Vec::new(), false);
        assert!(!presenter.react(&[1]));

        presenter.present(Directive::text("hello"));
        let poll = presenter.present(Directive::text("poll").with_reactions(POLL_MARKERS[..3].iter().copied()));
        assert!(presenter.react(&[1, 3]));

        let tallies = presenter.reactions(poll);
        let chosen: Vec<_> = tallies.iter().filter(|t| t.count > 0).map(|t| t.marker.as_str()).collect();
        assert_eq!(chosen, ["1️⃣", "3️⃣"]);

        presenter.delete(poll);
        assert!(presenter.reactions(poll).is_empty());
        assert!(!presenter.react(&[2]));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failures_are_not_fatal() {
        let mut presenter = ConsolePresenter::new(BrokenPipe, false);
        let poll = presenter.present(Directive::text("poll").with_reactions(POLL_MARKERS));
        assert!(presenter.react(&[1]));

        presenter.delete(poll);
        assert!(!presenter.react(&[1]));
        assert!(presenter.reactions(poll).is_empty());
    }

    #[tokio::test]
    async fn test_unread_answers_do_not_block_the_reader() {
        let (answers, mut responses) = response_channels(1);
        let (inputs, mut input_rx) = mpsc::channel(4);

        for _ in 0..3 {
            assert!(forward(ConsoleInput::Merge(MergeChoice::Replace), &answers, &inputs).await);
        }
        assert!(forward(ConsoleInput::Finish, &answers, &inputs).await);

        assert_eq!(responses.merge.try_recv(), Ok((CONSOLE_USER, MergeChoice::Replace)));
        assert!(responses.merge.try_recv().is_err());
        assert_eq!(input_rx.recv().await, Some(ConsoleInput::Finish));

        drop(responses);
        assert!(!forward(ConsoleInput::Mood(Mood::Sad), &answers, &inputs).await);
    }

    #[test]
    fn test_text_rendering() {
        let mut presenter = ConsolePresenter::new(Vec::new(), false);
        let panel = crate::directive::Panel::new("Queue", 0).field("🔊 Now Playing", "1. **A** by *B*");
        let id = presenter.present(Directive::panel(panel).with_reactions(["✅"]));
        assert_eq!(id, 1);

        let out = output(presenter);
        assert!(out.contains("== Queue =="));
        assert!(out.contains("-- 🔊 Now Playing --\n1. **A** by *B*"));
        assert!(out.contains("[message 1, react with: ✅]"));
    }

    #[test]
    fn test_json_rendering() {
        let mut presenter = ConsolePresenter::new(Vec::new(), true);
        presenter.present(Directive::text("⏸️ Paused."));
        presenter.delete(1);

        let out = output(presenter);
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["directive"]["text"], "⏸️ Paused.");
    }
}
