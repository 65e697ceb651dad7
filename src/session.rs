//! # Session Orchestrator
//!
//! A [`Session`] is one listening context: its queue, its playback state, and the
//! poll it is waiting on. It is the only part of the crate that talks to the
//! presentation layer, through a [`Presenter`], and the only part that waits.
//!
//! ## Recommendation Workflow
//!
//! 1. **Poll**: `poll` samples songs from the curated dataset and presents them with
//!    number markers. A newer poll supersedes the old one; its messages are deleted.
//! 2. **Selection**: `recommend` reads the user reactions on the poll message. Every
//!    marker with at least one user reaction selects its song. No selection is a
//!    notification, not an error.
//! 3. **Recommendation**: the selected songs are the seeds. Scoring runs on a
//!    blocking worker.
//! 4. **Merge decision**: the invoker answers append, replace or cancel. The wait is
//!    bounded; a timeout or a closed response channel cancels, and cancelling never
//!    touches the queue.
//!
//! ## Playback Events
//!
//! The driver reports a finished track through [`Session::playback_finished`]. The
//! session asks the [`PlaybackController`] whether that should advance the queue, and
//! if so moves the cursor and plays the next track.

use crate::commands::{self, Command, ParseError, COMMANDS};
use crate::config::RuntimeConfig;
use crate::directive::{colors, Directive, Panel};
use crate::playback::{
    FinishedAction, MetadataResolver, PlaybackController, PlaybackDriver, PlaybackError,
    PlaybackHandle, PlaybackState, ResolveError, ResolvedTrack,
};
use crate::queue::{PlaybackQueue, QueueError};
use crate::recommend::{Mood, Recommender};
use crate::track::{TrackRecord, TrackSource};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Markers shown next to poll entries, in order.
pub const POLL_MARKERS: [&str; 10] = ["1️⃣", "2️⃣", "3️⃣", "4️⃣", "5️⃣", "6️⃣", "7️⃣", "8️⃣", "9️⃣", "🔟"];

pub type UserId = u64;
pub type MessageId = u64;
pub type ContextId = u64;

/// User reactions of one kind on a message. `count` excludes the bot's own reaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionTally {
    pub marker: String,
    pub count: u32,
}

impl ReactionTally {
    #[must_use]
    pub fn new(marker: impl Into<String>, count: u32) -> Self {
        Self {
            marker: marker.into(),
            count,
        }
    }
}

/// The presentation layer as the session sees it.
pub trait Presenter: Send {
    /// Shows a directive and returns the id of the message it produced.
    fn present(&mut self, directive: Directive) -> MessageId;
    /// Deletes a message. Best effort: failures are the presenter's to log.
    fn delete(&mut self, message: MessageId);
    /// User reactions on a message.
    fn reactions(&self, message: MessageId) -> Vec<ReactionTally>;
}

/// Answer to "what should happen with these recommendations?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeChoice {
    Append,
    Replace,
    Cancel,
}

impl MergeChoice {
    pub const ALL: [MergeChoice; 3] = [Self::Append, Self::Replace, Self::Cancel];

    #[must_use]
    pub fn marker(self) -> &'static str {
        match self {
            Self::Append => "✅",
            Self::Replace => "🔁",
            Self::Cancel => "❌",
        }
    }

    #[must_use]
    pub fn from_marker(marker: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|choice| choice.marker() == marker)
    }

    /// Parses typed answers such as `add`, `replace` or `no`.
    #[must_use]
    pub fn from_word(word: &str) -> Option<Self> {
        match word.trim().to_lowercase().as_str() {
            "add" | "append" | "yes" | "y" => Some(Self::Append),
            "replace" | "r" => Some(Self::Replace),
            "cancel" | "no" | "n" => Some(Self::Cancel),
            other => Self::from_marker(other),
        }
    }
}

/// Receiving ends of the single-answer prompts.
#[derive(Debug)]
pub struct Responses {
    pub merge: mpsc::Receiver<(UserId, MergeChoice)>,
    pub mood: mpsc::Receiver<(UserId, Mood)>,
}

/// Sending ends, held by whatever reads user input.
#[derive(Debug, Clone)]
pub struct ResponseSenders {
    pub merge: mpsc::Sender<(UserId, MergeChoice)>,
    pub mood: mpsc::Sender<(UserId, Mood)>,
}

#[must_use]
pub fn response_channels(buffer: usize) -> (ResponseSenders, Responses) {
    let (merge_tx, merge_rx) = mpsc::channel(buffer);
    let (mood_tx, mood_rx) = mpsc::channel(buffer);
    (
        ResponseSenders {
            merge: merge_tx,
            mood: mood_tx,
        },
        Responses {
            merge: merge_rx,
            mood: mood_rx,
        },
    )
}

/// Who triggered a command, and from which message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    pub invoker: UserId,
    pub message: Option<MessageId>,
}

impl Invocation {
    #[must_use]
    pub fn new(invoker: UserId) -> Self {
        Self {
            invoker,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: MessageId) -> Self {
        self.message = Some(message);
        self
    }
}

/// The outstanding poll: what was offered and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSession {
    pub candidates: Vec<TrackRecord>,
    pub poll_message: MessageId,
    pub command_message: Option<MessageId>,
}

impl PollSession {
    /// Candidates whose marker collected at least one user reaction, in poll order.
    #[must_use]
    pub fn selected(&self, tallies: &[ReactionTally]) -> Vec<TrackRecord> {
        self.candidates
            .iter()
            .zip(POLL_MARKERS)
            .filter(|(_, marker)| {
                tallies
                    .iter()
                    .any(|tally| tally.marker == *marker && tally.count > 0)
            })
            .map(|(track, _)| track.clone())
            .collect()
    }

    /// Messages to delete when this poll is superseded.
    #[must_use]
    pub fn message_ids(&self) -> Vec<MessageId> {
        std::iter::once(self.poll_message)
            .chain(self.command_message)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub poll_size: usize,
    pub decision_timeout: Duration,
    pub mood_timeout: Duration,
    pub default_volume: u8,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&RuntimeConfig::default())
    }
}

impl From<&RuntimeConfig> for SessionSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            poll_size: config.poll_size.min(POLL_MARKERS.len()),
            decision_timeout: config.decision_timeout(),
            mood_timeout: config.mood_timeout(),
            default_volume: config.default_volume,
        }
    }
}

/// Everything a command can fail with. `Display` is the user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("There is no active poll. Run !poll first.")]
    NoActivePoll,
    #[error("You have not chosen any songs. Please react to the poll message with the corresponding emoji to choose a song.")]
    NothingSelected,
    #[error("No recommendations could be made from those songs. Run !poll to try different ones.")]
    NoRecommendations,
    #[error("No songs in the queue. First generate recommendations using !poll or !mood, or add a song with !add.")]
    EmptyQueue,
    #[error("Invalid index {index}, the queue has {len} songs.")]
    InvalidIndex { index: usize, len: usize },
    #[error("None of the songs in the queue could be played.")]
    NothingPlayable,
    #[error("Could not resolve that song: {0}")]
    Resolve(#[from] ResolveError),
    #[error("{0}")]
    Queue(QueueError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error("{0}")]
    Command(#[from] ParseError),
    #[error("A background task failed: {0}")]
    Worker(String),
}

impl From<QueueError> for SessionError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Empty => Self::EmptyQueue,
            QueueError::IndexOutOfRange { index, len } => Self::InvalidIndex {
                index: index + 1,
                len,
            },
            other => Self::Queue(other),
        }
    }
}

type SessionResult<T> = Result<T, SessionError>;

fn notice(e: &SessionError) -> Directive {
    Directive::text(format!("❌ {e}"))
}

fn song_line(track: &TrackRecord) -> String {
    format!("**{}** *by* {}", track.title(), track.artist())
}

fn numbered(tracks: &[TrackRecord], first: usize) -> String {
    tracks
        .iter()
        .enumerate()
        .map(|(i, track)| format!("{}. **{}** by *{}*", first + i, track.title(), track.artist()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs blocking work (dataset scans, resolver calls) off the async scheduler.
async fn run_blocking<T, F>(work: F) -> SessionResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SessionError::Worker(e.to_string()))
}

/// Resolves on a blocking worker; metadata lookups may hit the network.
async fn resolve(
    resolver: Arc<dyn MetadataResolver>,
    title: &str,
    artist: Option<&str>,
) -> SessionResult<ResolvedTrack> {
    let title = title.to_string();
    let artist = artist.filter(|a| !a.trim().is_empty()).map(str::to_string);
    let resolved = run_blocking(move || resolver.resolve(&title, artist.as_deref())).await??;
    Ok(resolved)
}

/// Links play as given, anything else goes through the resolver.
async fn query_record(resolver: Arc<dyn MetadataResolver>, query: &str) -> SessionResult<TrackRecord> {
    let query = query.trim();
    if query.starts_with("https://") || query.starts_with("http://") {
        return Ok(TrackRecord::new(query, "", TrackSource::DirectUrl).with_locator(query));
    }
    Ok(resolve(resolver, query, None)
        .await?
        .into_record(TrackSource::ExternalQuery))
}

async fn locate(resolver: Arc<dyn MetadataResolver>, track: &TrackRecord) -> SessionResult<String> {
    if let Some(locator) = track.locator() {
        return Ok(locator.to_string());
    }
    Ok(resolve(resolver, track.title(), Some(track.artist())).await?.locator)
}

/// Drops answers that arrived before the prompt they would answer was shown.
fn discard_stale<T>(answers: &mut mpsc::Receiver<(UserId, T)>) {
    let mut stale = 0;
    while answers.try_recv().is_ok() {
        stale += 1;
    }
    if stale > 0 {
        debug!("Discarded {stale} stale answers");
    }
}

/// Waits for the first answer from `invoker`. `None` on timeout or a closed channel.
///
/// Call [`discard_stale`] before showing the prompt, so only answers given after it
/// count.
async fn wait_for_answer<T>(
    answers: &mut mpsc::Receiver<(UserId, T)>,
    invoker: UserId,
    limit: Duration,
) -> Option<T> {
    let from_invoker = async {
        while let Some((user, answer)) = answers.recv().await {
            if user == invoker {
                return Some(answer);
            }
            debug!("Ignoring answer from user {user}, waiting for {invoker}");
        }
        None
    };

    match timeout(limit, from_invoker).await {
        Ok(answer) => answer,
        Err(_) => {
            info!("No answer from user {invoker} within {}s", limit.as_secs());
            None
        }
    }
}

/// One listening context.
pub struct Session {
    recommender: Recommender,
    resolver: Arc<dyn MetadataResolver>,
    queue: PlaybackQueue,
    player: PlaybackController,
    poll: Option<PollSession>,
    settings: SessionSettings,
    rng: StdRng,
}

impl Session {
    #[must_use]
    pub fn new(
        recommender: Recommender,
        resolver: Arc<dyn MetadataResolver>,
        driver: Box<dyn PlaybackDriver>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            recommender,
            resolver,
            queue: PlaybackQueue::new(),
            player: PlaybackController::new(driver, settings.default_volume),
            poll: None,
            settings,
            rng: StdRng::from_entropy(),
        }
    }

    /// Makes polls, shuffles and recommendations reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub fn player(&self) -> &PlaybackController {
        &self.player
    }

    pub fn poll(&self) -> Option<&PollSession> {
        self.poll.as_ref()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Entry point of the command router: parses `name args..` and handles it.
    pub async fn trigger(
        &mut self,
        name: &str,
        args: &[String],
        invocation: Invocation,
        presenter: &mut dyn Presenter,
        responses: &mut Responses,
    ) {
        match commands::parse(name, args) {
            Ok(command) => self.handle(command, invocation, presenter, responses).await,
            Err(e) => {
                debug!("Rejected command '{name}': {e}");
                presenter.present(notice(&e.into()));
            }
        }
    }

    /// Handles a parsed command. Failures are presented as notifications.
    pub async fn handle(
        &mut self,
        command: Command,
        invocation: Invocation,
        presenter: &mut dyn Presenter,
        responses: &mut Responses,
    ) {
        debug!("Handling {command:?} from user {}", invocation.invoker);
        if let Err(e) = self.dispatch(command, invocation, presenter, responses).await {
            info!("Command failed: {e}");
            presenter.present(notice(&e));
        }
    }

    async fn dispatch(
        &mut self,
        command: Command,
        invocation: Invocation,
        presenter: &mut dyn Presenter,
        responses: &mut Responses,
    ) -> SessionResult<()> {
        let reply = match command {
            Command::Poll => {
                for message in self.start_poll(invocation.message, presenter) {
                    presenter.delete(message);
                }
                return Ok(());
            }
            Command::Recommend => {
                return self
                    .recommend_from_poll(invocation.invoker, presenter, &mut responses.merge)
                    .await
            }
            Command::Mood => {
                return self
                    .recommend_by_mood(invocation.invoker, presenter, &mut responses.mood)
                    .await
            }
            Command::Play(query) => return self.play_query(&query, presenter).await,
            Command::Add(query) => return self.add_query(&query, presenter).await,
            Command::Next => {
                self.queue.next()?;
                return self.play_current(presenter).await;
            }
            Command::Previous => {
                self.queue.previous()?;
                return self.play_current(presenter).await;
            }
            Command::Remove(position) => return self.remove(position, presenter).await,
            Command::RemoveTitle(title) => return self.remove_title(&title, presenter).await,
            Command::Help => help_directive(),
            Command::Pause => {
                self.player.pause()?;
                Directive::text("⏸️ Paused.")
            }
            Command::Resume => {
                self.player.resume()?;
                Directive::text("▶️ Resumed.")
            }
            Command::Stop => {
                self.player.stop()?;
                Directive::text("⏹️ Stopped.")
            }
            Command::NowPlaying => {
                let current = self.queue.current()?;
                match self.player.state() {
                    PlaybackState::Playing => Directive::text(format!("🎵 Now playing: {current}")),
                    PlaybackState::Paused => Directive::text(format!("⏸️ Paused: {current}")),
                    PlaybackState::Stopped => Directive::text(format!("🎵 Up next: {current}")),
                }
            }
            Command::Volume(volume) => {
                let volume = self.player.set_volume(volume)?;
                Directive::text(format!("🔊 Volume set to {volume}%."))
            }
            Command::Queue => self.queue_directive(),
            Command::Clear => {
                self.queue.clear();
                Directive::text("🗑️ Queue cleared.")
            }
            Command::Shuffle => {
                self.queue.shuffle(&mut self.rng);
                Directive::text("🔀 Playlist shuffled.")
            }
            Command::Move { from, to } => {
                let len = self.queue.len();
                for position in [from, to] {
                    if position == 0 || position > len {
                        return Err(SessionError::InvalidIndex {
                            index: position,
                            len,
                        });
                    }
                }
                self.queue.move_by_index(from - 1, to - 1)?;
                Directive::text(format!("✅ Moved song from position {from} to {to}."))
            }
            Command::MoveTitle { title, position } => {
                self.queue.move_song(&title, position)?;
                Directive::text(format!("✅ Moved **{title}** to position {position}."))
            }
        };
        presenter.present(reply);
        Ok(())
    }

    /// Presents a new poll and returns the message ids of the poll it replaces.
    pub fn start_poll(
        &mut self,
        command_message: Option<MessageId>,
        presenter: &mut dyn Presenter,
    ) -> Vec<MessageId> {
        let superseded = self
            .poll
            .take()
            .map(|old| old.message_ids())
            .unwrap_or_default();

        let size = self.settings.poll_size.min(POLL_MARKERS.len());
        let candidates = self.recommender.store().sample_curated(size, &mut self.rng);
        if candidates.is_empty() {
            presenter.present(Directive::text(
                "❌ No songs are available for a poll. Check that the song dataset is loaded.",
            ));
            return superseded;
        }

        let mut body = String::from("Please react to this message with your preferences:\n\n");
        for (marker, track) in POLL_MARKERS.iter().zip(&candidates) {
            body.push_str(&format!("{marker} {}\n", song_line(track)));
        }
        body.push_str("\n*If you don't like any of the songs, you may run the command again to get new songs*\n");
        body.push_str("\n**Once you have chosen your songs, run the !recommend command to get your recommendations**");

        let directive = Directive::panel(Panel::new("Song Poll", colors::POLL).body(body))
            .with_reactions(POLL_MARKERS[..candidates.len()].iter().copied());
        let poll_message = presenter.present(directive);

        info!("Started poll {poll_message} with {} songs", candidates.len());
        self.poll = Some(PollSession {
            candidates,
            poll_message,
            command_message,
        });
        superseded
    }

    async fn recommend_from_poll(
        &mut self,
        invoker: UserId,
        presenter: &mut dyn Presenter,
        answers: &mut mpsc::Receiver<(UserId, MergeChoice)>,
    ) -> SessionResult<()> {
        let poll = self.poll.take().ok_or(SessionError::NoActivePoll)?;
        let tallies = presenter.reactions(poll.poll_message);
        let selected = poll.selected(&tallies);

        if selected.is_empty() {
            presenter.present(notice(&SessionError::NothingSelected));
            return Ok(());
        }

        let chosen = selected
            .iter()
            .map(song_line)
            .collect::<Vec<_>>()
            .join("\n");
        presenter.present(Directive::panel(
            Panel::new("Chosen Songs", colors::CHOSEN)
                .body(format!("You have chosen the following songs:\n\n{chosen}")),
        ));

        let recommendations = self.recommend(selected).await?;
        if recommendations.is_empty() {
            warn!("Poll {} produced no recommendations", poll.poll_message);
            presenter.present(notice(&SessionError::NoRecommendations));
            return Ok(());
        }

        let listed = recommendations
            .iter()
            .map(song_line)
            .collect::<Vec<_>>()
            .join("\n");
        discard_stale(answers);
        presenter.present(
            Directive::panel(Panel::new("Recommendations", colors::RECOMMENDATIONS).body(format!(
                "Here are some songs you may like based on your preferences:\n\n{listed}"
            )))
            .with_reactions(MergeChoice::ALL.map(MergeChoice::marker)),
        );
        presenter.present(Directive::text(format!(
            "Would you like to add these songs to the queue? {} add, {} replace the queue, {} cancel ({}s to answer)",
            MergeChoice::Append.marker(),
            MergeChoice::Replace.marker(),
            MergeChoice::Cancel.marker(),
            self.settings.decision_timeout.as_secs()
        )));

        match wait_for_answer(answers, invoker, self.settings.decision_timeout).await {
            Some(choice) => self.apply_merge(choice, recommendations, presenter).await,
            None => {
                presenter.present(Directive::text(
                    "⌛ No answer in time. The queue was left unchanged.",
                ));
                Ok(())
            }
        }
    }

    /// Applies a merge decision. `Cancel` never touches the queue.
    pub async fn apply_merge(
        &mut self,
        choice: MergeChoice,
        tracks: Vec<TrackRecord>,
        presenter: &mut dyn Presenter,
    ) -> SessionResult<()> {
        let count = tracks.len();
        match choice {
            MergeChoice::Cancel => {
                presenter.present(Directive::text("❌ Cancelled. The queue was left unchanged."));
                Ok(())
            }
            MergeChoice::Append => {
                let was_empty = self.queue.is_empty();
                self.queue.add(tracks);
                presenter.present(Directive::text(format!("✅ Added {count} songs to the queue.")));
                if was_empty {
                    self.play_current(presenter).await
                } else {
                    Ok(())
                }
            }
            MergeChoice::Replace => {
                self.queue.clear();
                self.queue.add(tracks);
                presenter.present(Directive::text(format!(
                    "🔁 Replaced the queue with {count} songs."
                )));
                self.play_current(presenter).await
            }
        }
    }

    async fn recommend_by_mood(
        &mut self,
        invoker: UserId,
        presenter: &mut dyn Presenter,
        answers: &mut mpsc::Receiver<(UserId, Mood)>,
    ) -> SessionResult<()> {
        let options = Mood::ALL
            .iter()
            .map(|mood| format!("{} - {}", mood.marker(), mood.label()))
            .collect::<Vec<_>>()
            .join("\n");
        discard_stale(answers);
        presenter.present(
            Directive::panel(Panel::new("Choose Your Mood", colors::MOOD).body(format!(
                "React with the corresponding emoji to select your mood:\n\n{options}"
            )))
            .with_reactions(Mood::ALL.map(Mood::marker)),
        );

        let Some(mood) = wait_for_answer(answers, invoker, self.settings.mood_timeout).await else {
            presenter.present(Directive::text(
                "You took too long to respond! Please try again.",
            ));
            return Ok(());
        };
        presenter.present(Directive::text(format!("You selected: {}", mood.label())));

        let recommender = self.recommender.clone();
        let tracks = run_blocking(move || recommender.recommend_by_mood(mood)).await?;
        if tracks.is_empty() {
            presenter.present(Directive::text("No songs found for the selected mood."));
            return Ok(());
        }

        self.queue.clear();
        self.queue.add(tracks);
        self.play_current(presenter).await
    }

    /// Seed-based recommendation on a blocking worker. The shuffle seed comes from the
    /// session's generator.
    async fn recommend(&mut self, seeds: Vec<TrackRecord>) -> SessionResult<Vec<TrackRecord>> {
        let recommender = self.recommender.clone();
        let shuffle_seed: u64 = self.rng.gen();
        run_blocking(move || {
            let mut rng = StdRng::seed_from_u64(shuffle_seed);
            recommender
                .recommend_scored(&seeds, &mut rng)
                .into_iter()
                .map(|scored| scored.track)
                .collect()
        })
        .await
    }

    /// Plays the track at the cursor. Tracks that cannot be resolved are skipped.
    async fn play_current(&mut self, presenter: &mut dyn Presenter) -> SessionResult<()> {
        for _ in 0..self.queue.len() {
            let track = self.queue.current()?.clone();
            match locate(Arc::clone(&self.resolver), &track).await {
                Ok(locator) => {
                    self.player.play(&locator)?;
                    presenter.present(Directive::text(format!("🎵 Now playing: {track}")));
                    return Ok(());
                }
                Err(e) => {
                    warn!("Skipping '{track}': {e}");
                    presenter.present(Directive::text(format!("⚠️ Skipping {track}: {e}")));
                    self.queue.next()?;
                }
            }
        }
        if self.queue.is_empty() {
            Err(SessionError::EmptyQueue)
        } else {
            Err(SessionError::NothingPlayable)
        }
    }

    async fn play_query(&mut self, query: &str, presenter: &mut dyn Presenter) -> SessionResult<()> {
        let record = query_record(Arc::clone(&self.resolver), query).await?;
        self.queue.clear();
        self.queue.add([record]);
        self.play_current(presenter).await
    }

    async fn add_query(&mut self, query: &str, presenter: &mut dyn Presenter) -> SessionResult<()> {
        let record = query_record(Arc::clone(&self.resolver), query).await?;
        presenter.present(Directive::text(format!("✅ Added {record} to the queue.")));
        self.queue.add([record]);
        Ok(())
    }

    async fn remove(&mut self, position: usize, presenter: &mut dyn Presenter) -> SessionResult<()> {
        if self.queue.is_empty() {
            return Err(SessionError::EmptyQueue);
        }
        let len = self.queue.len();
        let index = position
            .checked_sub(1)
            .filter(|index| *index < len)
            .ok_or(SessionError::InvalidIndex { index: position, len })?;

        let was_current = index == self.queue.cursor();
        let removed = self.queue.remove_at(index)?;
        self.after_removal(&removed, was_current, presenter).await
    }

    async fn remove_title(&mut self, title: &str, presenter: &mut dyn Presenter) -> SessionResult<()> {
        let was_current = self.queue.position_of(title) == Some(self.queue.cursor());
        let removed = self.queue.remove_by_title(title)?;
        self.after_removal(&removed, was_current, presenter).await
    }

    /// Announces a removal and keeps playback on the current entry.
    async fn after_removal(
        &mut self,
        removed: &TrackRecord,
        was_current: bool,
        presenter: &mut dyn Presenter,
    ) -> SessionResult<()> {
        presenter.present(Directive::text(format!(
            "✅ Removed **{}** by *{}* from the queue.",
            removed.title(),
            removed.artist()
        )));

        if was_current && self.player.state() != PlaybackState::Stopped {
            if self.queue.is_empty() {
                self.player.stop()?;
            } else {
                self.play_current(presenter).await?;
            }
        }
        Ok(())
    }

    /// Driver callback: the track behind `handle` ended.
    pub async fn playback_finished(&mut self, handle: PlaybackHandle, presenter: &mut dyn Presenter) {
        if self.player.on_finished(handle) == FinishedAction::Ignore {
            return;
        }
        let advanced = match self.queue.next() {
            Ok(_) => self.play_current(presenter).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = advanced {
            warn!("Could not continue playback after {handle}: {e}");
            presenter.present(notice(&e));
        }
    }

    fn queue_directive(&self) -> Directive {
        let (played, current, upcoming) = self.queue.sections();
        let Some(current) = current else {
            return Directive::text("🎵 The queue is currently empty.");
        };
        let cursor = self.queue.cursor();

        let mut panel = Panel::new("🎶 Current Song Queue 🎶", colors::QUEUE);
        if !played.is_empty() {
            panel = panel.field("✅ Already Played", numbered(played, 1));
        }
        panel = panel.field(
            "🔊 Now Playing",
            format!("{}. **{}** by *{}*", cursor + 1, current.title(), current.artist()),
        );
        if !upcoming.is_empty() {
            panel = panel.field("🎧 Up Next", numbered(upcoming, cursor + 2));
        }
        Directive::panel(panel)
    }
}

fn help_directive() -> Directive {
    let body = COMMANDS
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    Directive::panel(
        Panel::new("Commands", colors::HELP)
            .body(format!("To run a command, type {}command_name\n\n{body}", commands::PREFIX)),
    )
}

pub type SharedSession = Arc<tokio::sync::Mutex<Session>>;

type SessionFactory = Box<dyn Fn(ContextId) -> Session + Send + Sync>;

/// One [`Session`] per listening context, created on first use.
pub struct SessionRegistry {
    factory: SessionFactory,
    sessions: Mutex<HashMap<ContextId, SharedSession>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(ContextId) -> Session + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, context: ContextId) -> SharedSession {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(sessions.entry(context).or_insert_with(|| {
            debug!("Creating session for context {context}");
            Arc::new(tokio::sync::Mutex::new((self.factory)(context)))
        }))
    }

    pub fn get(&self, context: ContextId) -> Option<SharedSession> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&context)
            .cloned()
    }

    /// Drops a context's session, e.g. when the bot leaves its voice channel.
    pub fn remove(&self, context: ContextId) -> Option<SharedSession> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&context)
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::fixtures::*;
    use crate::attributes::AttributeStore;
    use crate::playback::{DatasetResolver, DriverEvent, RecordingDriver};

    /// Records messages. Queued answers are sent when the matching prompt is shown,
    /// the way a user answers after seeing it.
    #[derive(Default)]
    struct TestPresenter {
        sent: Vec<(MessageId, Directive)>,
        deleted: Vec<MessageId>,
        reactions: HashMap<MessageId, Vec<ReactionTally>>,
        next_id: MessageId,
        answers: Option<ResponseSenders>,
        merge_replies: Vec<(UserId, MergeChoice)>,
        mood_replies: Vec<(UserId, Mood)>,
    }

    impl Presenter for TestPresenter {
        fn present(&mut self, directive: Directive) -> MessageId {
            self.next_id += 1;
            if let Some(answers) = &self.answers {
                if directive.reactions == MergeChoice::ALL.map(MergeChoice::marker) {
                    for reply in self.merge_replies.drain(..) {
                        answers.merge.try_send(reply).unwrap();
                    }
                }
                if directive.reactions == Mood::ALL.map(Mood::marker) {
                    for reply in self.mood_replies.drain(..) {
                        answers.mood.try_send(reply).unwrap();
                    }
                }
            }
            self.sent.push((self.next_id, directive));
            self.next_id
        }

        fn delete(&mut self, message: MessageId) {
            self.deleted.push(message);
        }

        fn reactions(&self, message: MessageId) -> Vec<ReactionTally> {
            self.reactions.get(&message).cloned().unwrap_or_default()
        }
    }

    impl TestPresenter {
        fn answering(answers: ResponseSenders) -> Self {
            Self {
                answers: Some(answers),
                ..Self::default()
            }
        }

        fn last_text(&self) -> &str {
            self.sent
                .iter()
                .rev()
                .find_map(|(_, d)| d.text.as_deref())
                .unwrap_or("")
        }

        fn panel_titles(&self) -> Vec<&str> {
            self.sent
                .iter()
                .filter_map(|(_, d)| d.panel.as_ref().map(|p| p.title.as_str()))
                .collect()
        }
    }

    fn test_store() -> Arc<AttributeStore> {
        let mut general = Vec::new();
        for i in 0..14 {
            let w = f64::from(i) / 14.0;
            general.push(general_line(&format!("Pop {i}"), "Band", "pop", &[1.0 - w, w, 0.2]));
        }
        general.push(general_line("Sunny", "Band", "pop", &[0.9]));
        let curated = curated_csv(&[
            ("Pop 0", "Band", [1.0; 9]),
            ("Pop 1", "Band", [2.0; 9]),
            ("Pop 2", "Band", [3.0; 9]),
        ]);
        Arc::new(store(&general_csv(&general), &curated))
    }

    fn session() -> (Session, Arc<std::sync::Mutex<Vec<DriverEvent>>>) {
        let store = test_store();
        let driver = RecordingDriver::new();
        let events = driver.events();
        let session = Session::new(
            Recommender::new(Arc::clone(&store)),
            Arc::new(DatasetResolver::new(store)),
            Box::new(driver),
            SessionSettings::default(),
        )
        .with_seed(17);
        (session, events)
    }

    const USER: UserId = 1;

    async fn run(
        session: &mut Session,
        command: Command,
        presenter: &mut TestPresenter,
        responses: &mut Responses,
    ) {
        session
            .handle(command, Invocation::new(USER), presenter, responses)
            .await;
    }

    async fn poll_and_react(session: &mut Session, presenter: &mut TestPresenter, responses: &mut Responses) {
        run(session, Command::Poll, presenter, responses).await;
        let poll_message = session.poll().expect("poll started").poll_message;
        presenter
            .reactions
            .insert(poll_message, vec![ReactionTally::new("1️⃣", 1), ReactionTally::new("3️⃣", 0)]);
    }

    #[tokio::test]
    async fn test_poll_presents_markers_for_each_candidate() {
        let (mut session, _) = session();
        let (_tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::default();

        run(&mut session, Command::Poll, &mut presenter, &mut responses).await;

        let poll = session.poll().expect("poll started");
        assert_eq!(poll.candidates.len(), 3);
        let (id, directive) = &presenter.sent[0];
        assert_eq!(*id, poll.poll_message);
        assert_eq!(directive.panel.as_ref().unwrap().title, "Song Poll");
        assert_eq!(directive.reactions, ["1️⃣", "2️⃣", "3️⃣"]);
    }

    #[tokio::test]
    async fn test_new_poll_supersedes_previous_one() {
        let (mut session, _) = session();
        let (_tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::default();

        session
            .handle(Command::Poll, Invocation::new(USER).with_message(100), &mut presenter, &mut responses)
            .await;
        let first = session.poll().unwrap().poll_message;

        session
            .handle(Command::Poll, Invocation::new(USER).with_message(200), &mut presenter, &mut responses)
            .await;

        assert_eq!(presenter.deleted, vec![first, 100]);
        assert_eq!(session.poll().unwrap().command_message, Some(200));
    }

    #[tokio::test]
    async fn test_recommend_without_poll_asks_for_one() {
        let (mut session, _) = session();
        let (_tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::default();

        run(&mut session, Command::Recommend, &mut presenter, &mut responses).await;
        assert!(presenter.last_text().contains("Run !poll first"));
    }

    #[tokio::test]
    async fn test_no_selection_is_a_notification_and_clears_the_poll() {
        let (mut session, _) = session();
        let (_tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::default();

        run(&mut session, Command::Poll, &mut presenter, &mut responses).await;
        run(&mut session, Command::Recommend, &mut presenter, &mut responses).await;

        assert!(presenter.last_text().contains("You have not chosen any songs"));
        assert!(session.poll().is_none());
        assert!(session.queue().is_empty());
    }

    #[tokio::test]
    async fn test_recommend_then_append_fills_queue_and_plays() {
        let (mut session, events) = session();
        let (tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::answering(tx);

        poll_and_react(&mut session, &mut presenter, &mut responses).await;
        presenter.merge_replies.push((USER, MergeChoice::Append));
        run(&mut session, Command::Recommend, &mut presenter, &mut responses).await;

        let titles = presenter.panel_titles();
        assert!(titles.contains(&"Chosen Songs"));
        assert!(titles.contains(&"Recommendations"));
        let recommendations = presenter
            .sent
            .iter()
            .find(|(_, d)| d.panel.as_ref().is_some_and(|p| p.title == "Recommendations"))
            .map(|(_, d)| d.clone())
            .unwrap();
        assert_eq!(recommendations.reactions, ["✅", "🔁", "❌"]);

        assert_eq!(session.queue().len(), 10);
        assert_eq!(session.player().state(), PlaybackState::Playing);
        assert!(matches!(events.lock().unwrap()[0], DriverEvent::Play(_, _)));
        assert!(presenter.last_text().starts_with("🎵 Now playing"));
    }

    #[tokio::test]
    async fn test_replace_swaps_the_queue() {
        let (mut session, _) = session();
        let (tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::answering(tx);

        session
            .apply_merge(MergeChoice::Append, vec![TrackRecord::from_dataset("Old", "Band")], &mut presenter)
            .await
            .unwrap();

        poll_and_react(&mut session, &mut presenter, &mut responses).await;
        presenter.merge_replies.push((USER, MergeChoice::Replace));
        run(&mut session, Command::Recommend, &mut presenter, &mut responses).await;

        assert_eq!(session.queue().len(), 10);
        assert!(session.queue().entries().iter().all(|t| t.title() != "Old"));
        assert_eq!(session.queue().cursor(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decision_timeout_leaves_queue_untouched() {
        let (mut session, _) = session();
        let (_tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::default();

        session
            .apply_merge(MergeChoice::Append, vec![TrackRecord::from_dataset("Existing", "Band")], &mut presenter)
            .await
            .unwrap();

        poll_and_react(&mut session, &mut presenter, &mut responses).await;
        run(&mut session, Command::Recommend, &mut presenter, &mut responses).await;

        assert!(presenter.last_text().contains("No answer in time"));
        assert_eq!(session.queue().len(), 1);
        assert_eq!(session.queue().entries()[0].title(), "Existing");
    }

    #[tokio::test]
    async fn test_closed_response_channel_cancels() {
        let (mut session, _) = session();
        let (tx, mut responses) = response_channels(4);
        drop(tx);
        let mut presenter = TestPresenter::default();

        poll_and_react(&mut session, &mut presenter, &mut responses).await;
        run(&mut session, Command::Recommend, &mut presenter, &mut responses).await;

        assert!(session.queue().is_empty());
        assert!(presenter.last_text().contains("No answer in time"));
    }

    #[tokio::test]
    async fn test_answers_from_other_users_are_ignored() {
        let (mut session, _) = session();
        let (tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::answering(tx);

        poll_and_react(&mut session, &mut presenter, &mut responses).await;
        presenter.merge_replies.push((USER + 1, MergeChoice::Append));
        presenter.merge_replies.push((USER, MergeChoice::Cancel));
        run(&mut session, Command::Recommend, &mut presenter, &mut responses).await;

        assert!(session.queue().is_empty());
        assert!(presenter.last_text().contains("Cancelled"));
    }

    #[tokio::test]
    async fn test_mood_selection_fills_queue() {
        let (mut session, _) = session();
        let (tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::answering(tx);

        presenter.mood_replies.push((USER, Mood::Happy));
        run(&mut session, Command::Mood, &mut presenter, &mut responses).await;

        assert!(presenter.panel_titles().contains(&"Choose Your Mood"));
        assert_eq!(presenter.sent[0].1.reactions.len(), 5);
        assert_eq!(session.queue().len(), 1);
        assert_eq!(session.queue().entries()[0].title(), "Sunny");
        assert_eq!(session.player().state(), PlaybackState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_answer_does_not_decide_the_next_prompt() {
        let (mut session, _) = session();
        let (tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::default();

        session
            .apply_merge(MergeChoice::Append, vec![TrackRecord::from_dataset("Mine", "Band")], &mut presenter)
            .await
            .unwrap();

        poll_and_react(&mut session, &mut presenter, &mut responses).await;
        run(&mut session, Command::Recommend, &mut presenter, &mut responses).await;
        assert!(presenter.last_text().contains("No answer in time"));

        // arrives after the prompt timed out
        tx.merge.send((USER, MergeChoice::Replace)).await.unwrap();
        tx.mood.send((USER, Mood::Happy)).await.unwrap();

        poll_and_react(&mut session, &mut presenter, &mut responses).await;
        run(&mut session, Command::Recommend, &mut presenter, &mut responses).await;
        assert!(presenter.last_text().contains("No answer in time"));

        run(&mut session, Command::Mood, &mut presenter, &mut responses).await;
        assert_eq!(presenter.last_text(), "You took too long to respond! Please try again.");

        let titles: Vec<_> = session.queue().entries().iter().map(TrackRecord::title).collect();
        assert_eq!(titles, ["Mine"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mood_timeout() {
        let (mut session, _) = session();
        let (_tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::default();

        run(&mut session, Command::Mood, &mut presenter, &mut responses).await;
        assert_eq!(presenter.last_text(), "You took too long to respond! Please try again.");
        assert!(session.queue().is_empty());
    }

    #[tokio::test]
    async fn test_play_clears_queue_and_plays_query() {
        let (mut session, events) = session();
        let (_tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::default();

        run(&mut session, Command::Add("Pop 3".into()), &mut presenter, &mut responses).await;
        run(&mut session, Command::Play("pop 1".into()), &mut presenter, &mut responses).await;

        assert_eq!(session.queue().len(), 1);
        let current = session.queue().current().unwrap();
        assert_eq!(current.title(), "Pop 1");
        assert_eq!(current.source(), TrackSource::ExternalQuery);
        assert_eq!(
            events.lock().unwrap()[0],
            DriverEvent::Play("ytsearch:Pop 1 Band".to_string(), PlaybackHandle(1))
        );
    }

    #[tokio::test]
    async fn test_stop_then_finished_does_not_advance() {
        let (mut session, _) = session();
        let (_tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::default();

        session
            .apply_merge(
                MergeChoice::Replace,
                vec![TrackRecord::from_dataset("Pop 0", "Band"), TrackRecord::from_dataset("Pop 1", "Band")],
                &mut presenter,
            )
            .await
            .unwrap();
        let handle = session.player().handle().unwrap();

        run(&mut session, Command::Stop, &mut presenter, &mut responses).await;
        session.playback_finished(handle, &mut presenter).await;

        assert_eq!(session.queue().cursor(), 0);
        assert_eq!(session.player().state(), PlaybackState::Stopped);
    }

    #[tokio::test]
    async fn test_finished_track_advances_with_wraparound() {
        let (mut session, _) = session();
        let mut presenter = TestPresenter::default();

        session
            .apply_merge(
                MergeChoice::Replace,
                vec![TrackRecord::from_dataset("Pop 0", "Band"), TrackRecord::from_dataset("Pop 1", "Band")],
                &mut presenter,
            )
            .await
            .unwrap();

        let first = session.player().handle().unwrap();
        session.playback_finished(first, &mut presenter).await;
        assert_eq!(session.queue().current().unwrap().title(), "Pop 1");

        let second = session.player().handle().unwrap();
        session.playback_finished(second, &mut presenter).await;
        assert_eq!(session.queue().current().unwrap().title(), "Pop 0");
        assert_eq!(session.player().state(), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_removing_the_playing_track_plays_the_next_one() {
        let (mut session, _) = session();
        let (_tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::default();

        session
            .apply_merge(
                MergeChoice::Replace,
                vec![TrackRecord::from_dataset("Pop 0", "Band"), TrackRecord::from_dataset("Pop 1", "Band")],
                &mut presenter,
            )
            .await
            .unwrap();
        let before = session.player().handle();

        run(&mut session, Command::Remove(1), &mut presenter, &mut responses).await;

        assert_eq!(session.queue().current().unwrap().title(), "Pop 1");
        assert_ne!(session.player().handle(), before);
        assert_eq!(session.player().state(), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_remove_by_title() {
        let (mut session, _) = session();
        let (_tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::default();

        session
            .apply_merge(
                MergeChoice::Replace,
                ["Pop 0", "Pop 1", "Pop 2"].map(|t| TrackRecord::from_dataset(t, "Band")).to_vec(),
                &mut presenter,
            )
            .await
            .unwrap();
        let before = session.player().handle();

        run(&mut session, Command::RemoveTitle("pop 2".into()), &mut presenter, &mut responses).await;
        assert_eq!(presenter.last_text(), "✅ Removed **Pop 2** by *Band* from the queue.");
        assert_eq!(session.player().handle(), before);

        run(&mut session, Command::RemoveTitle("POP 0".into()), &mut presenter, &mut responses).await;
        assert_eq!(session.queue().current().unwrap().title(), "Pop 1");
        assert_ne!(session.player().handle(), before);

        run(&mut session, Command::RemoveTitle("Umbrella".into()), &mut presenter, &mut responses).await;
        assert!(presenter.last_text().contains("'Umbrella' is not in the queue"));
        assert_eq!(session.queue().len(), 1);
    }

    #[tokio::test]
    async fn test_links_play_without_resolving() {
        let (mut session, events) = session();
        let (_tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::default();

        let link = "https://example.invalid/pop-1-live";
        run(&mut session, Command::Play(link.into()), &mut presenter, &mut responses).await;

        let current = session.queue().current().unwrap();
        assert_eq!(current.source(), TrackSource::DirectUrl);
        assert_eq!(current.locator(), Some(link));
        assert_eq!(
            events.lock().unwrap()[0],
            DriverEvent::Play(link.to_string(), PlaybackHandle(1))
        );
        assert_eq!(presenter.last_text(), format!("🎵 Now playing: {link}"));
    }

    #[tokio::test]
    async fn test_queue_commands_and_errors() {
        let (mut session, _) = session();
        let (_tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::default();

        run(&mut session, Command::Next, &mut presenter, &mut responses).await;
        assert!(presenter.last_text().contains("No songs in the queue"));

        run(&mut session, Command::Queue, &mut presenter, &mut responses).await;
        assert_eq!(presenter.last_text(), "🎵 The queue is currently empty.");

        for title in ["Pop 0", "Pop 1", "Pop 2"] {
            run(&mut session, Command::Add(title.into()), &mut presenter, &mut responses).await;
        }
        run(&mut session, Command::Move { from: 3, to: 1 }, &mut presenter, &mut responses).await;
        let titles: Vec<_> = session.queue().entries().iter().map(TrackRecord::title).collect();
        assert_eq!(titles, ["Pop 2", "Pop 0", "Pop 1"]);

        run(&mut session, Command::Remove(4), &mut presenter, &mut responses).await;
        assert!(presenter.last_text().contains("Invalid index 4, the queue has 3 songs"));

        run(
            &mut session,
            Command::MoveTitle { title: "Pop 2".into(), position: 0 },
            &mut presenter,
            &mut responses,
        )
        .await;
        assert!(presenter.last_text().contains("position 0 is invalid"));

        run(&mut session, Command::Pause, &mut presenter, &mut responses).await;
        assert!(presenter.last_text().contains("not playing anything"));

        run(&mut session, Command::Volume(120), &mut presenter, &mut responses).await;
        assert!(presenter.last_text().contains("between 0 and 100"));
    }

    #[tokio::test]
    async fn test_queue_panel_sections() {
        let (mut session, _) = session();
        let (_tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::default();

        session
            .apply_merge(
                MergeChoice::Replace,
                ["Pop 0", "Pop 1", "Pop 2"].map(|t| TrackRecord::from_dataset(t, "Band")).to_vec(),
                &mut presenter,
            )
            .await
            .unwrap();
        run(&mut session, Command::Next, &mut presenter, &mut responses).await;
        run(&mut session, Command::Queue, &mut presenter, &mut responses).await;

        let panel = presenter.sent.last().unwrap().1.panel.clone().unwrap();
        let names: Vec<_> = panel.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["✅ Already Played", "🔊 Now Playing", "🎧 Up Next"]);
        assert_eq!(panel.fields[0].value, "1. **Pop 0** by *Band*");
        assert_eq!(panel.fields[1].value, "2. **Pop 1** by *Band*");
        assert_eq!(panel.fields[2].value, "3. **Pop 2** by *Band*");
    }

    #[tokio::test]
    async fn test_trigger_reports_parse_errors() {
        let (mut session, _) = session();
        let (_tx, mut responses) = response_channels(4);
        let mut presenter = TestPresenter::default();

        session
            .trigger("dance", &[], Invocation::new(USER), &mut presenter, &mut responses)
            .await;
        assert!(presenter.last_text().contains("unknown command 'dance'"));

        session
            .trigger("help", &[], Invocation::new(USER), &mut presenter, &mut responses)
            .await;
        assert_eq!(presenter.panel_titles(), ["Commands"]);
    }

    #[test]
    fn test_merge_choice_parsing() {
        assert_eq!(MergeChoice::from_word("ADD"), Some(MergeChoice::Append));
        assert_eq!(MergeChoice::from_word("replace"), Some(MergeChoice::Replace));
        assert_eq!(MergeChoice::from_word("no"), Some(MergeChoice::Cancel));
        assert_eq!(MergeChoice::from_word("🔁"), Some(MergeChoice::Replace));
        assert_eq!(MergeChoice::from_word("maybe"), None);
    }

    #[test]
    fn test_poll_selection_uses_user_counts() {
        let poll = PollSession {
            candidates: ["A", "B", "C"].map(|t| TrackRecord::from_dataset(t, "X")).to_vec(),
            poll_message: 1,
            command_message: None,
        };
        let selected = poll.selected(&[
            ReactionTally::new("3️⃣", 2),
            ReactionTally::new("2️⃣", 0),
            ReactionTally::new("1️⃣", 1),
            ReactionTally::new("👍", 5),
        ]);
        let titles: Vec<_> = selected.iter().map(TrackRecord::title).collect();
        assert_eq!(titles, ["A", "C"]);
        assert_eq!(poll.message_ids(), vec![1]);
    }

    #[test]
    fn test_registry_keeps_one_session_per_context() {
        let store = test_store();
        let registry = SessionRegistry::new(move |_| {
            Session::new(
                Recommender::new(Arc::clone(&store)),
                Arc::new(DatasetResolver::new(Arc::clone(&store))),
                Box::new(RecordingDriver::new()),
                SessionSettings::default(),
            )
        });

        let a = registry.get_or_create(1);
        let again = registry.get_or_create(1);
        let b = registry.get_or_create(2);
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(1).is_some());
        assert!(registry.get(1).is_none());
        assert_eq!(registry.len(), 1);
    }
}
