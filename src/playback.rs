//! # Playback
//!
//! The playback state machine and the two external seams it talks through:
//!
//! - [`PlaybackDriver`]: plays a resolved locator, and pauses, resumes, stops and
//!   sets the volume of what it is playing.
//! - [`MetadataResolver`]: turns a `(title, artist)` into a canonical name and a
//!   playable locator.
//!
//! ## States
//!
//! ```text
//!            play               pause
//! Stopped ─────────▶ Playing ─────────▶ Paused
//!    ▲                 │  ▲    resume     │
//!    └──── stop ───────┘  └───────────────┘
//!    └──────────────── stop ──────────────┘
//! ```
//!
//! A "finished" event from the driver only advances the queue while `Playing` and only
//! for the handle that is currently playing. After a manual `stop` the state is
//! `Stopped`, so the finished event of the stopped track is ignored.

use crate::attributes::AttributeStore;
use crate::track::TrackRecord;
use anyhow::Result;
use log::{debug, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Volume applied when nothing else was requested.
pub const DEFAULT_VOLUME: u8 = 50;

/// Opaque id of something the driver is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandle(pub u64);

impl fmt::Display for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Audio output. Implementations wrap a voice connection, a local player, or a test double.
pub trait PlaybackDriver: Send {
    fn play(&mut self, locator: &str) -> Result<PlaybackHandle>;
    fn stop(&mut self, handle: PlaybackHandle) -> Result<()>;
    fn pause(&mut self, handle: PlaybackHandle) -> Result<()>;
    fn resume(&mut self, handle: PlaybackHandle) -> Result<()>;
    /// `volume` is a percentage in `0..=100`.
    fn set_volume(&mut self, handle: PlaybackHandle, volume: u8) -> Result<()>;
}

/// Canonical name and playable locator of a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub title: String,
    pub artist: String,
    pub locator: String,
}

impl ResolvedTrack {
    #[must_use]
    pub fn into_record(self, source: crate::track::TrackSource) -> TrackRecord {
        TrackRecord::new(self.title, self.artist, source).with_locator(self.locator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("could not find '{0}'")]
    NotFound(String),
    #[error("metadata service failed: {0}")]
    Service(String),
}

/// Name and locator lookup. Calls may block on network I/O, so callers run them on a
/// blocking worker.
pub trait MetadataResolver: Send + Sync {
    fn resolve(&self, title: &str, artist: Option<&str>) -> Result<ResolvedTrack, ResolveError>;
}

/// Resolves against the local datasets and builds a search locator for the audio backend.
#[derive(Debug, Clone)]
pub struct DatasetResolver {
    store: Arc<AttributeStore>,
}

impl DatasetResolver {
    #[must_use]
    pub fn new(store: Arc<AttributeStore>) -> Self {
        Self { store }
    }
}

impl MetadataResolver for DatasetResolver {
    fn resolve(&self, title: &str, artist: Option<&str>) -> Result<ResolvedTrack, ResolveError> {
        if title.trim().is_empty() {
            return Err(ResolveError::NotFound(title.to_string()));
        }
        // A known artist means the name came from a track record, so try it as is first.
        let exact = artist.and_then(|artist| self.store.find_exact(title, artist));
        let artist = artist.unwrap_or("");
        let found = exact.or_else(|| self.store.find_full_name(title, artist));
        let (title, artist) = match found {
            Some(found) => (found.title().to_string(), found.artist().to_string()),
            // Free-text queries still play, the audio backend does the searching.
            None => (title.trim().to_string(), artist.trim().to_string()),
        };
        let locator = format!("ytsearch:{title} {artist}").trim_end().to_string();
        Ok(ResolvedTrack {
            title,
            artist,
            locator,
        })
    }
}

/// Driver errors and invalid transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("The bot is not playing anything at the moment.")]
    NotPlaying,
    #[error("The bot was not paused. Use the play command to start something.")]
    NotPaused,
    #[error("Volume must be between 0 and 100, got {0}.")]
    InvalidVolume(i64),
    #[error("The audio driver failed: {0}")]
    Driver(String),
}

fn driver_error(e: anyhow::Error) -> PlaybackError {
    PlaybackError::Driver(format!("{e:#}"))
}

/// What the session should do with a "finished" event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishedAction {
    /// The current track ended on its own; advance the queue.
    Advance,
    /// Stale or manually stopped handle; do nothing.
    Ignore,
}

/// Owns the driver and the playback state of one session.
pub struct PlaybackController {
    driver: Box<dyn PlaybackDriver>,
    state: PlaybackState,
    handle: Option<PlaybackHandle>,
    volume: u8,
}

impl fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.state)
            .field("handle", &self.handle)
            .field("volume", &self.volume)
            .finish_non_exhaustive()
    }
}

impl PlaybackController {
    #[must_use]
    pub fn new(driver: Box<dyn PlaybackDriver>, volume: u8) -> Self {
        Self {
            driver,
            state: PlaybackState::Stopped,
            handle: None,
            volume: volume.min(100),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn handle(&self) -> Option<PlaybackHandle> {
        self.handle
    }

    /// Replaces whatever is playing with `locator`.
    pub fn play(&mut self, locator: &str) -> Result<PlaybackHandle, PlaybackError> {
        if let Some(old) = self.handle.take() {
            // The old track's finished event must not advance the queue.
            self.state = PlaybackState::Stopped;
            if let Err(e) = self.driver.stop(old) {
                warn!("Failed to stop {old} before playing the next track: {e:#}");
            }
        }

        let handle = self.driver.play(locator).map_err(driver_error)?;
        self.handle = Some(handle);
        self.state = PlaybackState::Playing;
        if let Err(e) = self.driver.set_volume(handle, self.volume) {
            warn!("Failed to apply volume {}% to {handle}: {e:#}", self.volume);
        }
        info!("Playing {locator} as {handle}");
        Ok(handle)
    }

    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        match (self.state, self.handle) {
            (PlaybackState::Playing, Some(handle)) => {
                self.driver.pause(handle).map_err(driver_error)?;
                self.state = PlaybackState::Paused;
                Ok(())
            }
            _ => Err(PlaybackError::NotPlaying),
        }
    }

    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        match (self.state, self.handle) {
            (PlaybackState::Paused, Some(handle)) => {
                self.driver.resume(handle).map_err(driver_error)?;
                self.state = PlaybackState::Playing;
                Ok(())
            }
            _ => Err(PlaybackError::NotPaused),
        }
    }

    /// Manual stop. The queue is left where it is.
    pub fn stop(&mut self) -> Result<(), PlaybackError> {
        let handle = self.handle.take().ok_or(PlaybackError::NotPlaying)?;
        self.state = PlaybackState::Stopped;
        self.driver.stop(handle).map_err(driver_error)
    }

    /// Accepts any integer so out-of-range input gets a specific error.
    pub fn set_volume(&mut self, volume: i64) -> Result<u8, PlaybackError> {
        let volume = u8::try_from(volume)
            .ok()
            .filter(|v| *v <= 100)
            .ok_or(PlaybackError::InvalidVolume(volume))?;
        self.volume = volume;
        if let Some(handle) = self.handle {
            self.driver.set_volume(handle, volume).map_err(driver_error)?;
        }
        debug!("Volume set to {volume}%");
        Ok(volume)
    }

    /// Handles the driver's "finished" signal for `handle`.
    pub fn on_finished(&mut self, handle: PlaybackHandle) -> FinishedAction {
        if self.handle != Some(handle) || self.state != PlaybackState::Playing {
            debug!("Ignoring finished event for {handle} in state {:?}", self.state);
            return FinishedAction::Ignore;
        }
        self.handle = None;
        self.state = PlaybackState::Stopped;
        FinishedAction::Advance
    }
}

/// One call made on a [`RecordingDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Play(String, PlaybackHandle),
    Stop(PlaybackHandle),
    Pause(PlaybackHandle),
    Resume(PlaybackHandle),
    Volume(PlaybackHandle, u8),
}

/// A driver that produces no audio and remembers every call. The console front end
/// prints its events; tests inspect them.
#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    events: Arc<Mutex<Vec<DriverEvent>>>,
    next_handle: u64,
}

impl RecordingDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records into an existing log, e.g. one shared by every session's driver.
    #[must_use]
    pub fn with_events(events: Arc<Mutex<Vec<DriverEvent>>>) -> Self {
        Self {
            events,
            next_handle: 0,
        }
    }

    /// Shared view of the recorded events that stays valid after the driver is boxed.
    #[must_use]
    pub fn events(&self) -> Arc<Mutex<Vec<DriverEvent>>> {
        Arc::clone(&self.events)
    }

    fn record(&self, event: DriverEvent) {
        debug!("Driver event: {event:?}");
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl PlaybackDriver for RecordingDriver {
    fn play(&mut self, locator: &str) -> Result<PlaybackHandle> {
        self.next_handle += 1;
        let handle = PlaybackHandle(self.next_handle);
        self.record(DriverEvent::Play(locator.to_string(), handle));
        Ok(handle)
    }

    fn stop(&mut self, handle: PlaybackHandle) -> Result<()> {
        self.record(DriverEvent::Stop(handle));
        Ok(())
    }

    fn pause(&mut self, handle: PlaybackHandle) -> Result<()> {
        self.record(DriverEvent::Pause(handle));
        Ok(())
    }

    fn resume(&mut self, handle: PlaybackHandle) -> Result<()> {
        self.record(DriverEvent::Resume(handle));
        Ok(())
    }

    fn set_volume(&mut self, handle: PlaybackHandle, volume: u8) -> Result<()> {
        self.record(DriverEvent::Volume(handle, volume));
        Ok(())
    }
}
