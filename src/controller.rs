//! # Session Controller Module
//!
//! Arbitrates the three mutually exclusive modes and is the single entry point
//! for samples, live or replayed.
//!
//! ## State Machine
//! ```text
//! Idle --start_recording--> Recording --stop_recording--> Idle
//! Idle --start_replaying(valid file)--> Replaying --stop_replaying--> Idle
//! ```
//! Any other request fails with `SessionError::WrongState` and changes nothing.
//! `stop_recording` always returns to `Idle`, even when saving fails.
//!
//! ## Threads
//! The controller lives on the consumer thread. The replay thread talks to it
//! only through the event channel; `poll_events` drains that channel, feeds
//! playback samples through `on_sample` exactly like live ones, and hands the
//! events on to the caller. Samples still queued from a replay that has since
//! been stopped or replaced are discarded and never reach `on_sample`.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::SessionError;
use crate::recorder::Recorder;
use crate::replay::ReplayEngine;
use crate::ring_buffer::SharedRingBuffer;
use crate::session::RecordedTuple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Replaying,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Recording => write!(f, "recording"),
            SessionState::Replaying => write!(f, "replaying"),
        }
    }
}

/// Notifications for the consumer, delivered in order by `poll_events`
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ReplayStarted { replay_id: u64 },
    PlaybackSample {
        replay_id: u64,
        key: String,
        tuple: RecordedTuple,
    },
    ReplayFinished { replay_id: u64 },
    RecordingSaved(PathBuf),
    RecordingFailed(String),
}

pub struct SessionController {
    state: SessionState,
    recorder: Recorder,
    replay: ReplayEngine,
    buffers: BTreeMap<String, Arc<SharedRingBuffer>>,
    buffer_capacity: NonZeroUsize,
    auto_stop_replay: bool,
    event_tx: Sender<SessionEvent>,
    event_rx: Receiver<SessionEvent>,
}

impl SessionController {
    pub fn new(config: &Config) -> Self {
        let (event_tx, event_rx) = unbounded();
        Self {
            state: SessionState::Idle,
            recorder: Recorder::new(config.recordings_dir.clone()),
            replay: ReplayEngine::new(config.replay_tick(), event_tx.clone()),
            buffers: BTreeMap::new(),
            buffer_capacity: config.buffer_capacity(),
            auto_stop_replay: config.auto_stop_replay,
            event_tx,
            event_rx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn require(&self, expected: SessionState, operation: &'static str) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            log::warn!("Rejected request to {} while {}", operation, self.state);
            Err(SessionError::WrongState {
                operation,
                state: self.state,
            })
        }
    }

    pub fn start_recording(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Idle, "start recording")?;
        self.recorder.start();
        self.state = SessionState::Recording;
        Ok(())
    }

    /// Save the recording and return to idle.
    ///
    /// On a persistence failure the recording is lost, the controller is idle
    /// again and a `RecordingFailed` event is queued.
    pub fn stop_recording(&mut self) -> Result<PathBuf, SessionError> {
        self.require(SessionState::Recording, "stop recording")?;
        self.state = SessionState::Idle;

        match self.recorder.finish() {
            Ok(Some(path)) => {
                let _ = self.event_tx.send(SessionEvent::RecordingSaved(path.clone()));
                Ok(path)
            }
            Ok(None) => Err(SessionError::WrongState {
                operation: "stop recording",
                state: SessionState::Idle,
            }),
            Err(e) => {
                log::error!("{}", e);
                let _ = self.event_tx.send(SessionEvent::RecordingFailed(e.to_string()));
                Err(SessionError::Persistence(e))
            }
        }
    }

    /// Validate `path` and start replaying it; device buffers are cleared first
    pub fn start_replaying(&mut self, path: impl AsRef<Path>) -> Result<u64, SessionError> {
        self.require(SessionState::Idle, "start replaying")?;
        let replay_id = self.replay.start_file(path)?;
        self.clear_devices();
        self.state = SessionState::Replaying;
        Ok(replay_id)
    }

    pub fn stop_replaying(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Replaying, "stop replaying")?;
        self.replay.stop();
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Entry point for every sample, live or replayed
    pub fn on_sample(&mut self, key: &str, tuple: RecordedTuple) {
        if self.state == SessionState::Recording {
            self.recorder.record(key, tuple);
        }

        let capacity = self.buffer_capacity;
        let buffer = self.buffers.entry(key.to_string()).or_insert_with(|| {
            log::info!("New device: {}", key);
            Arc::new(SharedRingBuffer::new(capacity))
        });
        buffer.append(tuple.sample());
    }

    /// Drain pending notifications on the calling (consumer) thread
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        let pending: Vec<SessionEvent> = self.event_rx.try_iter().collect();
        let mut events = Vec::with_capacity(pending.len());
        for event in pending {
            match &event {
                SessionEvent::PlaybackSample { replay_id, key, tuple } => {
                    if !self.is_current_replay(*replay_id) {
                        log::trace!("Dropping stale sample for {} from replay {}", key, replay_id);
                        continue;
                    }
                    self.on_sample(key, *tuple);
                }
                SessionEvent::ReplayFinished { replay_id } => {
                    if self.auto_stop_replay && self.is_current_replay(*replay_id) {
                        log::info!("Replay {} exhausted, stopping automatically", replay_id);
                        let _ = self.stop_replaying();
                    }
                }
                _ => {}
            }
            events.push(event);
        }
        events
    }

    fn is_current_replay(&self, replay_id: u64) -> bool {
        self.state == SessionState::Replaying && self.replay.current_id() == Some(replay_id)
    }

    /// Buffer for one device, shareable with a rendering thread
    pub fn buffer(&self, key: &str) -> Option<Arc<SharedRingBuffer>> {
        self.buffers.get(key).cloned()
    }

    pub fn device_keys(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    /// Forget every device and its history
    pub fn clear_devices(&mut self) {
        self.buffers.clear();
    }
}
