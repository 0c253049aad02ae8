//! # Replay Module
//!
//! Plays a recorded `SessionDocument` back with its original timing.
//!
//! ## Architecture
//! - **ReplaySchedule**: one cursor per stream plus the time gate; pure, no threads
//! - **ReplayEngine**: owns the background thread, its stop flag and join handle
//!
//! ## Timing
//! With `T0` the wall clock when replay starts and `D0` the document's
//! `init_time`, a tuple with timestamp `ts` is due once `ts - D0 <= now - T0`.
//! Streams are gated independently; there is no merge across streams.
//! Every round releases *all* tuples that are due on each stream, so a slow
//! round never leaves a stream lagging behind the clock.
//!
//! ## Events
//! Released tuples go out over the session event channel in release order,
//! so the consumer is never blocked by replay pacing and vice versa.
//! `ReplayFinished` is sent once per replay, the first round all cursors are
//! exhausted; the thread then idles until stopped.

use crossbeam_channel::Sender;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::controller::SessionEvent;
use crate::error::{SessionError, ValidationError};
use crate::session::{RecordedTuple, SessionDocument};

/// Position of replay within one stream
#[derive(Debug)]
pub struct ReplayCursor {
    key: String,
    tuples: Vec<RecordedTuple>,
    position: usize,
}

impl ReplayCursor {
    pub fn new(key: String, tuples: Vec<RecordedTuple>) -> Self {
        Self {
            key,
            tuples,
            position: 0,
        }
    }

    pub fn peek(&self) -> Option<&RecordedTuple> {
        self.tuples.get(self.position)
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.tuples.len()
    }

    fn advance(&mut self) {
        self.position += 1;
    }
}

/// Cursors over a frozen document plus the data-time anchor `D0`
#[derive(Debug)]
pub struct ReplaySchedule {
    data_start: i64,
    cursors: Vec<ReplayCursor>,
}

impl ReplaySchedule {
    pub fn new(document: SessionDocument) -> Self {
        let data_start = document.init_time();
        let cursors = document
            .into_streams()
            .into_iter()
            .map(|(key, tuples)| ReplayCursor::new(key, tuples))
            .collect();
        Self { data_start, cursors }
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursors.iter().all(ReplayCursor::is_exhausted)
    }

    pub fn remaining(&self) -> usize {
        self.cursors.iter().map(|c| c.tuples.len() - c.position).sum()
    }

    /// Release every tuple due at `elapsed_ms` after replay start.
    ///
    /// Returns how many tuples were handed to `emit`.
    pub fn release_due<F>(&mut self, elapsed_ms: i64, mut emit: F) -> usize
    where
        F: FnMut(&str, RecordedTuple),
    {
        let mut released = 0;
        for cursor in self.cursors.iter_mut() {
            while let Some(&tuple) = cursor.peek() {
                if tuple.timestamp.saturating_sub(self.data_start) > elapsed_ms {
                    break;
                }
                cursor.advance();
                emit(&cursor.key, tuple);
                released += 1;
            }
        }
        released
    }
}

/// Handle to a running replay thread
struct ReplayTask {
    id: u64,
    should_stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

/// Drives at most one replay thread at a time.
///
/// Dropping the engine stops and joins any running replay.
pub struct ReplayEngine {
    tick: Duration,
    events: Sender<SessionEvent>,
    task: Option<ReplayTask>,
    next_id: u64,
}

impl ReplayEngine {
    pub fn new(tick: Duration, events: Sender<SessionEvent>) -> Self {
        Self {
            tick,
            events,
            task: None,
            next_id: 1,
        }
    }

    #[allow(dead_code)]
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Id of the running replay, matching its `ReplayStarted`/`ReplayFinished` events
    pub fn current_id(&self) -> Option<u64> {
        self.task.as_ref().map(|t| t.id)
    }

    /// Validate the file at `path` and start replaying it
    pub fn start_file(&mut self, path: impl AsRef<Path>) -> Result<u64, SessionError> {
        let path = path.as_ref();
        log::info!("Loading recording for replay: {}", path.display());
        let document = SessionDocument::load(path).map_err(|e: ValidationError| {
            log::warn!("{}", e);
            SessionError::Validation(e)
        })?;
        self.start(document)
    }

    /// Start replaying `document`. A replay that is still running is stopped
    /// and joined first.
    pub fn start(&mut self, document: SessionDocument) -> Result<u64, SessionError> {
        self.stop();

        let id = self.next_id;
        let schedule = ReplaySchedule::new(document);
        let should_stop = Arc::new(AtomicBool::new(false));
        let stop_flag = should_stop.clone();
        let events = self.events.clone();
        let tick = self.tick;

        log::info!(
            "Starting replay {}: {} samples, tick {:?}",
            id,
            schedule.remaining(),
            tick
        );

        let handle = thread::Builder::new()
            .name(format!("replay-{}", id))
            .spawn(move || Self::replay_loop(id, schedule, events, stop_flag, tick))
            .map_err(SessionError::Spawn)?;

        self.next_id += 1;
        self.task = Some(ReplayTask {
            id,
            should_stop,
            handle,
        });
        Ok(id)
    }

    /// Signal the replay thread and wait for it; returns false if none was running.
    ///
    /// Completes within about one tick.
    pub fn stop(&mut self) -> bool {
        let Some(task) = self.task.take() else {
            return false;
        };
        log::debug!("Replay {}: setting stop flag", task.id);
        task.should_stop.store(true, Ordering::Release);
        if task.handle.join().is_err() {
            log::error!("Replay {} thread panicked", task.id);
        }
        log::info!("Replay {} stopped", task.id);
        true
    }

    fn replay_loop(
        id: u64,
        mut schedule: ReplaySchedule,
        events: Sender<SessionEvent>,
        should_stop: Arc<AtomicBool>,
        tick: Duration,
    ) {
        let started = Instant::now();
        let mut finish_pending = true;
        let _ = events.send(SessionEvent::ReplayStarted { replay_id: id });

        while !should_stop.load(Ordering::Acquire) {
            if finish_pending {
                let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
                schedule.release_due(elapsed_ms, |key, tuple| {
                    let _ = events.send(SessionEvent::PlaybackSample {
                        replay_id: id,
                        key: key.to_string(),
                        tuple,
                    });
                });

                if schedule.is_exhausted() {
                    log::info!("Replay {} finished", id);
                    let _ = events.send(SessionEvent::ReplayFinished { replay_id: id });
                    finish_pending = false;
                }
            }
            thread::sleep(tick);
        }

        log::debug!("Replay {} thread exiting", id);
    }
}

impl Drop for ReplayEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
