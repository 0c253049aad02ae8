//! # Ingestion Module
//!
//! Reads telemetry lines on a dedicated thread and forwards decoded messages
//! to the controller thread over a channel.
//!
//! ## Line Format
//! `<topic> <payload>`, e.g. `esp/board7/d/2 21,-300,15,980`. The payload may
//! be empty for topics that carry none.
//!
//! The reader never touches session state itself: everything it learns goes
//! through `IngestUpdate`, so the controller stays single-threaded.

use crossbeam_channel::Sender;
use std::io::BufRead;
use std::thread;

use crate::telemetry::{decode, TelemetryMessage};

#[derive(Debug)]
pub enum IngestUpdate {
    Message(TelemetryMessage),
    /// Input ended or failed; no more updates follow
    Closed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub lines: usize,
    pub decoded: usize,
    pub rejected: usize,
}

/// Spawn the reader thread. Returns its handle; the thread's result is the
/// line statistics for the whole input.
pub fn spawn_reader<R>(reader: R, sender: Sender<IngestUpdate>) -> std::io::Result<thread::JoinHandle<IngestStats>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("ingest".to_string())
        .spawn(move || read_lines(reader, &sender))
}

/// Decode every line of `reader` and forward it; blocks until input ends
pub fn read_lines<R: BufRead>(reader: R, sender: &Sender<IngestUpdate>) -> IngestStats {
    let mut stats = IngestStats::default();

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("Ingest: failed to read input: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;

        let (topic, payload) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let received_at = chrono::Utc::now().timestamp_millis();
        match decode(topic, payload.trim(), received_at) {
            Ok(message) => {
                stats.decoded += 1;
                if sender.send(IngestUpdate::Message(message)).is_err() {
                    log::info!("Ingest: receiver closed, shutting down");
                    return stats;
                }
            }
            Err(e) => {
                stats.rejected += 1;
                log::warn!("Ingest: dropping '{}': {}", line, e);
            }
        }
    }

    log::info!(
        "Ingest: input closed after {} lines ({} rejected)",
        stats.lines,
        stats.rejected
    );
    let _ = sender.send(IngestUpdate::Closed);
    stats
}
