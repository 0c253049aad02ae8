//! # Recording Module
//!
//! Captures every observed sample into a `SessionDocument` and writes it out as
//! one JSON file per recording when the session stops.
//!
//! ## Lifecycle
//! 1. `start`: fresh document stamped with the current wall clock as `init_time`
//! 2. `record`: append to the stream for the sample's device key
//! 3. `finish`: write `recording_YYYY-MM-DD_HH-MM-SS.json` under the recordings
//!    directory (created on demand) and drop the document. If that name is
//!    taken, `_1`, `_2`, ... is appended to the stem.
//!
//! A failed write is not retried: the document is dropped either way, so a bad
//! disk costs the in-progress recording but never leaves the recorder stuck.

use chrono::{DateTime, Local, TimeZone, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::PersistenceError;
use crate::session::{RecordedTuple, SessionDocument};

const MAX_NAME_ATTEMPTS: u32 = 1000;

pub struct Recorder {
    /// Directory finished recordings are written to
    output_dir: PathBuf,
    /// Document being filled; `Some` exactly while recording
    document: Option<SessionDocument>,
}

impl Recorder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            document: None,
        }
    }

    #[allow(dead_code)]
    pub fn is_recording(&self) -> bool {
        self.document.is_some()
    }

    #[allow(dead_code)]
    pub fn document(&self) -> Option<&SessionDocument> {
        self.document.as_ref()
    }

    /// Begin a new document anchored at the current time.
    ///
    /// Returns false if a document is already open; it is left untouched.
    pub fn start(&mut self) -> bool {
        self.start_at(Utc::now().timestamp_millis())
    }

    pub fn start_at(&mut self, init_time: i64) -> bool {
        if self.document.is_some() {
            return false;
        }
        log::info!("Recording started (init_time {})", init_time);
        self.document = Some(SessionDocument::new(init_time));
        true
    }

    /// Add a tuple to the open document; ignored when not recording
    pub fn record(&mut self, key: &str, tuple: RecordedTuple) {
        if let Some(document) = self.document.as_mut() {
            if !document.push(key, tuple) {
                log::warn!("Not recording sample for reserved key {}", key);
                return;
            }
            log::debug!(
                "Recorded {}: {} {} {} {} {}",
                key, tuple.timestamp, tuple.t, tuple.x, tuple.y, tuple.z
            );
        }
    }

    /// Close the open document and write it to disk.
    ///
    /// Returns `Ok(None)` if nothing was being recorded. The document is
    /// discarded whether or not the write succeeds.
    pub fn finish(&mut self) -> Result<Option<PathBuf>, PersistenceError> {
        let Some(document) = self.document.take() else {
            return Ok(None);
        };

        log::info!(
            "Stopping recording: {} samples across {} devices",
            document.tuple_count(),
            document.stream_count()
        );
        Self::write_document(&self.output_dir, &document).map(Some)
    }

    fn file_stem(init_time: i64) -> String {
        let started: DateTime<Local> = Local
            .timestamp_millis_opt(init_time)
            .single()
            .unwrap_or_else(Local::now);
        format!("recording_{}", started.format("%Y-%m-%d_%H-%M-%S"))
    }

    /// `recording_<start>.json`, or `recording_<start>_<n>.json` for the n-th clash
    fn file_name(init_time: i64, attempt: u32) -> String {
        match attempt {
            0 => format!("{}.json", Self::file_stem(init_time)),
            n => format!("{}_{}.json", Self::file_stem(init_time), n),
        }
    }

    /// Create a file that did not exist before; an existing recording is never overwritten
    fn create_unique(output_dir: &Path, init_time: i64) -> Result<(PathBuf, File), PersistenceError> {
        let mut attempt = 0;
        loop {
            let file_path = output_dir.join(Self::file_name(init_time, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&file_path) {
                Ok(file) => return Ok((file_path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    log::debug!("{} already exists", file_path.display());
                    attempt += 1;
                }
                Err(source) => {
                    return Err(PersistenceError::Write {
                        path: file_path,
                        source,
                    })
                }
            }
        }
    }

    fn write_document(output_dir: &Path, document: &SessionDocument) -> Result<PathBuf, PersistenceError> {
        fs::create_dir_all(output_dir).map_err(|source| PersistenceError::CreateDir {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let contents = document.to_json_pretty().map_err(PersistenceError::Serialize)?;
        let (file_path, mut file) = Self::create_unique(output_dir, document.init_time())?;
        file.write_all(contents.as_bytes())
            .map_err(|source| PersistenceError::Write {
                path: file_path.clone(),
                source,
            })?;

        log::info!("Recording saved to: {}", file_path.display());
        Ok(file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_start_stop_recording() {
        let temp_dir = tempdir().unwrap();
        let mut recorder = Recorder::new(temp_dir.path().join("recordings"));

        assert!(!recorder.is_recording());
        assert!(recorder.start());
        assert!(recorder.is_recording());
        recorder.record("A", RecordedTuple::new(0, 1, 2, 3, 4));

        let path = recorder.finish().unwrap().expect("a file should be written");
        assert!(!recorder.is_recording());
        assert!(path.starts_with(temp_dir.path().join("recordings")));

        let saved = SessionDocument::load(&path).unwrap();
        assert_eq!(saved.stream("A").unwrap(), &[RecordedTuple::new(0, 1, 2, 3, 4)]);
    }

    #[test]
    fn test_second_start_keeps_document() {
        let temp_dir = tempdir().unwrap();
        let mut recorder = Recorder::new(temp_dir.path());

        assert!(recorder.start_at(1));
        recorder.record("A", RecordedTuple::new(0, 0, 0, 0, 0));
        assert!(!recorder.start_at(2));

        let document = recorder.document().unwrap();
        assert_eq!(document.init_time(), 1);
        assert_eq!(document.tuple_count(), 1);
    }

    #[test]
    fn test_record_ignored_when_idle() {
        let temp_dir = tempdir().unwrap();
        let mut recorder = Recorder::new(temp_dir.path());

        recorder.record("A", RecordedTuple::new(0, 0, 0, 0, 0));
        assert!(recorder.document().is_none());
        assert!(matches!(recorder.finish(), Ok(None)));
    }

    #[test]
    fn test_file_named_after_start_time() {
        let init_time = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap().timestamp_millis();
        assert_eq!(Recorder::file_name(init_time, 0), "recording_2024-03-05_14-07-09.json");
        assert_eq!(Recorder::file_name(init_time, 2), "recording_2024-03-05_14-07-09_2.json");
    }

    #[test]
    fn test_same_second_recordings_get_distinct_files() {
        let temp_dir = tempdir().unwrap();
        let mut recorder = Recorder::new(temp_dir.path());

        recorder.start_at(5_000);
        recorder.record("A", RecordedTuple::new(1, 1, 1, 1, 1));
        let first = recorder.finish().unwrap().unwrap();

        recorder.start_at(5_400);
        recorder.record("B", RecordedTuple::new(2, 2, 2, 2, 2));
        let second = recorder.finish().unwrap().unwrap();

        assert_ne!(first, second);
        assert!(SessionDocument::load(&first).unwrap().stream("A").is_some());
        assert!(SessionDocument::load(&second).unwrap().stream("B").is_some());
    }

    #[test]
    fn test_reserved_key_not_recorded() {
        let temp_dir = tempdir().unwrap();
        let mut recorder = Recorder::new(temp_dir.path());

        recorder.start_at(0);
        recorder.record("init_time", RecordedTuple::new(1, 1, 1, 1, 1));
        recorder.record("A", RecordedTuple::new(2, 2, 2, 2, 2));
        let path = recorder.finish().unwrap().unwrap();

        let saved = SessionDocument::load(&path).unwrap();
        assert_eq!(saved.init_time(), 0);
        assert_eq!(saved.tuple_count(), 1);
    }

    #[test]
    fn test_write_failure_discards_document() {
        let temp_dir = tempdir().unwrap();
        // A regular file where the directory should be makes create_dir_all fail.
        let blocker = temp_dir.path().join("recordings");
        fs::write(&blocker, "not a directory").unwrap();

        let mut recorder = Recorder::new(&blocker);
        assert!(recorder.start());
        recorder.record("A", RecordedTuple::new(0, 1, 2, 3, 4));

        assert!(matches!(recorder.finish(), Err(PersistenceError::CreateDir { .. })));
        assert!(!recorder.is_recording());
        assert!(recorder.start());
    }
}
