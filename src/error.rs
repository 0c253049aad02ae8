//! # Error Types Module
//!
//! Centralized error handling for the telemetry core.
//! Provides custom error types for each module with proper context and error chaining.
//!
//! ## Error Types
//! - `ConfigError`: Configuration file I/O and parsing errors
//! - `ValidationError`: Recording file rejected by replay validation
//! - `PersistenceError`: Recording could not be written to disk
//! - `OutOfRange`: Ring buffer index outside the stored range
//! - `TelemetryError`: Incoming topic/payload could not be decoded
//! - `SessionError`: Session controller transition failures
//!
//! ## Usage Examples
//! ```rust
//! // Config module uses ConfigError
//! pub fn load() -> Result<Config, ConfigError> { ... }
//!
//! // Session documents are validated into ValidationError
//! pub fn load(path: &Path) -> Result<SessionDocument, ValidationError> { ... }
//!
//! // Every controller transition reports a SessionError
//! pub fn start_recording(&mut self) -> Result<(), SessionError> { ... }
//! ```
//!
//! None of these are fatal: the worst outcome of any of them is a rejected
//! request or a lost in-progress recording.

use std::fmt;
use std::path::PathBuf;

use crate::controller::SessionState;

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
        }
    }
}

/// Reasons a recording file is rejected for replay.
///
/// Validation stops at the first failure, so exactly one of these is reported.
#[derive(Debug)]
pub enum ValidationError {
    /// File could not be opened or read
    Open(std::io::Error),
    /// File is not well-formed JSON
    Malformed(serde_json::Error),
    /// Top level is not an object
    NotAnObject,
    /// `init_time` key is missing
    MissingInitTime,
    /// `init_time` is present but not a number
    InitTimeNotNumber,
    /// A stream value is not a list
    StreamNotList { key: String },
    /// A stream list has no tuples
    EmptyStream { key: String },
    /// A tuple is not a list of exactly 5 elements
    TupleShape { key: String, index: usize },
    /// A tuple element is not a number
    ValueNotNumber { key: String, index: usize },
    /// Only `init_time` is present
    NoStreams,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Open(e) => {
                write!(f, "Failed to open recording file: {}", e)
            }
            ValidationError::Malformed(e) => {
                write!(f, "Failed to parse recording file: {}", e)
            }
            ValidationError::NotAnObject => {
                write!(f, "Invalid recording file: top level is not an object")
            }
            ValidationError::MissingInitTime => {
                write!(f, "Invalid recording file: no init_time")
            }
            ValidationError::InitTimeNotNumber => {
                write!(f, "Invalid recording file: init_time not number")
            }
            ValidationError::StreamNotList { key } => {
                write!(f, "Invalid recording file: data for '{}' is not a list", key)
            }
            ValidationError::EmptyStream { key } => {
                write!(f, "Invalid recording file: data for '{}' is empty", key)
            }
            ValidationError::TupleShape { key, index } => {
                write!(
                    f,
                    "Invalid recording file: entry {} of '{}' is not a list of 5 values",
                    index, key
                )
            }
            ValidationError::ValueNotNumber { key, index } => {
                write!(
                    f,
                    "Invalid recording file: entry {} of '{}' has a value that is not a number",
                    index, key
                )
            }
            ValidationError::NoStreams => {
                write!(f, "Invalid recording file: no sensor data")
            }
        }
    }
}

impl std::error::Error for ValidationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ValidationError::Open(e) => Some(e),
            ValidationError::Malformed(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors that can occur while saving a recording
#[derive(Debug)]
pub enum PersistenceError {
    /// Recordings directory could not be created
    CreateDir { path: PathBuf, source: std::io::Error },
    /// Session document could not be serialized
    Serialize(serde_json::Error),
    /// Recording file could not be written
    Write { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::CreateDir { path, source } => {
                write!(f, "Failed to create recordings directory {}: {}", path.display(), source)
            }
            PersistenceError::Serialize(e) => {
                write!(f, "Failed to serialize recording: {}", e)
            }
            PersistenceError::Write { path, source } => {
                write!(f, "Failed to save recording file {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::CreateDir { source, .. } => Some(source),
            PersistenceError::Serialize(e) => Some(e),
            PersistenceError::Write { source, .. } => Some(source),
        }
    }
}

/// Ring buffer index outside `[0, size)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRange {
    pub index: usize,
    pub size: usize,
}

impl fmt::Display for OutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Index {} out of range for buffer of size {}", self.index, self.size)
    }
}

impl std::error::Error for OutOfRange {}

/// Errors that can occur while decoding an incoming telemetry message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    /// Topic does not start with the device prefix
    UnknownPrefix(String),
    /// Topic has fewer levels than its kind requires
    MissingLevels(String),
    /// Third topic level is not a known message kind
    UnknownKind(String),
    /// Data payload does not have four fields
    FieldCount(usize),
    /// Data payload field is not a 16-bit integer
    InvalidField(String),
    /// Status payload is not `0` or `1`
    InvalidStatus(String),
    /// Device key collides with a key reserved by the recording format
    ReservedKey(String),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::UnknownPrefix(topic) => {
                write!(f, "Invalid topic prefix: {}", topic)
            }
            TelemetryError::MissingLevels(topic) => {
                write!(f, "Invalid topic level count: {}", topic)
            }
            TelemetryError::UnknownKind(kind) => {
                write!(f, "Unknown message kind: {}", kind)
            }
            TelemetryError::FieldCount(count) => {
                write!(f, "Invalid data size: expected 4 fields, got {}", count)
            }
            TelemetryError::InvalidField(field) => {
                write!(f, "Invalid data field: {}", field)
            }
            TelemetryError::InvalidStatus(payload) => {
                write!(f, "Invalid status: {}", payload)
            }
            TelemetryError::ReservedKey(key) => {
                write!(f, "Device key is reserved: {}", key)
            }
        }
    }
}

impl std::error::Error for TelemetryError {}

/// Errors returned by session controller transitions
#[derive(Debug)]
pub enum SessionError {
    /// Operation requested while the controller is in the wrong state
    WrongState {
        operation: &'static str,
        state: SessionState,
    },
    /// Replay file was rejected
    Validation(ValidationError),
    /// Recording could not be saved; the document was discarded
    Persistence(PersistenceError),
    /// Replay thread could not be started
    Spawn(std::io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::WrongState { operation, state } => {
                write!(f, "Cannot {} while {}", operation, state)
            }
            SessionError::Validation(e) => write!(f, "{}", e),
            SessionError::Persistence(e) => write!(f, "{}", e),
            SessionError::Spawn(e) => {
                write!(f, "Failed to start replay thread: {}", e)
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::WrongState { .. } => None,
            SessionError::Validation(e) => Some(e),
            SessionError::Persistence(e) => Some(e),
            SessionError::Spawn(e) => Some(e),
        }
    }
}

impl From<ValidationError> for SessionError {
    fn from(e: ValidationError) -> Self {
        SessionError::Validation(e)
    }
}

impl From<PersistenceError> for SessionError {
    fn from(e: PersistenceError) -> Self {
        SessionError::Persistence(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages_are_distinct() {
        let errors = vec![
            ValidationError::NotAnObject,
            ValidationError::MissingInitTime,
            ValidationError::InitTimeNotNumber,
            ValidationError::StreamNotList { key: "a".into() },
            ValidationError::EmptyStream { key: "a".into() },
            ValidationError::TupleShape { key: "a".into(), index: 0 },
            ValidationError::ValueNotNumber { key: "a".into(), index: 0 },
            ValidationError::NoStreams,
        ];
        let mut messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), errors.len());
    }

    #[test]
    fn test_config_error_chain() {
        use std::error::Error;
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConfigError::ReadFailed(io_err);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_session_error_wraps_validation() {
        use std::error::Error;
        let err: SessionError = ValidationError::MissingInitTime.into();
        assert!(err.to_string().contains("init_time"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_wrong_state_display() {
        let err = SessionError::WrongState {
            operation: "start recording",
            state: SessionState::Recording,
        };
        assert_eq!(err.to_string(), "Cannot start recording while recording");
    }
}
