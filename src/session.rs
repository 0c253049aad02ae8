//! # Session Document Module
//!
//! In-memory form of one recording: the wall-clock anchor `init_time` (epoch ms)
//! plus, per device key, the tuples observed while recording.
//!
//! ## File Format
//! ```text
//! {
//!   "init_time": 1718000000000,
//!   "board1_0": [ [timestamp, T, X, Y, Z], ... ],
//!   ...
//! }
//! ```
//!
//! Files are validated strictly and in order before a document is built, so a
//! document that exists is always well-formed: replay never sees partial data.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::ValidationError;
use crate::ring_buffer::Sample;

pub const INIT_TIME_KEY: &str = "init_time";
const TUPLE_LEN: usize = 5;

/// Stream keys that would collide with document metadata
pub fn is_reserved_key(key: &str) -> bool {
    key == INIT_TIME_KEY
}

/// Persisted form of one sample, including the auxiliary `t` channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedTuple {
    pub timestamp: i64,
    pub t: i16,
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl RecordedTuple {
    pub fn new(timestamp: i64, t: i16, x: i16, y: i16, z: i16) -> Self {
        Self { timestamp, t, x, y, z }
    }

    /// The part kept in a device's ring buffer
    pub fn sample(&self) -> Sample {
        Sample::new(self.timestamp, self.x, self.y, self.z)
    }

    /// Build from a validated 5-element list. Floats are truncated and
    /// channel values saturate at the i16 bounds.
    fn from_values(values: &[Value]) -> Option<Self> {
        let timestamp = values[0]
            .as_i64()
            .or_else(|| values[0].as_f64().map(|v| v as i64))?;
        let channel = |v: &Value| -> Option<i16> {
            v.as_i64()
                .map(|n| n.clamp(i16::MIN as i64, i16::MAX as i64) as i16)
                .or_else(|| v.as_f64().map(|f| f as i16))
        };
        Some(Self {
            timestamp,
            t: channel(&values[1])?,
            x: channel(&values[2])?,
            y: channel(&values[3])?,
            z: channel(&values[4])?,
        })
    }
}

impl Serialize for RecordedTuple {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.timestamp, self.t, self.x, self.y, self.z).serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDocument {
    init_time: i64,
    streams: BTreeMap<String, Vec<RecordedTuple>>,
}

impl SessionDocument {
    pub fn new(init_time: i64) -> Self {
        Self {
            init_time,
            streams: BTreeMap::new(),
        }
    }

    pub fn init_time(&self) -> i64 {
        self.init_time
    }

    /// Append to `key`'s stream, creating it on first use.
    ///
    /// Returns false and stores nothing for the reserved `init_time` key.
    pub fn push(&mut self, key: &str, tuple: RecordedTuple) -> bool {
        if is_reserved_key(key) {
            return false;
        }
        match self.streams.get_mut(key) {
            Some(stream) => stream.push(tuple),
            None => {
                self.streams.insert(key.to_string(), vec![tuple]);
            }
        }
        true
    }

    #[allow(dead_code)]
    pub fn stream(&self, key: &str) -> Option<&[RecordedTuple]> {
        self.streams.get(key).map(Vec::as_slice)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn tuple_count(&self) -> usize {
        self.streams.values().map(Vec::len).sum()
    }

    pub fn into_streams(self) -> BTreeMap<String, Vec<RecordedTuple>> {
        self.streams
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Read and validate a recording file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let contents = fs::read_to_string(path).map_err(ValidationError::Open)?;
        Self::from_json_str(&contents)
    }

    /// Parse and validate, failing on the first violation found
    pub fn from_json_str(contents: &str) -> Result<Self, ValidationError> {
        let root: Value = serde_json::from_str(contents).map_err(ValidationError::Malformed)?;
        let object = root.as_object().ok_or(ValidationError::NotAnObject)?;
        Self::from_object(object)
    }

    fn from_object(object: &Map<String, Value>) -> Result<Self, ValidationError> {
        let init_time = object
            .get(INIT_TIME_KEY)
            .ok_or(ValidationError::MissingInitTime)?;
        let init_time = init_time
            .as_i64()
            .or_else(|| init_time.as_f64().map(|v| v as i64))
            .ok_or(ValidationError::InitTimeNotNumber)?;

        let mut document = Self::new(init_time);
        for (key, value) in object {
            if key == INIT_TIME_KEY {
                continue;
            }
            let stream = parse_stream(key, value)?;
            document.streams.insert(key.clone(), stream);
        }

        if document.streams.is_empty() {
            return Err(ValidationError::NoStreams);
        }
        Ok(document)
    }
}

fn parse_stream(key: &str, value: &Value) -> Result<Vec<RecordedTuple>, ValidationError> {
    let entries = value
        .as_array()
        .ok_or_else(|| ValidationError::StreamNotList { key: key.to_string() })?;
    if entries.is_empty() {
        return Err(ValidationError::EmptyStream { key: key.to_string() });
    }

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let values = entry
                .as_array()
                .filter(|values| values.len() == TUPLE_LEN)
                .ok_or_else(|| ValidationError::TupleShape {
                    key: key.to_string(),
                    index,
                })?;
            values
                .iter()
                .all(Value::is_number)
                .then(|| RecordedTuple::from_values(values))
                .flatten()
                .ok_or_else(|| ValidationError::ValueNotNumber {
                    key: key.to_string(),
                    index,
                })
        })
        .collect()
}

impl Serialize for SessionDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.streams.len() + 1))?;
        map.serialize_entry(INIT_TIME_KEY, &self.init_time)?;
        for (key, stream) in &self.streams {
            map.serialize_entry(key, stream)?;
        }
        map.end()
    }
}
