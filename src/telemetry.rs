//! # Telemetry Message Module
//!
//! Decodes the topic/payload pairs published by the sensor boards into
//! messages the session controller understands. The transport that carries
//! them is not handled here.
//!
//! ## Topics
//! - `esp/<device>/d/<sensor>` with payload `T,X,Y,Z`: one sample for key `<device>_<sensor>`
//! - `esp/<device>/status` with payload `0` (offline) or `1` (online)
//! - `esp/<device>/cal/<sensor>`: calibration finished
//!
//! Boards do not timestamp samples; the receive time is used instead.

use crate::error::TelemetryError;
use crate::session::{is_reserved_key, RecordedTuple};

const TOPIC_PREFIX: &str = "esp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryMessage {
    Data { key: String, tuple: RecordedTuple },
    Status { device: String, online: bool },
    CalibrationEnd { device: String, sensor: String },
}

/// Device key naming one sensor on one board
pub fn device_key(device: &str, sensor: &str) -> String {
    format!("{}_{}", device, sensor)
}

/// Decode one message, stamping data samples with `received_at` (epoch ms)
pub fn decode(topic: &str, payload: &str, received_at: i64) -> Result<TelemetryMessage, TelemetryError> {
    let levels: Vec<&str> = topic.split('/').collect();
    if levels.len() < 3 {
        return Err(TelemetryError::MissingLevels(topic.to_string()));
    }
    if levels[0] != TOPIC_PREFIX {
        return Err(TelemetryError::UnknownPrefix(topic.to_string()));
    }

    let device = levels[1];
    match levels[2] {
        "status" => {
            let online = match payload.trim().chars().next() {
                Some('0') => false,
                Some('1') => true,
                _ => return Err(TelemetryError::InvalidStatus(payload.to_string())),
            };
            Ok(TelemetryMessage::Status {
                device: device.to_string(),
                online,
            })
        }
        "d" => {
            let sensor = levels
                .get(3)
                .ok_or_else(|| TelemetryError::MissingLevels(topic.to_string()))?;
            let key = device_key(device, sensor);
            if is_reserved_key(&key) {
                return Err(TelemetryError::ReservedKey(key));
            }
            let [t, x, y, z] = parse_payload(payload)?;
            Ok(TelemetryMessage::Data {
                key,
                tuple: RecordedTuple::new(received_at, t, x, y, z),
            })
        }
        "cal" => {
            let sensor = levels
                .get(3)
                .ok_or_else(|| TelemetryError::MissingLevels(topic.to_string()))?;
            Ok(TelemetryMessage::CalibrationEnd {
                device: device.to_string(),
                sensor: sensor.to_string(),
            })
        }
        other => Err(TelemetryError::UnknownKind(other.to_string())),
    }
}

fn parse_payload(payload: &str) -> Result<[i16; 4], TelemetryError> {
    let fields: Vec<&str> = payload.trim().split(',').collect();
    if fields.len() != 4 {
        return Err(TelemetryError::FieldCount(fields.len()));
    }

    let mut values = [0i16; 4];
    for (slot, field) in values.iter_mut().zip(fields) {
        *slot = field
            .trim()
            .parse()
            .map_err(|_| TelemetryError::InvalidField(field.to_string()))?;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_data() {
        let msg = decode("esp/board7/d/2", "21,-300,15,980", 1234).unwrap();
        assert_eq!(
            msg,
            TelemetryMessage::Data {
                key: "board7_2".to_string(),
                tuple: RecordedTuple::new(1234, 21, -300, 15, 980),
            }
        );
    }

    #[test]
    fn test_decode_status_and_calibration() {
        assert_eq!(
            decode("esp/board7/status", "1", 0).unwrap(),
            TelemetryMessage::Status { device: "board7".into(), online: true }
        );
        assert_eq!(
            decode("esp/board7/status", "0", 0).unwrap(),
            TelemetryMessage::Status { device: "board7".into(), online: false }
        );
        assert_eq!(
            decode("esp/board7/cal/3", "", 0).unwrap(),
            TelemetryMessage::CalibrationEnd { device: "board7".into(), sensor: "3".into() }
        );
    }

    #[test]
    fn test_decode_rejects_bad_topics() {
        assert!(matches!(decode("esp/board7", "1", 0), Err(TelemetryError::MissingLevels(_))));
        assert!(matches!(decode("app/board7/d/0", "1,2,3,4", 0), Err(TelemetryError::UnknownPrefix(_))));
        assert!(matches!(decode("esp/board7/x/0", "", 0), Err(TelemetryError::UnknownKind(_))));
        assert!(matches!(decode("esp/board7/d", "1,2,3,4", 0), Err(TelemetryError::MissingLevels(_))));
        assert_eq!(
            decode("esp/init/d/time", "1,2,3,4", 0),
            Err(TelemetryError::ReservedKey("init_time".to_string()))
        );
    }

    #[test]
    fn test_decode_rejects_bad_payloads() {
        assert_eq!(decode("esp/b/d/0", "1,2,3", 0), Err(TelemetryError::FieldCount(3)));
        assert_eq!(
            decode("esp/b/d/0", "1,2,three,4", 0),
            Err(TelemetryError::InvalidField("three".to_string()))
        );
        assert!(matches!(decode("esp/b/d/0", "1,2,3,99999", 0), Err(TelemetryError::InvalidField(_))));
        assert!(matches!(decode("esp/b/status", "x", 0), Err(TelemetryError::InvalidStatus(_))));
    }
}
