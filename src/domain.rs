//! ==============================================================================
//! domain.rs - room readings and their wire encoding
//! ==============================================================================
//!
//! purpose:
//!     the record shared by every part of the hub. the simulator encodes it,
//!     the ingestor decodes it, the cache stores it, the api serves it.
//!
//! wire format:
//!     a flat json object of sensor name -> value, e.g.
//!     {"temp": "25", "humidity": "40", "pressure": "1010", "airquality": "good"}
//!     keys are free-form. numbers and booleans are accepted and kept in
//!     their json text form; null, arrays and objects are rejected.
//!
//! ==============================================================================

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};

/// sensor keys the reference deployment publishes
pub const TEMP: &str = "temp";
pub const HUMIDITY: &str = "humidity";
pub const PRESSURE: &str = "pressure";
pub const AIR_QUALITY: &str = "airquality";

pub type Fields = BTreeMap<String, String>;

/// stable display name of a room, e.g. "Room 2"
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for RoomId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// the latest set of sensor values for one room
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomReading {
    pub room_id: RoomId,
    pub fields: Fields,
}

impl RoomReading {
    /// the zero-value record every room starts with
    pub fn empty(room_id: RoomId) -> Self {
        Self {
            room_id,
            fields: Fields::new(),
        }
    }

    pub fn new(room_id: RoomId, fields: Fields) -> Self {
        Self { room_id, fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, sensor: &str) -> Option<&str> {
        self.fields.get(sensor).map(String::as_str)
    }

    /// numeric view of a sensor value, if it parses
    pub fn numeric(&self, sensor: &str) -> Option<f64> {
        self.get(sensor).and_then(|v| v.trim().parse::<f64>().ok())
    }

    pub fn air_quality(&self) -> Option<AirQuality> {
        self.get(AIR_QUALITY).map(AirQuality::classify)
    }
}

/// air quality bucket shown next to the raw value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AirQuality {
    Good,
    Moderate,
    Poor,
}

impl AirQuality {
    /// anything that is not "good" or "moderate" counts as poor
    pub fn classify(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "good" => AirQuality::Good,
            "moderate" => AirQuality::Moderate,
            _ => AirQuality::Poor,
        }
    }
}

/// encode fields as the json object the ingestor expects
pub fn encode_fields(fields: &Fields) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(fields)
}

/// decode a payload into fields. `topic` is only used for error context.
pub fn decode_fields(topic: &str, payload: &[u8]) -> Result<Fields> {
    let decode_err = |reason: String| HubError::Decode {
        topic: topic.to_string(),
        reason,
    };

    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| decode_err(e.to_string()))?;

    let serde_json::Value::Object(map) = value else {
        return Err(decode_err("payload is not a json object".to_string()));
    };

    let mut fields = Fields::new();
    for (key, value) in map {
        let text = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            other => {
                return Err(decode_err(format!(
                    "field '{}' has unsupported value {}",
                    key, other
                )))
            }
        };
        fields.insert(key, text);
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn encode_then_decode_keeps_fields() {
        let original = fields(&[
            (TEMP, "25"),
            (HUMIDITY, "40"),
            (PRESSURE, "1010"),
            (AIR_QUALITY, "good"),
            ("co2", "415"),
        ]);
        let bytes = encode_fields(&original).unwrap();
        assert_eq!(decode_fields("t", &bytes).unwrap(), original);
    }

    #[test]
    fn decode_accepts_missing_and_unknown_keys() {
        let decoded = decode_fields("t", br#"{"temp":"21","lux":"300"}"#).unwrap();
        assert_eq!(decoded, fields(&[(TEMP, "21"), ("lux", "300")]));
    }

    #[test]
    fn decode_stringifies_scalars() {
        let decoded = decode_fields("t", br#"{"temp":21.5,"occupied":true}"#).unwrap();
        assert_eq!(decoded, fields(&[(TEMP, "21.5"), ("occupied", "true")]));
    }

    #[test]
    fn decode_rejects_truncated_json() {
        let err = decode_fields("smartbuilding/Room1", br#"{"temp":"2"#).unwrap_err();
        assert!(matches!(err, HubError::Decode { ref topic, .. } if topic == "smartbuilding/Room1"));
    }

    #[test]
    fn decode_rejects_non_objects_and_nested_values() {
        assert!(decode_fields("t", br#"["temp","25"]"#).is_err());
        assert!(decode_fields("t", br#""good""#).is_err());
        assert!(decode_fields("t", br#"{"temp":null}"#).is_err());
        assert!(decode_fields("t", br#"{"temp":{"value":"25"}}"#).is_err());
        assert!(decode_fields("t", &[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn air_quality_buckets() {
        assert_eq!(AirQuality::classify("good"), AirQuality::Good);
        assert_eq!(AirQuality::classify("Moderate"), AirQuality::Moderate);
        assert_eq!(AirQuality::classify("poor"), AirQuality::Poor);
        assert_eq!(AirQuality::classify("smoky"), AirQuality::Poor);
    }

    #[test]
    fn numeric_view_ignores_text() {
        let reading = RoomReading::new("Room 1".into(), fields(&[(TEMP, " 22 "), (HUMIDITY, "n/a")]));
        assert_eq!(reading.numeric(TEMP), Some(22.0));
        assert_eq!(reading.numeric(HUMIDITY), None);
        assert_eq!(reading.numeric(PRESSURE), None);
    }
}
