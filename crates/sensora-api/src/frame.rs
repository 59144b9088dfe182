// ── Wire message codec ──
//
// Every message on the duplex connection is a JSON object with a
// mandatory `type` discriminator. Inbound payloads are validated and
// classified into `ServerFrame`; anything with an unknown discriminator
// is ignored (forward-compatible), and anything structurally invalid is
// rejected without disturbing the connection.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Ordered timestamp→value mapping for one channel.
///
/// `BTreeMap` keeps iteration timestamp-ordered regardless of the
/// arrival order of individual samples; inserting an existing timestamp
/// overwrites (upsert, last write wins).
pub type Series = BTreeMap<DateTime<Utc>, f64>;

// ── Outbound frames ──────────────────────────────────────────────────

/// Client → server frames. Serialized as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Handshake: carries the bearer credential.
    Auth(String),
    /// Start streaming the listed channels.
    Subscribe(Vec<String>),
    /// Stop streaming a single channel.
    Unsubscribe(String),
    /// Request historical samples for one channel.
    MeasurementReq(MeasurementRequest),
}

/// Payload of an outbound `measurement_req` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRequest {
    pub id: String,
    /// Relative-time window in the duration grammar, e.g. `"-15m"`.
    /// Validated by [`crate::duration::parse`] before any send.
    pub duration: String,
}

/// Encode an outbound frame as a JSON text payload.
pub fn encode(frame: &ClientFrame) -> Result<String, Error> {
    serde_json::to_string(frame).map_err(|e| Error::Encode(e.to_string()))
}

// ── Inbound frames ───────────────────────────────────────────────────

/// Server → client frames, tagged by the `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake verdict. `"ok"` means authenticated; anything else is
    /// a rejection reason (`"NO_AUTH"`, `"INVALID_TOKEN"`, ...).
    Auth { message: String },

    /// Bulk snapshot sent in response to a subscribe request: one entry
    /// per requested channel.
    Subscribe { data: HashMap<String, SnapshotEntry> },

    /// Single live sample push. The discriminator is misspelled on the
    /// wire and must stay that way.
    #[serde(rename = "measurment")]
    Measurement {
        sensor_id: Uuid,
        time: DateTime<Utc>,
        value: f64,
    },

    /// Response to a historical request, correlated only by channel id.
    MeasurementReq { id: String, values: Series },

    /// Single alert push.
    Notification { data: Notification },

    /// Bulk alert push, typically right after connecting.
    NotificationsUnread { data: Vec<Notification> },
}

/// Per-channel entry inside a bulk subscribe snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SnapshotEntry {
    Ok { values: Series },
    Error { message: String },
}

/// Discriminators this client understands. Anything else is dropped
/// silently so newer servers can add frame types without breaking us.
const KNOWN_TYPES: [&str; 6] = [
    "auth",
    "subscribe",
    "measurment",
    "measurement_req",
    "notification",
    "notifications_unread",
];

/// Classify an inbound text payload.
///
/// Returns `Ok(None)` for unrecognized discriminators, and
/// [`Error::Deserialization`] when a known discriminator carries an
/// invalid structure. Callers log and drop the latter; the connection
/// itself is never disturbed by a bad frame.
pub fn decode(text: &str) -> Result<Option<ServerFrame>, Error> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| deserialization(e, text))?;

    let Some(tag) = value.get("type").and_then(|t| t.as_str()) else {
        return Err(Error::Deserialization {
            message: "missing `type` discriminator".to_string(),
            body: text.to_string(),
        });
    };

    if !KNOWN_TYPES.contains(&tag) {
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| deserialization(e, text))
}

fn deserialization(err: serde_json::Error, body: &str) -> Error {
    Error::Deserialization {
        message: err.to_string(),
        body: body.to_string(),
    }
}

// ── Notifications ────────────────────────────────────────────────────

/// Alert severity, matching the server's level set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// One alert record as pushed by the server.
///
/// Records stay in the client inbox until a successful acknowledge
/// round-trip removes them; the `read` flag reflects the server-side
/// state at push time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub level: Severity,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_auth_frame() {
        let text = encode(&ClientFrame::Auth("T".into())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": "auth", "data": "T"}));
    }

    #[test]
    fn encode_subscribe_and_unsubscribe_frames() {
        let text = encode(&ClientFrame::Subscribe(vec!["s1".into(), "s2".into()])).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": "subscribe", "data": ["s1", "s2"]}));

        let text = encode(&ClientFrame::Unsubscribe("s1".into())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": "unsubscribe", "data": "s1"}));
    }

    #[test]
    fn encode_measurement_request_frame() {
        let frame = ClientFrame::MeasurementReq(MeasurementRequest {
            id: "s1".into(),
            duration: "-15m".into(),
        });
        let value: serde_json::Value = serde_json::from_str(&encode(&frame).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "measurement_req", "data": {"id": "s1", "duration": "-15m"}})
        );
    }

    #[test]
    fn decode_auth_frame() {
        let frame = decode(r#"{"type":"auth","message":"ok"}"#).unwrap().unwrap();
        assert_eq!(frame, ServerFrame::Auth { message: "ok".into() });
    }

    #[test]
    fn decode_live_measurement_uses_wire_spelling() {
        let raw = json!({
            "type": "measurment",
            "sensor_id": "7e57a110-0000-4000-8000-000000000001",
            "time": "2024-01-01T00:00:00Z",
            "value": 5.0
        });
        let frame = decode(&raw.to_string()).unwrap().unwrap();
        let ServerFrame::Measurement { sensor_id, value, .. } = frame else {
            panic!("expected a measurement frame");
        };
        assert_eq!(
            sensor_id.to_string(),
            "7e57a110-0000-4000-8000-000000000001"
        );
        assert_eq!(value, 5.0);
    }

    #[test]
    fn decode_subscribe_snapshot_with_mixed_entries() {
        let raw = json!({
            "type": "subscribe",
            "data": {
                "s1": {"status": "ok", "values": {
                    "2024-01-01T00:00:00Z": 1.0,
                    "2024-01-01T00:01:00Z": 2.0
                }},
                "s2": {"status": "error", "message": "SERVER_ERROR"}
            }
        });
        let frame = decode(&raw.to_string()).unwrap().unwrap();
        let ServerFrame::Subscribe { data } = frame else {
            panic!("expected a subscribe frame");
        };
        let SnapshotEntry::Ok { values } = &data["s1"] else {
            panic!("expected an ok entry for s1");
        };
        assert_eq!(values.len(), 2);
        assert!(matches!(&data["s2"], SnapshotEntry::Error { message } if message == "SERVER_ERROR"));
    }

    #[test]
    fn decoded_series_iterates_in_timestamp_order() {
        let raw = json!({
            "type": "measurement_req",
            "id": "s1",
            "values": {
                "2024-01-01T00:02:00Z": 3.0,
                "2024-01-01T00:00:00Z": 1.0,
                "2024-01-01T00:01:00Z": 2.0
            }
        });
        let frame = decode(&raw.to_string()).unwrap().unwrap();
        let ServerFrame::MeasurementReq { values, .. } = frame else {
            panic!("expected a measurement_req frame");
        };
        let ordered: Vec<f64> = values.values().copied().collect();
        assert_eq!(ordered, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn decode_notification_frames() {
        let record = json!({
            "id": "7e57a110-0000-4000-8000-0000000000aa",
            "level": "warning",
            "title": "Low battery",
            "description": "Sensor battery below 20%",
            "created_at": "2024-11-03T08:00:00Z",
            "read": false
        });

        let single = json!({"type": "notification", "data": record});
        let frame = decode(&single.to_string()).unwrap().unwrap();
        let ServerFrame::Notification { data } = frame else {
            panic!("expected a notification frame");
        };
        assert_eq!(data.level, Severity::Warning);

        let bulk = json!({"type": "notifications_unread", "data": [record]});
        let frame = decode(&bulk.to_string()).unwrap().unwrap();
        assert!(matches!(frame, ServerFrame::NotificationsUnread { data } if data.len() == 1));
    }

    #[test]
    fn unknown_discriminator_is_silently_ignored() {
        assert_eq!(decode(r#"{"type":"server_stats","data":{}}"#).unwrap(), None);
    }

    #[test]
    fn known_discriminator_with_bad_structure_is_an_error() {
        let err = decode(r#"{"type":"measurment","sensor_id":"not-a-uuid"}"#).unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }));
    }

    #[test]
    fn missing_discriminator_is_an_error() {
        assert!(decode(r#"{"message":"ok"}"#).is_err());
        assert!(decode("not json at all").is_err());
    }
}
