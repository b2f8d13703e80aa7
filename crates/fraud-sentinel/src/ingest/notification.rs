use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// `kind` carried by object-creation notifications.
pub const STORAGE_OBJECT_KIND: &str = "storage#object";

/// A newly created object, decoded from a storage notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectChangeEvent {
    pub kind: String,
    pub bucket: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

impl ObjectChangeEvent {
    /// Last path segment, used to key output records.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.path)
    }
}

/// Why a payload produced no event. None of these are failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotApplicable {
    Malformed(String),
    UnexpectedKind(String),
}

impl std::fmt::Display for NotApplicable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotApplicable::Malformed(reason) => write!(f, "malformed notification: {}", reason),
            NotApplicable::UnexpectedKind(kind) => write!(f, "ignored notification kind '{}'", kind),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNotification {
    kind: String,
    bucket: Option<String>,
    name: Option<String>,
    time_created: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
}

#[derive(Debug, Deserialize)]
struct PushMessage {
    data: String,
}

pub fn decode_notification(payload: &[u8]) -> Result<ObjectChangeEvent, NotApplicable> {
    let raw: RawNotification = serde_json::from_slice(payload)
        .map_err(|err| NotApplicable::Malformed(err.to_string()))?;

    if raw.kind != STORAGE_OBJECT_KIND {
        return Err(NotApplicable::UnexpectedKind(raw.kind));
    }

    let bucket = non_empty(raw.bucket, "bucket")?;
    let path = non_empty(raw.name, "name")?;
    let created_at = raw
        .time_created
        .ok_or_else(|| NotApplicable::Malformed("missing timeCreated".to_string()))?;

    Ok(ObjectChangeEvent {
        kind: raw.kind,
        bucket,
        path,
        created_at,
    })
}

/// Extracts the notification carried by a Pub/Sub push request. Payloads that
/// are not push envelopes are returned unchanged.
pub fn unwrap_push_envelope(payload: &[u8]) -> Result<Vec<u8>, NotApplicable> {
    match serde_json::from_slice::<PushEnvelope>(payload) {
        Ok(envelope) => STANDARD
            .decode(envelope.message.data.trim())
            .map_err(|err| NotApplicable::Malformed(format!("message data: {err}"))),
        Err(_) => Ok(payload.to_vec()),
    }
}

fn non_empty(value: Option<String>, field: &str) -> Result<String, NotApplicable> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(NotApplicable::Malformed(format!("missing {field}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CREATED: &str = r#"{
        "kind": "storage#object",
        "bucket": "landing",
        "name": "daily/tx-2024-01-01.csv",
        "timeCreated": "2024-01-01T10:30:00.000Z",
        "size": "1024"
    }"#;

    #[test]
    fn decodes_object_creation() {
        let event = decode_notification(CREATED.as_bytes()).expect("event");

        assert_eq!(event.bucket, "landing");
        assert_eq!(event.path, "daily/tx-2024-01-01.csv");
        assert_eq!(event.file_name(), "tx-2024-01-01.csv");
        assert_eq!(event.uri(), "gs://landing/daily/tx-2024-01-01.csv");
        assert_eq!(
            event.created_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap()
        );
    }

    #[test]
    fn other_kinds_are_not_applicable() {
        let payload = CREATED.replace("storage#object", "storage#bucket");
        assert_eq!(
            decode_notification(payload.as_bytes()),
            Err(NotApplicable::UnexpectedKind("storage#bucket".to_string()))
        );
    }

    #[test]
    fn garbage_and_incomplete_payloads_are_not_applicable() {
        assert!(matches!(
            decode_notification(b"not json"),
            Err(NotApplicable::Malformed(_))
        ));
        assert!(matches!(
            decode_notification(br#"{"kind":"storage#object","bucket":"b"}"#),
            Err(NotApplicable::Malformed(reason)) if reason == "missing name"
        ));
    }

    #[test]
    fn push_envelopes_are_unwrapped() {
        let envelope = serde_json::json!({
            "message": { "data": STANDARD.encode(CREATED), "messageId": "1" },
            "subscription": "projects/p/subscriptions/s"
        });

        let inner = unwrap_push_envelope(envelope.to_string().as_bytes()).expect("decoded");
        assert_eq!(inner, CREATED.as_bytes());

        let bare = unwrap_push_envelope(CREATED.as_bytes()).expect("passthrough");
        assert_eq!(bare, CREATED.as_bytes());
    }
}
