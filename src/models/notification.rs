//! Object-storage change notifications as delivered to `POST /new`.
//!
//! The shape follows the S3 event message format. Only `s3.bucket.name` and
//! `s3.object.key` are required; everything else defaults so that trimmed-down
//! notifications from S3-compatible stores still decode.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One object-creation event.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    /// Region the event originated in (e.g. "us-east-1").
    #[serde(default)]
    pub aws_region: String,

    /// Event type, e.g. `ObjectCreated:Put`.
    #[serde(default)]
    pub event_name: String,

    /// Emitting service, normally `aws:s3`.
    #[serde(default)]
    pub event_source: String,

    /// ISO-8601 timestamp of the event, kept verbatim.
    #[serde(default)]
    pub event_time: String,

    #[serde(default)]
    pub event_version: String,

    /// Principal that triggered the event.
    #[serde(default)]
    pub user_identity: Identity,

    pub s3: S3Entity,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Identity {
    pub principal_id: String,
}

/// The `s3` block of a record: which bucket and which object.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct S3Entity {
    pub bucket: BucketRef,

    pub object: ObjectRef,

    #[serde(default)]
    pub configuration_id: String,

    #[serde(default)]
    pub s3_schema_version: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BucketRef {
    pub name: String,

    #[serde(default)]
    pub arn: String,

    #[serde(default)]
    pub owner_identity: Identity,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub key: String,

    #[serde(default, rename = "eTag")]
    pub e_tag: String,

    #[serde(default)]
    pub size: u64,

    #[serde(default)]
    pub sequencer: String,
}

impl NotificationRecord {
    pub fn bucket(&self) -> &str {
        &self.s3.bucket.name
    }

    pub fn key(&self) -> &str {
        &self.s3.object.key
    }

    /// Records without an event name are treated as creations; anything else
    /// must be an `ObjectCreated:*` event.
    pub fn is_object_created(&self) -> bool {
        self.event_name.is_empty() || self.event_name.starts_with("ObjectCreated:")
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("batch body is empty")]
    Empty,
    #[error("batch body is not a list of notification records: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Accepted batch layouts: a bare array, or the native `{"Records": [...]}`
/// envelope S3 delivers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Batch {
    List(Vec<NotificationRecord>),
    Envelope {
        #[serde(rename = "Records")]
        records: Vec<NotificationRecord>,
    },
}

/// Decode a raw request body into notification records.
///
/// All-or-nothing: a body that fails to decode yields no records at all.
pub fn decode_batch(body: &[u8]) -> Result<Vec<NotificationRecord>, DecodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }

    let batch = match serde_json::from_slice::<Batch>(body) {
        Ok(batch) => batch,
        // untagged enums swallow the underlying message; re-run the primary
        // layout to surface a useful one.
        Err(_) => serde_json::from_slice::<Vec<NotificationRecord>>(body).map(Batch::List)?,
    };

    Ok(match batch {
        Batch::List(records) | Batch::Envelope { records } => records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_RECORD: &str = r#"[{
        "awsRegion": "us-east-1",
        "eventName": "ObjectCreated:Put",
        "eventSource": "aws:s3",
        "eventTime": "2019-03-01T18:04:42.165Z",
        "eventVersion": "2.1",
        "userIdentity": { "principalId": "AWS:AIDAJ" },
        "s3": {
            "s3SchemaVersion": "1.0",
            "configurationId": "new-upload",
            "bucket": {
                "name": "uploads-bucket",
                "arn": "arn:aws:s3:::uploads-bucket",
                "ownerIdentity": { "principalId": "A3NL1KOZZKExample" }
            },
            "object": {
                "key": "uploads/org-1/file-1.pdf",
                "size": 1024,
                "eTag": "d41d8cd98f00b204e9800998ecf8427e",
                "sequencer": "0055AED6DCD90281E5"
            }
        }
    }]"#;

    #[test]
    fn decodes_full_s3_record() {
        let records = decode_batch(FULL_RECORD.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.bucket(), "uploads-bucket");
        assert_eq!(record.key(), "uploads/org-1/file-1.pdf");
        assert_eq!(record.s3.object.size, 1024);
        assert_eq!(record.s3.object.e_tag, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(record.s3.bucket.owner_identity.principal_id, "A3NL1KOZZKExample");
        assert_eq!(record.user_identity.principal_id, "AWS:AIDAJ");
        assert_eq!(record.s3.configuration_id, "new-upload");
        assert!(record.is_object_created());
    }

    #[test]
    fn decodes_minimal_record() {
        let body = br#"[{"s3":{"bucket":{"name":"b1"},"object":{"key":"k1.pdf"}}}]"#;
        let records = decode_batch(body).unwrap();
        assert_eq!(records[0].bucket(), "b1");
        assert_eq!(records[0].key(), "k1.pdf");
        assert_eq!(records[0].s3.object.size, 0);
        assert!(records[0].is_object_created());
    }

    #[test]
    fn decodes_records_envelope() {
        let body = br#"{"Records":[
            {"s3":{"bucket":{"name":"a"},"object":{"key":"1"}}},
            {"s3":{"bucket":{"name":"b"},"object":{"key":"2"}}}
        ]}"#;
        let records = decode_batch(body).unwrap();
        let keys: Vec<_> = records.iter().map(|r| r.key()).collect();
        assert_eq!(keys, ["1", "2"]);
    }

    #[test]
    fn rejects_malformed_bodies() {
        assert!(matches!(decode_batch(b""), Err(DecodeError::Empty)));
        assert!(matches!(decode_batch(b"  \n"), Err(DecodeError::Empty)));
        assert!(matches!(decode_batch(b"{not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode_batch(b"{\"hello\":1}"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode_batch(b"[{}]"), Err(DecodeError::Malformed(_))));
        // A record missing its key poisons the whole batch.
        let partial = br#"[{"s3":{"bucket":{"name":"a"},"object":{"key":"1"}}},{"s3":{"bucket":{"name":"b"},"object":{}}}]"#;
        assert!(matches!(decode_batch(partial), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn non_creation_events_are_flagged() {
        let record = NotificationRecord {
            event_name: "ObjectRemoved:Delete".into(),
            ..Default::default()
        };
        assert!(!record.is_object_created());
    }
}
