//! Storage notification events.
//!
//! The handlers consume the S3 notification shape; only the fields they need
//! are modelled and everything else in a record is ignored:
//!
//! ```json
//! {"Records": [{"s3": {"bucket": {"name": "uploads"},
//!                      "object": {"key": "media/images/tags/bread/orig.jpg"}}}]}
//! ```
//!
//! A source key `<folder>/<file>` maps to the destination folder `<folder>`:
//! derived objects are written below it and the whole folder is removed when
//! the source is deleted.

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("malformed event: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event contains no records")]
    NoRecords,
    #[error("no filename found in object key {0:?}")]
    NoFileName(String),
    #[error("object key {0:?} has no folder")]
    NoFolder(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObjectRef {
    pub key: String,
}

impl EventRecord {
    pub fn bucket(&self) -> &str {
        &self.s3.bucket.name
    }

    pub fn key(&self) -> &str {
        &self.s3.object.key
    }
}

impl StorageEvent {
    /// Parse an event and require at least one record.
    pub fn from_json(json: &str) -> Result<Self, EventError> {
        let event: StorageEvent = serde_json::from_str(json)?;
        if event.records.is_empty() {
            return Err(EventError::NoRecords);
        }
        Ok(event)
    }

    /// Event for a single object, as the local commands build it.
    pub fn single(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            records: vec![EventRecord {
                s3: S3Entity {
                    bucket: BucketRef { name: bucket.into() },
                    object: ObjectRef { key: key.into() },
                },
            }],
        }
    }
}

/// Split `media/images/tags/bread/orig.jpg` into
/// `("media/images/tags/bread", "orig.jpg")`.
///
/// Keys ending in `/` name no file. Keys without any folder are rejected
/// too: their destination folder would be the whole bucket.
pub fn split_key(key: &str) -> Result<(&str, &str), EventError> {
    if key.is_empty() || key.ends_with('/') {
        return Err(EventError::NoFileName(key.to_string()));
    }
    match key.rsplit_once('/') {
        Some((folder, file)) if !folder.is_empty() => Ok((folder, file)),
        _ => Err(EventError::NoFolder(key.to_string())),
    }
}

/// Folder in the destination bucket that holds everything derived from `key`.
pub fn destination_folder(key: &str) -> Result<&str, EventError> {
    split_key(key).map(|(folder, _)| folder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_notification_and_ignores_extra_fields() {
        let json = r#"{
            "Records": [{
                "eventVersion": "2.1",
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": "uploads", "arn": "arn:aws:s3:::uploads"},
                    "object": {"key": "media/images/tags/bread/orig.jpg", "size": 1024}
                }
            }]
        }"#;
        let event = StorageEvent::from_json(json).unwrap();
        assert_eq!(event.records.len(), 1);
        assert_eq!(event.records[0].bucket(), "uploads");
        assert_eq!(event.records[0].key(), "media/images/tags/bread/orig.jpg");
    }

    #[test]
    fn keeps_every_record_in_order() {
        let json = r#"{"Records": [
            {"s3": {"bucket": {"name": "a"}, "object": {"key": "x/1.jpg"}}},
            {"s3": {"bucket": {"name": "b"}, "object": {"key": "y/2.jpg"}}}
        ]}"#;
        let event = StorageEvent::from_json(json).unwrap();
        let keys: Vec<&str> = event.records.iter().map(EventRecord::key).collect();
        assert_eq!(keys, vec!["x/1.jpg", "y/2.jpg"]);
    }

    #[test]
    fn empty_and_missing_records_are_errors() {
        assert!(matches!(
            StorageEvent::from_json(r#"{"Records": []}"#),
            Err(EventError::NoRecords)
        ));
        assert!(matches!(
            StorageEvent::from_json("{}"),
            Err(EventError::NoRecords)
        ));
        assert!(matches!(
            StorageEvent::from_json("not json"),
            Err(EventError::Json(_))
        ));
    }

    #[test]
    fn split_key_separates_folder_and_file() {
        assert_eq!(
            split_key("media/images/tags/bread/orig.jpg").unwrap(),
            ("media/images/tags/bread", "orig.jpg")
        );
        assert_eq!(split_key("a/b.png").unwrap(), ("a", "b.png"));
    }

    #[test]
    fn split_key_rejects_folders_and_bare_files() {
        assert!(matches!(split_key("tags/bread/"), Err(EventError::NoFileName(_))));
        assert!(matches!(split_key(""), Err(EventError::NoFileName(_))));
        assert!(matches!(split_key("orig.jpg"), Err(EventError::NoFolder(_))));
        assert!(matches!(split_key("/orig.jpg"), Err(EventError::NoFolder(_))));
    }

    #[test]
    fn destination_folder_drops_the_file() {
        assert_eq!(
            destination_folder("media/images/tags/bread/orig.jpeg").unwrap(),
            "media/images/tags/bread"
        );
    }

    #[test]
    fn single_builds_one_record() {
        let event = StorageEvent::single("uploads", "a/b.jpg");
        assert_eq!(event.records.len(), 1);
        assert_eq!(event.records[0].bucket(), "uploads");
    }
}
