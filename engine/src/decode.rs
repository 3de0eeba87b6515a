//! Strict decoding of Drive-shaped JSON payloads.
//!
//! File resources arrive as loosely-typed JSON. Required fields must be
//! present and well-formed; optional ones may be absent or null but never
//! malformed. Only `parents` and `trashed` have defaults.

use crate::remote::{ErrorKind, RemoteError};
use crate::{ItemId, ItemRecord};
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A payload that does not have the documented shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("expected a JSON object")]
    NotAnObject,

    #[error("field `id` must be a non-empty string")]
    EmptyId,

    #[error("{0}")]
    Json(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::Json(err.to_string())
    }
}

impl From<DecodeError> for RemoteError {
    fn from(err: DecodeError) -> Self {
        RemoteError::new(ErrorKind::Api, format!("malformed payload: {err}"))
    }
}

type Result<T> = std::result::Result<T, DecodeError>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    id: String,
    name: String,
    mime_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    parents: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    trashed: bool,
    #[serde(default, deserialize_with = "rfc3339")]
    modified_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "rfc3339")]
    created_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "size")]
    size: Option<u64>,
    md5_checksum: Option<String>,
}

impl TryFrom<FileResource> for ItemRecord {
    type Error = DecodeError;

    fn try_from(wire: FileResource) -> Result<Self> {
        if wire.id.is_empty() {
            return Err(DecodeError::EmptyId);
        }
        let parents = wire.parents.into_iter().map(ItemId::Remote).collect();
        let mut record = ItemRecord::new(wire.id, wire.name, wire.mime_type, parents);
        record.trashed = wire.trashed;
        record.modified_time = wire.modified_time;
        record.created_time = wire.created_time;
        record.size = wire.size;
        record.md5_checksum = wire.md5_checksum;
        Ok(record)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default, deserialize_with = "null_as_default")]
    files: Vec<Value>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Deserialize)]
struct ErrorReason {
    reason: Option<String>,
}

/// Decode one file resource into a record with remote identities.
pub fn file_resource(value: &Value) -> Result<ItemRecord> {
    // derived structs also accept arrays positionally
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    FileResource::deserialize(value)?.try_into()
}

/// Decode a `files.list` page: `{"files": [...], "nextPageToken": ...}`.
///
/// Returns the records and the token of the next page, if any.
pub fn file_list(value: &Value) -> Result<(Vec<ItemRecord>, Option<String>)> {
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    let page = FileList::deserialize(value)?;
    let files = page.files.iter().map(file_resource).collect::<Result<_>>()?;
    Ok((files, page.next_page_token))
}

/// Classify an HTTP failure from its status and JSON error body.
///
/// Reads `error.message` and the first `error.errors[].reason`. A body that
/// is not the documented shape still classifies by status alone.
pub fn http_error(status: u16, body: &Value) -> RemoteError {
    let Some(detail) = ErrorBody::deserialize(body).ok().map(|b| b.error) else {
        return RemoteError::from_http(status, None, None);
    };
    let message = detail.message.as_deref().filter(|m| !m.is_empty());
    let reason = detail.errors.first().and_then(|e| e.reason.as_deref());
    RemoteError::from_http(status, reason, message)
}

fn null_as_default<'de, D, T>(de: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Option::unwrap_or_default)
}

fn rfc3339<'de, D>(de: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(de)? else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|_| de::Error::custom(format!("not an RFC 3339 timestamp: {raw}")))
}

fn size<'de, D>(de: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    de.deserialize_any(SizeVisitor)
}

/// Drive sends `size` as a decimal string; integers are accepted too.
struct SizeVisitor;

impl<'de> Visitor<'de> for SizeVisitor {
    type Value = Option<u64>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative integer or a string of digits")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
        u64::try_from(v)
            .map(Some)
            .map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
        if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()) {
            return Err(E::invalid_value(Unexpected::Str(v), &self));
        }
        v.parse()
            .map(Some)
            .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, de: D) -> std::result::Result<Self::Value, D::Error> {
        de.deserialize_any(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn decodes_full_resource() {
        let record = file_resource(&json!({
            "id": "F",
            "name": "report.pdf",
            "mimeType": "application/pdf",
            "parents": ["A", "B"],
            "trashed": false,
            "modifiedTime": "2024-03-01T10:00:00.000Z",
            "createdTime": "2024-02-01T09:30:00+02:00",
            "size": "2048",
            "md5Checksum": "abc123"
        }))
        .unwrap();

        assert_eq!(record.id, ItemId::remote("F"));
        assert_eq!(record.parents, vec![ItemId::remote("A"), ItemId::remote("B")]);
        assert_eq!(
            record.modified_time,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(
            record.created_time,
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 7, 30, 0).unwrap())
        );
        assert_eq!(record.size, Some(2048));
        assert_eq!(record.md5_checksum.as_deref(), Some("abc123"));
    }

    #[test]
    fn applies_documented_defaults_only() {
        let record = file_resource(&json!({
            "id": "D",
            "name": "Docs",
            "mimeType": crate::mime::FOLDER
        }))
        .unwrap();
        assert!(record.parents.is_empty());
        assert!(!record.trashed);
        assert_eq!(record.size, None);
        assert_eq!(record.modified_time, None);

        let record = file_resource(&json!({
            "id": "D",
            "name": "Docs",
            "mimeType": crate::mime::FOLDER,
            "parents": null,
            "trashed": null,
            "size": null,
            "modifiedTime": null
        }))
        .unwrap();
        assert!(record.parents.is_empty());
        assert!(!record.trashed);
        assert_eq!(record.size, None);
        assert_eq!(record.modified_time, None);
    }

    #[test]
    fn integer_size_is_accepted() {
        let record = file_resource(&json!({
            "id": "F", "name": "f", "mimeType": "text/plain", "size": 12
        }))
        .unwrap();
        assert_eq!(record.size, Some(12));
    }

    #[test]
    fn rejects_missing_and_malformed_fields() {
        let cases = [
            (json!({"name": "f", "mimeType": "x"}), "missing field `id`"),
            (json!({"id": "F", "mimeType": "x"}), "missing field `name`"),
            (json!({"id": "F", "name": "f"}), "missing field `mimeType`"),
            (json!({"id": "F", "name": 3, "mimeType": "x"}), "expected a string"),
            (
                json!({"id": "F", "name": "f", "mimeType": "x", "parents": "A"}),
                "expected a sequence",
            ),
            (
                json!({"id": "F", "name": "f", "mimeType": "x", "parents": ["A", 1]}),
                "expected a string",
            ),
            (
                json!({"id": "F", "name": "f", "mimeType": "x", "trashed": "yes"}),
                "expected a boolean",
            ),
            (
                json!({"id": "F", "name": "f", "mimeType": "x", "size": "12kb"}),
                "12kb",
            ),
            (
                json!({"id": "F", "name": "f", "mimeType": "x", "size": -1}),
                "-1",
            ),
            (
                json!({"id": "F", "name": "f", "mimeType": "x", "size": 1.5}),
                "a non-negative integer",
            ),
            (
                json!({"id": "F", "name": "f", "mimeType": "x", "modifiedTime": "yesterday"}),
                "not an RFC 3339 timestamp: yesterday",
            ),
            (
                json!({"id": "F", "name": "f", "mimeType": "x", "md5Checksum": 7}),
                "expected a string",
            ),
        ];
        for (payload, fragment) in cases {
            let err = file_resource(&payload).unwrap_err();
            assert!(
                matches!(&err, DecodeError::Json(msg) if msg.contains(fragment)),
                "{payload}: {err}"
            );
        }

        assert_eq!(
            file_resource(&json!({"id": "", "name": "f", "mimeType": "x"})).unwrap_err(),
            DecodeError::EmptyId
        );
        assert_eq!(
            file_resource(&json!(["F", "f", "text/plain"])).unwrap_err(),
            DecodeError::NotAnObject
        );
    }

    #[test]
    fn decode_errors_become_api_errors() {
        let err: RemoteError = DecodeError::EmptyId.into();
        assert_eq!(err.kind, ErrorKind::Api);
        assert!(!err.is_retryable());
        assert!(err.message.starts_with("malformed payload"));
    }

    #[test]
    fn decodes_list_pages() {
        let (files, next) = file_list(&json!({
            "files": [
                {"id": "a", "name": "a", "mimeType": "text/plain"},
                {"id": "b", "name": "b", "mimeType": "text/plain"}
            ],
            "nextPageToken": "page-2"
        }))
        .unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(next.as_deref(), Some("page-2"));

        let (files, next) = file_list(&json!({})).unwrap();
        assert!(files.is_empty());
        assert!(next.is_none());

        assert!(file_list(&json!({"files": [{"id": "a"}]})).is_err());
        assert!(file_list(&json!({"files": {"id": "a"}})).is_err());
        assert_eq!(file_list(&json!([])).unwrap_err(), DecodeError::NotAnObject);
    }

    #[test]
    fn classifies_http_error_bodies() {
        let err = http_error(
            403,
            &json!({
                "error": {
                    "code": 403,
                    "message": "The user's Drive storage quota has been exceeded.",
                    "errors": [{"domain": "usageLimits", "reason": "storageQuotaExceeded"}]
                }
            }),
        );
        assert_eq!(err.kind, ErrorKind::QuotaExceeded);
        assert_eq!(err.reason.as_deref(), Some("storageQuotaExceeded"));
        assert!(err.message.contains("quota"));

        let err = http_error(500, &json!("oops"));
        assert_eq!(err.kind, ErrorKind::Api);
        assert_eq!(err.message, "HTTP error 500");
        assert!(err.is_retryable());

        let err = http_error(404, &json!({"error": {"message": ""}}));
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.reason, None);
    }
}
