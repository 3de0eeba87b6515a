//! Item identities and records.

use crate::mime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier assigned by the remote store.
pub type RemoteId = String;

/// Virtual identity of an item within a planning session.
///
/// Items that exist remotely when the snapshot is built are identified by
/// their remote id, so virtual and remote identity coincide. Items created by
/// a planned operation carry a pending token until apply learns the id the
/// remote assigned to them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum ItemId {
    /// Exists remotely under this id
    Remote(RemoteId),
    /// Created in-plan, not yet known to the remote
    Pending(Uuid),
}

impl ItemId {
    /// Identity of an item that already exists remotely.
    pub fn remote(id: impl Into<RemoteId>) -> Self {
        ItemId::Remote(id.into())
    }

    /// Mint a fresh pending identity.
    pub fn mint() -> Self {
        ItemId::Pending(Uuid::new_v4())
    }

    /// The remote id, if this identity is already resolved.
    pub fn as_remote(&self) -> Option<&str> {
        match self {
            ItemId::Remote(id) => Some(id),
            ItemId::Pending(_) => None,
        }
    }

    /// The pending token, if the item only exists in-plan.
    pub fn as_pending(&self) -> Option<Uuid> {
        match self {
            ItemId::Remote(_) => None,
            ItemId::Pending(token) => Some(*token),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ItemId::Pending(_))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Remote(id) => write!(f, "{id}"),
            ItemId::Pending(token) => write!(f, "pending:{token}"),
        }
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        ItemId::Remote(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        ItemId::Remote(id)
    }
}

/// A file or folder as seen by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    /// Virtual identity
    pub id: ItemId,
    /// Display name (not unique within a folder)
    pub name: String,
    /// Type tag; see [`crate::mime`]
    pub mime_type: String,
    /// Parent identities; more than one for multi-parented items
    pub parents: Vec<ItemId>,
    /// Trashed remotely, or scheduled for trash/delete in this session
    #[serde(default)]
    pub trashed: bool,
    pub modified_time: Option<DateTime<Utc>>,
    pub created_time: Option<DateTime<Utc>>,
    /// Size in bytes, absent for folders and native documents
    pub size: Option<u64>,
    pub md5_checksum: Option<String>,
}

impl ItemRecord {
    /// Create a record with no timestamps or content metadata.
    pub fn new(
        id: impl Into<ItemId>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        parents: Vec<ItemId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            parents,
            trashed: false,
            modified_time: None,
            created_time: None,
            size: None,
            md5_checksum: None,
        }
    }

    /// Create a folder record.
    pub fn folder(id: impl Into<ItemId>, name: impl Into<String>, parents: Vec<ItemId>) -> Self {
        Self::new(id, name, mime::FOLDER, parents)
    }

    pub fn with_modified_time(mut self, modified: DateTime<Utc>) -> Self {
        self.modified_time = Some(modified);
        self
    }

    /// The remote id, present once the item exists remotely.
    pub fn remote_id(&self) -> Option<&str> {
        self.id.as_remote()
    }

    pub fn is_folder(&self) -> bool {
        mime::is_folder(&self.mime_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_identity_is_its_own_remote_id() {
        let record = ItemRecord::new("F", "file.txt", "text/plain", vec!["A".into()]);
        assert_eq!(record.remote_id(), Some("F"));
        assert!(!record.id.is_pending());
        assert!(!record.is_folder());
    }

    #[test]
    fn pending_identity_has_no_remote_id() {
        let id = ItemId::mint();
        let record = ItemRecord::folder(id.clone(), "X", vec!["root".into()]);
        assert_eq!(record.remote_id(), None);
        assert!(record.is_folder());
        assert!(id.as_pending().is_some());
        assert!(id.to_string().starts_with("pending:"));
    }

    #[test]
    fn minted_identities_are_distinct() {
        assert_ne!(ItemId::mint(), ItemId::mint());
    }

    #[test]
    fn identity_serialization_format() {
        let json = serde_json::to_string(&ItemId::remote("abc")).unwrap();
        assert_eq!(json, r#"{"kind":"remote","id":"abc"}"#);

        let pending = ItemId::mint();
        let json = serde_json::to_string(&pending).unwrap();
        assert!(json.contains("\"pending\""));
        let parsed: ItemId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, pending);
    }
}
