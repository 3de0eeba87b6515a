//! Operation types for expressing planned changes.
//!
//! Changes are recorded as operations, not sent to the remote. Each planning
//! call that succeeds appends exactly one [`Operation`] to the planner's log;
//! apply later replays them against a [`crate::RemoteAccessor`].

use crate::error::Result;
use crate::remote::{ErrorKind, RemoteError, RemoteResult};
use crate::{Error, ItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for an operation.
pub type OperationId = Uuid;

/// Kind of change an operation makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    CreateFolder,
    Copy,
    Rename,
    Move,
    Trash,
    DeletePermanent,
    UploadFile,
    DownloadFile,
}

impl Action {
    /// Actions that bring a new item into existence and mint its identity.
    pub fn is_create_like(self) -> bool {
        matches!(self, Action::CreateFolder | Action::Copy | Action::UploadFile)
    }

    /// Actions whose runs are reordered deepest-first.
    pub fn is_delete(self) -> bool {
        matches!(self, Action::Trash | Action::DeletePermanent)
    }

    /// Actions that get a modified-time precondition on their target.
    pub fn takes_precondition(self) -> bool {
        matches!(
            self,
            Action::Rename
                | Action::Move
                | Action::Trash
                | Action::DeletePermanent
                | Action::Copy
                | Action::DownloadFile
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::CreateFolder => "CREATE_FOLDER",
            Action::Copy => "COPY",
            Action::Rename => "RENAME",
            Action::Move => "MOVE",
            Action::Trash => "TRASH",
            Action::DeletePermanent => "DELETE_PERMANENT",
            Action::UploadFile => "UPLOAD_FILE",
            Action::DownloadFile => "DOWNLOAD_FILE",
        };
        f.write_str(name)
    }
}

/// Optimistic-concurrency guard checked right before an operation executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Precondition {
    /// Remote modified time captured when the plan was built
    pub expected_modified_time: DateTime<Utc>,
}

impl Precondition {
    pub fn modified_at(expected_modified_time: DateTime<Utc>) -> Self {
        Self {
            expected_modified_time,
        }
    }

    /// Compare against the target's current modified time.
    ///
    /// An unknown current time cannot be proven unchanged and fails too.
    pub fn check(&self, actual: Option<DateTime<Utc>>) -> RemoteResult<()> {
        match actual {
            None => Err(RemoteError::new(
                ErrorKind::Conflict,
                "precondition failed: modified time not available",
            )),
            Some(actual) if actual != self.expected_modified_time => Err(RemoteError::new(
                ErrorKind::Conflict,
                format!(
                    "precondition failed: modified time is {actual}, expected {}",
                    self.expected_modified_time
                ),
            )),
            Some(_) => Ok(()),
        }
    }
}

/// A single recorded change.
///
/// Fields that an action does not use stay `None`. Which ones an action
/// requires is enforced by [`Operation::validate_required_fields`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation ID
    pub op_id: OperationId,
    /// Position in the log, strictly increasing
    pub seq: u64,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precondition: Option<Precondition>,
    /// Item acted upon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ItemId>,
    /// Destination folder for creates, copies, uploads and moves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_parent: Option<ItemId>,
    /// Identity minted for the item a create-like action produces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// Download only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
}

impl Operation {
    fn blank(seq: u64, action: Action) -> Self {
        Self {
            op_id: Uuid::new_v4(),
            seq,
            action,
            precondition: None,
            target: None,
            new_parent: None,
            result: None,
            name: None,
            local_path: None,
            overwrite: None,
        }
    }

    pub fn create_folder(seq: u64, parent: ItemId, name: String, result: ItemId) -> Self {
        Self {
            new_parent: Some(parent),
            name: Some(name),
            result: Some(result),
            ..Self::blank(seq, Action::CreateFolder)
        }
    }

    pub fn copy(
        seq: u64,
        source: ItemId,
        new_parent: ItemId,
        name: Option<String>,
        result: ItemId,
    ) -> Self {
        Self {
            target: Some(source),
            new_parent: Some(new_parent),
            name,
            result: Some(result),
            ..Self::blank(seq, Action::Copy)
        }
    }

    pub fn rename(seq: u64, target: ItemId, name: String) -> Self {
        Self {
            target: Some(target),
            name: Some(name),
            ..Self::blank(seq, Action::Rename)
        }
    }

    pub fn move_item(seq: u64, target: ItemId, new_parent: ItemId) -> Self {
        Self {
            target: Some(target),
            new_parent: Some(new_parent),
            ..Self::blank(seq, Action::Move)
        }
    }

    pub fn trash(seq: u64, target: ItemId) -> Self {
        Self {
            target: Some(target),
            ..Self::blank(seq, Action::Trash)
        }
    }

    pub fn delete_permanently(seq: u64, target: ItemId) -> Self {
        Self {
            target: Some(target),
            ..Self::blank(seq, Action::DeletePermanent)
        }
    }

    pub fn upload_file(
        seq: u64,
        local_path: PathBuf,
        parent: ItemId,
        name: Option<String>,
        result: ItemId,
    ) -> Self {
        Self {
            local_path: Some(local_path),
            new_parent: Some(parent),
            name,
            result: Some(result),
            ..Self::blank(seq, Action::UploadFile)
        }
    }

    pub fn download_file(seq: u64, target: ItemId, local_path: PathBuf, overwrite: bool) -> Self {
        Self {
            target: Some(target),
            local_path: Some(local_path),
            overwrite: Some(overwrite),
            ..Self::blank(seq, Action::DownloadFile)
        }
    }

    /// Check that every field this action needs is present.
    ///
    /// A whitespace-only name or an empty path counts as missing.
    pub fn validate_required_fields(&self) -> Result<()> {
        let (target, new_parent, name, local_path, result) = match self.action {
            Action::CreateFolder => (false, true, true, false, true),
            Action::Copy => (true, true, false, false, true),
            Action::Rename => (true, false, true, false, false),
            Action::Move => (true, true, false, false, false),
            Action::Trash | Action::DeletePermanent => (true, false, false, false, false),
            Action::UploadFile => (false, true, false, true, true),
            Action::DownloadFile => (true, false, false, true, false),
        };

        let checks = [
            ("target", target, self.target.is_some()),
            ("new_parent", new_parent, self.new_parent.is_some()),
            (
                "name",
                name,
                self.name.as_deref().is_some_and(|n| !n.trim().is_empty()),
            ),
            (
                "local_path",
                local_path,
                self.local_path
                    .as_deref()
                    .is_some_and(|p| !p.as_os_str().is_empty()),
            ),
            ("result", result, self.result.is_some()),
        ];

        match checks.iter().find(|(_, required, present)| *required && !*present) {
            Some((field, _, _)) => Err(Error::MissingField {
                op_id: self.op_id,
                action: self.action,
                field: *field,
            }),
            None => Ok(()),
        }
    }

    /// Every identity this operation references.
    pub fn references(&self) -> impl Iterator<Item = &ItemId> {
        [&self.target, &self.new_parent, &self.result]
            .into_iter()
            .flatten()
    }
}
