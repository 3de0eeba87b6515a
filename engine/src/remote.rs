//! The remote accessor contract.
//!
//! The engine never talks to the network itself. Everything it needs from the
//! backing store goes through [`RemoteAccessor`], whose calls block and fail
//! with a classified [`RemoteError`]. Transient failures are retried on the
//! accessor side (see [`crate::Retrying`]); the apply orchestrator never
//! retries.

use crate::ItemRecord;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Reason keywords that turn a 403 into a quota failure.
const QUOTA_KEYWORDS: &[&str] = &[
    "quota",
    "ratelimitexceeded",
    "userratelimitexceeded",
    "dailylimitexceeded",
    "usagelimits",
    "storagequotaexceeded",
];

/// Classification of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Credentials missing, expired or rejected
    Auth,
    /// Access denied for a reason other than quota
    PermissionDenied,
    /// Storage or usage quota exhausted
    QuotaExceeded,
    NotFound,
    /// Explicit conflict or failed precondition
    Conflict,
    RateLimited,
    /// The request itself was malformed or refused as invalid
    InvalidArgument,
    /// Transport failure or timeout
    Network,
    /// Anything the store reported that fits no other kind
    Api,
}

impl ErrorKind {
    /// Fatal kinds abort an apply run; the rest only halt it.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::Auth | ErrorKind::PermissionDenied | ErrorKind::InvalidArgument
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Auth => "authorization failed",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::QuotaExceeded => "quota exceeded",
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::Network => "network error",
            ErrorKind::Api => "api error",
        };
        f.write_str(name)
    }
}

/// A classified failure reported by a remote accessor.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status, when the failure came from an HTTP response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Store-specific failure reason (e.g. `storageQuotaExceeded`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            reason: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Classify an HTTP failure.
    ///
    /// A 403 is a quota failure when its reason mentions a quota keyword and a
    /// permission failure otherwise. Unknown statuses are [`ErrorKind::Api`].
    pub fn from_http(status: u16, reason: Option<&str>, message: Option<&str>) -> Self {
        let kind = match status {
            400 => ErrorKind::InvalidArgument,
            401 => ErrorKind::Auth,
            403 if reason.is_some_and(is_quota_reason) => ErrorKind::QuotaExceeded,
            403 => ErrorKind::PermissionDenied,
            404 => ErrorKind::NotFound,
            409 | 412 => ErrorKind::Conflict,
            429 => ErrorKind::RateLimited,
            _ => ErrorKind::Api,
        };
        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP error {status}"));
        let mut err = Self::new(kind, message).with_status(status);
        if let Some(reason) = reason {
            err = err.with_reason(reason);
        }
        err
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    /// Whether the accessor should retry the call that produced this error.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ErrorKind::RateLimited | ErrorKind::Network => true,
            ErrorKind::Api => self.status.is_some_and(|s| (500..600).contains(&s)),
            _ => false,
        }
    }
}

fn is_quota_reason(reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    QUOTA_KEYWORDS.iter().any(|key| reason.contains(key))
}

/// Result type for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Blocking access to a flat, id-addressed remote store.
///
/// Returned records use remote identities for themselves and their parents.
pub trait RemoteAccessor {
    /// Fetch one item.
    fn get(&self, id: &str) -> RemoteResult<ItemRecord>;

    /// List the non-trashed direct children of a folder.
    fn list_children(&self, parent_id: &str) -> RemoteResult<Vec<ItemRecord>>;

    /// List every non-trashed descendant of `root_id`, breadth-first.
    ///
    /// The root itself is excluded. Each folder is listed once even when it is
    /// reachable through several parents.
    fn list_tree(&self, root_id: &str) -> RemoteResult<Vec<ItemRecord>> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([root_id.to_string()]);

        while let Some(parent) = queue.pop_front() {
            if !seen.insert(parent.clone()) {
                continue;
            }
            for child in self.list_children(&parent)? {
                if child.is_folder() {
                    if let Some(id) = child.remote_id() {
                        queue.push_back(id.to_string());
                    }
                }
                items.push(child);
            }
        }

        Ok(items)
    }

    fn create_folder(&self, name: &str, parent_id: &str) -> RemoteResult<ItemRecord>;

    fn rename(&self, id: &str, new_name: &str) -> RemoteResult<ItemRecord>;

    /// Replace all existing parents of `id` with `new_parent_id`.
    fn move_item(&self, id: &str, new_parent_id: &str) -> RemoteResult<ItemRecord>;

    fn copy(
        &self,
        id: &str,
        new_parent_id: &str,
        new_name: Option<&str>,
    ) -> RemoteResult<ItemRecord>;

    fn trash(&self, id: &str) -> RemoteResult<()>;

    fn delete_permanently(&self, id: &str) -> RemoteResult<()>;

    fn upload_file(
        &self,
        local_path: &Path,
        parent_id: &str,
        name: Option<&str>,
    ) -> RemoteResult<ItemRecord>;

    /// Download file content to `local_path`.
    ///
    /// Implementations refuse with [`ErrorKind::InvalidArgument`] when the
    /// destination exists and `overwrite` is false, and for folders and
    /// native document kinds.
    fn download_file(&self, id: &str, local_path: &Path, overwrite: bool) -> RemoteResult<()>;
}
