//! Error types for the canopy engine.
//!
//! Planning and apply bookkeeping fail with [`Error`]. Failures reported by a
//! remote accessor carry a [`RemoteError`] whose [`ErrorKind`] decides whether
//! an apply run aborts or only halts.
//!
//! [`ErrorKind`]: crate::ErrorKind

use crate::{Action, ItemId, OperationId, RemoteError};
use std::fmt;
use thiserror::Error;

/// Role an identity plays in a rejected planning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Item,
    Target,
    Parent,
    NewParent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Item => write!(f, "item"),
            Role::Target => write!(f, "target"),
            Role::Parent => write!(f, "parent"),
            Role::NewParent => write!(f, "new parent"),
        }
    }
}

/// Structural invariant a planning call would break.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("{0} does not exist")]
    Missing(Role),

    #[error("{0} must be a folder")]
    NotFolder(Role),

    #[error("root is protected from {0}")]
    RootProtected(Action),

    #[error("{0} is already scheduled for deletion")]
    Tombstoned(Role),

    #[error("items with more than one parent cannot be moved")]
    MultiParentMove,

    #[error("move would create a cycle")]
    MoveCycle,

    #[error("folders cannot be copied")]
    FolderCopy,

    #[error("upload needs a name or a local path ending in a file name")]
    UnnamedUpload,
}

/// All possible errors from the canopy engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Planning errors
    #[error("validation failed, {violation}: {id}")]
    Validation { violation: Violation, id: ItemId },

    #[error("operation {op_id} ({action}) is missing required field `{field}`")]
    MissingField {
        op_id: OperationId,
        action: Action,
        field: &'static str,
    },

    // State errors
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unresolved item reference: {0}")]
    Unresolved(ItemId),

    #[error("malformed plan: {0}")]
    MalformedPlan(String),

    #[error("invalid plan json: {0}")]
    InvalidPlanJson(String),

    #[error("root must be a folder: {0}")]
    RootNotFolder(String),

    // Remote errors
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl Error {
    pub(crate) fn validation(violation: Violation, id: &ItemId) -> Self {
        Error::Validation {
            violation,
            id: id.clone(),
        }
    }

    /// The violated invariant, for validation failures.
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Error::Validation { violation, .. } => Some(violation),
            _ => None,
        }
    }

    /// Whether this error aborts an apply run instead of only halting it.
    ///
    /// Local errors always abort: they mean the plan or the engine state is
    /// broken, not that the remote disagreed.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Remote(err) => err.is_fatal(),
            _ => true,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
