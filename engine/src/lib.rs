//! # Canopy Engine
//!
//! Offline planning and transactional apply for remote item trees.
//!
//! This crate keeps a consistent, indexed mirror of a remote folder hierarchy,
//! records intended changes without touching the network, validates each one
//! against the tree's structural rules, and later applies the recorded batch
//! to the remote with optimistic-concurrency checks.
//!
//! ## Design Principles
//!
//! - **Plan offline**: Every planning call is validated against the local
//!   mirror and nothing is sent until a plan is applied
//! - **All-or-nothing calls**: A rejected planning call leaves no trace
//! - **Deterministic order**: Plans apply in sequence order, with contiguous
//!   deletes reordered deepest-first
//! - **No IO in the core**: The remote is reached only through
//!   [`RemoteAccessor`]
//!
//! ## Core Concepts
//!
//! ### Identities
//!
//! Items are addressed by [`ItemId`]. Items that already exist remotely use
//! their remote id; items created in-plan get a pending token that apply
//! maps to the remote id once the creating operation has run.
//!
//! ### Snapshot
//!
//! A [`Snapshot`] holds every [`ItemRecord`] under the open root together with
//! parent → children and parent → name → children indexes.
//!
//! ### Planning
//!
//! The [`Planner`] validates each call, updates its working snapshot and
//! appends an [`Operation`] to its log. [`Planner::build_plan`] freezes the
//! log into a [`Plan`] with modified-time [`Precondition`]s and an apply order.
//!
//! ### Apply
//!
//! The [`Manager`] runs a plan through the apply orchestrator. Fatal remote
//! errors (authorization, permission, invalid argument) and local errors
//! propagate; any other failure halts the run and is reported in the
//! [`SyncResult`]. Transient failures are retried by wrapping the accessor in
//! [`Retrying`].
//!
//! ## Quick Start
//!
//! ```rust
//! use canopy_engine::{Action, ItemId, ItemRecord, Planner};
//!
//! // 1. Load the root and its descendants
//! let root = ItemId::remote("root");
//! let mut planner = Planner::from_records(
//!     root.clone(),
//!     [
//!         ItemRecord::folder("root", "Projects", vec![]),
//!         ItemRecord::new("doc", "notes.txt", "text/plain", vec![root.clone()]),
//!     ],
//! )
//! .unwrap();
//!
//! // 2. Plan changes
//! let archive = planner.create_folder("Archive", &root).unwrap();
//! planner.move_item(&ItemId::remote("doc"), &archive).unwrap();
//!
//! // 3. Build a plan for review
//! let plan = planner.build_plan();
//! assert_eq!(plan.operations[0].action, Action::CreateFolder);
//! assert_eq!(plan.operations[1].action, Action::Move);
//! ```

pub mod apply;
pub mod config;
pub mod decode;
pub mod error;
pub mod item;
pub mod manager;
pub mod mime;
pub mod operation;
pub mod outcome;
pub mod plan;
pub mod planner;
pub mod remote;
pub mod retry;
pub mod snapshot;
pub mod validate;

// Re-export main types at crate root
pub use apply::{check_plan, Execution, Orchestrator};
pub use config::{AccessConfig, CallClass, ConfigError};
pub use decode::DecodeError;
pub use error::{Error, Result, Role, Violation};
pub use item::{ItemId, ItemRecord, RemoteId};
pub use manager::Manager;
pub use operation::{Action, Operation, OperationId, Precondition};
pub use outcome::{Failure, OperationResult, OperationStatus, Summary, SyncResult, SyncStatus};
pub use plan::Plan;
pub use planner::Planner;
pub use remote::{ErrorKind, RemoteAccessor, RemoteError, RemoteResult};
pub use retry::{Backoff, RetryPolicy, Retrying};
pub use snapshot::Snapshot;
