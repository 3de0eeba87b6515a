//! Result records produced by an apply run.

use crate::remote::{ErrorKind, RemoteError};
use crate::{Action, ItemId, Operation, OperationId, RemoteId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
}

/// Why an operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&RemoteError> for Failure {
    fn from(err: &RemoteError) -> Self {
        Self {
            kind: err.kind,
            message: err.message.clone(),
            status: err.status,
            reason: err.reason.clone(),
        }
    }
}

/// Outcome of one attempted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub op_id: OperationId,
    pub seq: u64,
    pub action: Action,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    /// Identity the operation minted, for create-like actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ItemId>,
    /// Remote id the created item received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_remote_id: Option<RemoteId>,
}

impl OperationResult {
    pub fn success(op: &Operation, result_remote_id: Option<RemoteId>) -> Self {
        Self {
            op_id: op.op_id,
            seq: op.seq,
            action: op.action,
            status: OperationStatus::Success,
            failure: None,
            result: op.result.clone(),
            result_remote_id,
        }
    }

    pub fn failed(op: &Operation, err: &RemoteError) -> Self {
        Self {
            op_id: op.op_id,
            seq: op.seq,
            action: op.action,
            status: OperationStatus::Failed,
            failure: Some(err.into()),
            result: op.result.clone(),
            result_remote_id: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }
}

/// Counters over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub success: usize,
    pub failed: usize,
    /// Operations never attempted because the run stopped
    pub skipped: usize,
    /// 1 when reloading the root after the run failed
    pub refresh_failed: usize,
}

impl Summary {
    pub fn tally(results: &[OperationResult], planned: usize) -> Self {
        let success = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - success;
        Self {
            success,
            failed,
            skipped: planned.saturating_sub(results.len()),
            refresh_failed: 0,
        }
    }
}

/// Outcome of applying a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub status: SyncStatus,
    /// Operation the run stopped at, if it stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_op_id: Option<OperationId>,
    /// Results in execution order
    pub results: Vec<OperationResult>,
    /// Remote ids learned for pending identities
    pub id_map: BTreeMap<Uuid, RemoteId>,
    pub summary: Summary,
    pub snapshot_refreshed: bool,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }

    /// Remote id assigned to a pending identity during the run.
    pub fn remote_id_for<'a>(&'a self, id: &'a ItemId) -> Option<&'a str> {
        match id {
            ItemId::Remote(remote) => Some(remote),
            ItemId::Pending(token) => self.id_map.get(token).map(String::as_str),
        }
    }

    /// Result recorded for an operation, if it was attempted.
    pub fn result_for(&self, op_id: &OperationId) -> Option<&OperationResult> {
        self.results.iter().find(|r| &r.op_id == op_id)
    }
}
