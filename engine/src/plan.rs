//! Immutable, reviewable plans and the rules that order them.

use crate::error::Result;
use crate::{Error, ItemId, Operation, OperationId, Snapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A frozen batch of operations ready to be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub plan_id: Uuid,
    /// Root the operations were planned under
    pub remote_root_id: ItemId,
    pub created_at: DateTime<Utc>,
    /// Operations in sequence order
    pub operations: Vec<Operation>,
    /// Execution order, which may differ from sequence order
    pub apply_order: Vec<OperationId>,
}

impl Plan {
    /// Freeze a copy of `ops` into a plan rooted at `root`.
    ///
    /// Preconditions are taken from the modified times recorded in `snapshot`
    /// and delete runs are ordered by depth below `root`.
    pub fn build(root: &ItemId, ops: &[Operation], snapshot: &Snapshot) -> Self {
        let mut operations = ops.to_vec();
        operations.sort_by_key(|op| op.seq);
        attach_default_preconditions(&mut operations, snapshot);

        let depths = snapshot.depths_from(root);
        let apply_order = build_apply_order(&operations, &depths);

        Self {
            plan_id: Uuid::new_v4(),
            remote_root_id: root.clone(),
            created_at: Utc::now(),
            operations,
            apply_order,
        }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Look up an operation by id.
    pub fn operation(&self, op_id: &OperationId) -> Option<&Operation> {
        self.operations.iter().find(|op| &op.op_id == op_id)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidPlanJson(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidPlanJson(e.to_string()))
    }

    /// Parse a plan exported with [`Plan::to_json`].
    ///
    /// Only the shape is checked here; apply re-validates the contents.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidPlanJson(e.to_string()))
    }
}

/// Attach a modified-time precondition to every operation whose action takes
/// one and whose target has a known modified time in `snapshot`.
pub fn attach_default_preconditions(operations: &mut [Operation], snapshot: &Snapshot) {
    for op in operations {
        if !op.action.takes_precondition() {
            continue;
        }
        let Some(target) = &op.target else {
            continue;
        };
        let modified = snapshot.get(target).ok().and_then(|r| r.modified_time);
        if let Some(modified) = modified {
            op.precondition = Some(crate::Precondition::modified_at(modified));
        }
    }
}

/// Compute the execution order.
///
/// Sequence order, except that each maximal run of consecutive deletes is
/// sorted deepest-first (ties by sequence) when every target in the run has a
/// known depth. Deletes in different runs never swap.
pub fn build_apply_order(
    operations: &[Operation],
    depths: &BTreeMap<ItemId, usize>,
) -> Vec<OperationId> {
    let mut ops: Vec<&Operation> = operations.iter().collect();
    ops.sort_by_key(|op| op.seq);

    let mut order = Vec::with_capacity(ops.len());
    for run in ops.chunk_by(|a, b| a.action.is_delete() == b.action.is_delete()) {
        if run[0].action.is_delete() {
            order.extend(order_delete_run(run, depths));
        } else {
            order.extend(run.iter().map(|op| op.op_id));
        }
    }
    order
}

fn order_delete_run(
    run: &[&Operation],
    depths: &BTreeMap<ItemId, usize>,
) -> Vec<OperationId> {
    let depth_of = |op: &Operation| op.target.as_ref().and_then(|t| depths.get(t)).copied();

    let known: Option<Vec<(usize, &Operation)>> = run
        .iter()
        .map(|op| depth_of(*op).map(|depth| (depth, *op)))
        .collect();

    match known {
        Some(mut known) => {
            known.sort_by(|(da, a), (db, b)| db.cmp(da).then(a.seq.cmp(&b.seq)));
            known.into_iter().map(|(_, op)| op.op_id).collect()
        }
        None => run.iter().map(|op| op.op_id).collect(),
    }
}
