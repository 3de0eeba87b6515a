//! Apply - executes a plan against a remote accessor.
//!
//! Operations run one at a time in the plan's apply order. Pending identities
//! are resolved through an id map filled in as create-like operations succeed.
//! A fatal error aborts the run and propagates; any other remote error is
//! recorded and halts the run. Nothing here retries.

use crate::error::Result;
use crate::outcome::OperationResult;
use crate::remote::RemoteAccessor;
use crate::{Action, Error, ItemId, ItemRecord, Operation, OperationId, Plan, RemoteId};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// What a completed (possibly halted) run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Results in execution order
    pub results: Vec<OperationResult>,
    /// Operation the run halted at
    pub stopped_op_id: Option<OperationId>,
    /// Remote ids learned for pending identities
    pub id_map: BTreeMap<Uuid, RemoteId>,
    /// Number of operations the plan scheduled
    pub planned: usize,
}

/// Runs plans against one accessor.
pub struct Orchestrator<'a, A: ?Sized> {
    remote: &'a A,
    id_map: BTreeMap<Uuid, RemoteId>,
}

impl<'a, A: RemoteAccessor + ?Sized> Orchestrator<'a, A> {
    pub fn new(remote: &'a A) -> Self {
        Self {
            remote,
            id_map: BTreeMap::new(),
        }
    }

    /// Execute `plan`, which must have been built under `root`.
    ///
    /// Every operation is checked before the first remote call. Each run
    /// starts with an empty id map.
    pub fn run(mut self, root: &ItemId, plan: &Plan) -> Result<Execution> {
        let ops = index_plan(root, plan)?;

        let mut results = Vec::with_capacity(plan.apply_order.len());
        let mut stopped_op_id = None;

        for op_id in &plan.apply_order {
            let op = ops[op_id];
            match self.apply_one(op) {
                Ok(remote_id) => {
                    debug!(op_id = %op.op_id, action = %op.action, "operation applied");
                    results.push(OperationResult::success(op, remote_id));
                }
                Err(Error::Remote(err)) if !err.is_fatal() => {
                    warn!(op_id = %op.op_id, action = %op.action, error = %err, "apply halted");
                    results.push(OperationResult::failed(op, &err));
                    stopped_op_id = Some(op.op_id);
                    break;
                }
                Err(err) => {
                    error!(op_id = %op.op_id, action = %op.action, error = %err, "apply aborted");
                    return Err(err);
                }
            }
        }

        Ok(Execution {
            results,
            stopped_op_id,
            id_map: self.id_map,
            planned: plan.apply_order.len(),
        })
    }

    /// Execute one operation, returning the remote id it created, if any.
    fn apply_one(&mut self, op: &Operation) -> Result<Option<RemoteId>> {
        if let (Some(precondition), Some(target)) = (&op.precondition, &op.target) {
            let target = self.resolve(target)?;
            let current = self.remote.get(&target)?;
            precondition.check(current.modified_time)?;
        }

        let created = match op.action {
            Action::CreateFolder => {
                let parent = self.resolve_field(&op.new_parent)?;
                let name = op.name.as_deref().unwrap_or_default();
                Some(self.remote.create_folder(name, &parent)?)
            }
            Action::Copy => {
                let source = self.resolve_field(&op.target)?;
                let parent = self.resolve_field(&op.new_parent)?;
                Some(self.remote.copy(&source, &parent, op.name.as_deref())?)
            }
            Action::Rename => {
                let target = self.resolve_field(&op.target)?;
                let name = op.name.as_deref().unwrap_or_default();
                self.remote.rename(&target, name)?;
                None
            }
            Action::Move => {
                let target = self.resolve_field(&op.target)?;
                let parent = self.resolve_field(&op.new_parent)?;
                self.remote.move_item(&target, &parent)?;
                None
            }
            Action::Trash => {
                self.remote.trash(&self.resolve_field(&op.target)?)?;
                None
            }
            Action::DeletePermanent => {
                self.remote
                    .delete_permanently(&self.resolve_field(&op.target)?)?;
                None
            }
            Action::UploadFile => {
                let parent = self.resolve_field(&op.new_parent)?;
                let path = op.local_path.as_deref().unwrap_or(std::path::Path::new(""));
                Some(self.remote.upload_file(path, &parent, op.name.as_deref())?)
            }
            Action::DownloadFile => {
                let target = self.resolve_field(&op.target)?;
                let path = op.local_path.as_deref().unwrap_or(std::path::Path::new(""));
                self.remote
                    .download_file(&target, path, op.overwrite.unwrap_or(false))?;
                None
            }
        };

        let Some(record) = created else {
            return Ok(None);
        };
        let remote_id = returned_id(op, &record)?;
        if let Some(ItemId::Pending(token)) = &op.result {
            self.id_map.insert(*token, remote_id.clone());
        }
        Ok(Some(remote_id))
    }

    fn resolve(&self, id: &ItemId) -> Result<RemoteId> {
        match id {
            ItemId::Remote(remote) => Ok(remote.clone()),
            ItemId::Pending(token) => self
                .id_map
                .get(token)
                .cloned()
                .ok_or_else(|| Error::Unresolved(id.clone())),
        }
    }

    fn resolve_field(&self, id: &Option<ItemId>) -> Result<RemoteId> {
        match id {
            Some(id) => self.resolve(id),
            None => Err(Error::InvalidState("operation references no item".into())),
        }
    }
}

/// Remote id of a record an accessor handed back for a created item.
///
/// Without one, later operations cannot reach the item, so the run aborts.
fn returned_id(op: &Operation, record: &ItemRecord) -> Result<RemoteId> {
    record.remote_id().map(str::to_string).ok_or_else(|| {
        Error::InvalidState(format!(
            "remote returned no id for the item created by {} ({})",
            op.op_id, op.action
        ))
    })
}

/// Reject a plan that cannot run under `root`. Makes no remote calls.
pub fn check_plan(root: &ItemId, plan: &Plan) -> Result<()> {
    index_plan(root, plan).map(|_| ())
}

/// Validate a plan before any remote call and index its operations.
fn index_plan<'p>(root: &ItemId, plan: &'p Plan) -> Result<HashMap<OperationId, &'p Operation>> {
    if &plan.remote_root_id != root {
        return Err(Error::MalformedPlan(format!(
            "plan root {} does not match open root {root}",
            plan.remote_root_id
        )));
    }

    let mut ops = HashMap::with_capacity(plan.operations.len());
    for op in &plan.operations {
        if ops.insert(op.op_id, op).is_some() {
            return Err(Error::MalformedPlan(format!("duplicate op id {}", op.op_id)));
        }
        op.validate_required_fields()?;
        if op.action.is_create_like() && !op.result.as_ref().is_some_and(ItemId::is_pending) {
            return Err(Error::MalformedPlan(format!(
                "operation {} must mint a pending result",
                op.op_id
            )));
        }
    }

    for op_id in &plan.apply_order {
        if !ops.contains_key(op_id) {
            return Err(Error::MalformedPlan(format!(
                "apply order names unknown op id {op_id}"
            )));
        }
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, ItemRecord, RemoteError, RemoteResult, Snapshot};
    use chrono::{DateTime, TimeZone, Utc};
    use std::cell::RefCell;
    use std::path::Path;

    /// Accessor that records calls and fails on demand.
    #[derive(Default)]
    struct Script {
        calls: RefCell<Vec<String>>,
        fail_on: Option<(&'static str, RemoteError)>,
        modified: Option<DateTime<Utc>>,
        /// Hand back created folders without a remote id
        unresolved_creates: bool,
    }

    impl Script {
        fn log(&self, call: String) -> RemoteResult<()> {
            self.calls.borrow_mut().push(call.clone());
            match &self.fail_on {
                Some((prefix, err)) if call.starts_with(prefix) => Err(err.clone()),
                _ => Ok(()),
            }
        }

        fn record(&self, id: &str) -> ItemRecord {
            let mut record = ItemRecord::new(id, id, "text/plain", vec![]);
            record.modified_time = self.modified;
            record
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl RemoteAccessor for Script {
        fn get(&self, id: &str) -> RemoteResult<ItemRecord> {
            self.log(format!("get {id}"))?;
            Ok(self.record(id))
        }
        fn list_children(&self, _: &str) -> RemoteResult<Vec<ItemRecord>> {
            Ok(vec![])
        }
        fn create_folder(&self, name: &str, parent: &str) -> RemoteResult<ItemRecord> {
            self.log(format!("create_folder {name} {parent}"))?;
            let mut record = self.record(&format!("new-{name}"));
            if self.unresolved_creates {
                record.id = ItemId::mint();
            }
            Ok(record)
        }
        fn rename(&self, id: &str, name: &str) -> RemoteResult<ItemRecord> {
            self.log(format!("rename {id} {name}"))?;
            Ok(self.record(id))
        }
        fn move_item(&self, id: &str, parent: &str) -> RemoteResult<ItemRecord> {
            self.log(format!("move {id} {parent}"))?;
            Ok(self.record(id))
        }
        fn copy(&self, id: &str, parent: &str, _: Option<&str>) -> RemoteResult<ItemRecord> {
            self.log(format!("copy {id} {parent}"))?;
            Ok(self.record(&format!("copy-of-{id}")))
        }
        fn trash(&self, id: &str) -> RemoteResult<()> {
            self.log(format!("trash {id}"))
        }
        fn delete_permanently(&self, id: &str) -> RemoteResult<()> {
            self.log(format!("delete {id}"))
        }
        fn upload_file(&self, _: &Path, parent: &str, _: Option<&str>) -> RemoteResult<ItemRecord> {
            self.log(format!("upload {parent}"))?;
            Ok(self.record("uploaded"))
        }
        fn download_file(&self, id: &str, _: &Path, _: bool) -> RemoteResult<()> {
            self.log(format!("download {id}"))
        }
    }

    fn id(raw: &str) -> ItemId {
        ItemId::remote(raw)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn plan(ops: Vec<Operation>) -> Plan {
        let snapshot = Snapshot::from_records([ItemRecord::folder("root", "ROOT", vec![])]);
        Plan::build(&id("root"), &ops, &snapshot)
    }

    #[test]
    fn pending_identities_resolve_through_the_id_map() {
        let x = ItemId::mint();
        let plan = plan(vec![
            Operation::create_folder(0, id("root"), "X".into(), x.clone()),
            Operation::move_item(1, id("F"), x.clone()),
        ]);
        let remote = Script::default();
        let execution = Orchestrator::new(&remote).run(&id("root"), &plan).unwrap();

        assert_eq!(remote.calls(), vec!["create_folder X root", "move F new-X"]);
        assert_eq!(execution.id_map[&x.as_pending().unwrap()], "new-X");
        assert_eq!(execution.results[0].result_remote_id.as_deref(), Some("new-X"));
        assert!(execution.stopped_op_id.is_none());
    }

    #[test]
    fn unresolved_pending_reference_is_fatal() {
        let plan = plan(vec![Operation::trash(0, ItemId::mint())]);
        let remote = Script::default();
        let err = Orchestrator::new(&remote)
            .run(&id("root"), &plan)
            .unwrap_err();
        assert!(matches!(err, Error::Unresolved(_)));
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn created_item_without_remote_id_is_fatal() {
        let x = ItemId::mint();
        let plan = plan(vec![
            Operation::create_folder(0, id("root"), "X".into(), x.clone()),
            Operation::move_item(1, id("F"), x),
        ]);
        let remote = Script {
            unresolved_creates: true,
            ..Script::default()
        };
        let err = Orchestrator::new(&remote)
            .run(&id("root"), &plan)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert!(err.is_fatal());
        assert_eq!(remote.calls(), vec!["create_folder X root"]);
    }

    #[test]
    fn non_fatal_error_halts_the_run() {
        let plan = plan(vec![
            Operation::rename(0, id("A"), "a".into()),
            Operation::trash(1, id("B")),
            Operation::trash(2, id("C")),
        ]);
        let remote = Script {
            fail_on: Some(("rename", RemoteError::from_http(404, None, None))),
            ..Script::default()
        };
        let execution = Orchestrator::new(&remote).run(&id("root"), &plan).unwrap();

        assert_eq!(execution.results.len(), 1);
        assert!(!execution.results[0].is_success());
        assert_eq!(execution.stopped_op_id, Some(plan.operations[0].op_id));
        assert_eq!(remote.calls(), vec!["rename A a"]);
    }

    #[test]
    fn fatal_error_propagates() {
        let plan = plan(vec![
            Operation::trash(0, id("A")),
            Operation::trash(1, id("B")),
        ]);
        let remote = Script {
            fail_on: Some(("trash A", RemoteError::from_http(401, None, None))),
            ..Script::default()
        };
        let err = Orchestrator::new(&remote)
            .run(&id("root"), &plan)
            .unwrap_err();
        assert!(matches!(&err, Error::Remote(e) if e.kind == ErrorKind::Auth));
        assert_eq!(remote.calls(), vec!["trash A"]);
    }

    #[test]
    fn precondition_mismatch_is_a_conflict() {
        let mut plan = plan(vec![Operation::rename(0, id("F"), "g".into())]);
        plan.operations[0].precondition = Some(crate::Precondition::modified_at(at(10)));

        let remote = Script {
            modified: Some(at(20)),
            ..Script::default()
        };
        let execution = Orchestrator::new(&remote).run(&id("root"), &plan).unwrap();
        let failure = execution.results[0].failure.as_ref().unwrap();
        assert_eq!(failure.kind, ErrorKind::Conflict);
        assert_eq!(remote.calls(), vec!["get F"]);

        let remote = Script {
            modified: Some(at(10)),
            ..Script::default()
        };
        let execution = Orchestrator::new(&remote).run(&id("root"), &plan).unwrap();
        assert!(execution.results[0].is_success());
        assert_eq!(remote.calls(), vec!["get F", "rename F g"]);
    }

    #[test]
    fn plan_checks_run_before_any_call() {
        let remote = Script::default();

        let wrong_root = plan(vec![Operation::trash(0, id("A"))]);
        assert!(matches!(
            Orchestrator::new(&remote).run(&id("other"), &wrong_root),
            Err(Error::MalformedPlan(_))
        ));

        let mut duplicate = plan(vec![
            Operation::trash(0, id("A")),
            Operation::trash(1, id("B")),
        ]);
        duplicate.operations[1].op_id = duplicate.operations[0].op_id;
        assert!(matches!(
            Orchestrator::new(&remote).run(&id("root"), &duplicate),
            Err(Error::MalformedPlan(_))
        ));

        let mut unknown = plan(vec![Operation::trash(0, id("A"))]);
        unknown.apply_order.push(Uuid::new_v4());
        assert!(matches!(
            Orchestrator::new(&remote).run(&id("root"), &unknown),
            Err(Error::MalformedPlan(_))
        ));

        let mut missing = plan(vec![
            Operation::trash(0, id("A")),
            Operation::move_item(1, id("B"), id("A")),
        ]);
        missing.operations[1].new_parent = None;
        assert!(matches!(
            Orchestrator::new(&remote).run(&id("root"), &missing),
            Err(Error::MissingField {
                field: "new_parent",
                ..
            })
        ));

        let mut remote_result = plan(vec![Operation::create_folder(
            0,
            id("root"),
            "X".into(),
            ItemId::mint(),
        )]);
        remote_result.operations[0].result = Some(id("already-there"));
        assert!(matches!(
            Orchestrator::new(&remote).run(&id("root"), &remote_result),
            Err(Error::MalformedPlan(_))
        ));

        assert!(remote.calls().is_empty());
    }
}
