//! Manager - owns the open root, the accessor and the planning session.

use crate::apply::{check_plan, Orchestrator};
use crate::error::Result;
use crate::outcome::{Summary, SyncResult, SyncStatus};
use crate::{Error, ItemId, Plan, Planner, RemoteAccessor};
use tracing::{info, warn};

/// Entry point for the plan → apply cycle against one remote.
#[derive(Debug)]
pub struct Manager<A> {
    remote: A,
    planner: Option<Planner>,
}

impl<A: RemoteAccessor> Manager<A> {
    pub fn new(remote: A) -> Self {
        Self {
            remote,
            planner: None,
        }
    }

    pub fn remote(&self) -> &A {
        &self.remote
    }

    pub fn into_remote(self) -> A {
        self.remote
    }

    /// Load the subtree under `root_id` and start a fresh planning session.
    ///
    /// Refused while the current session has unapplied operations. The root
    /// must be a folder; its own parents are dropped so the scope does not
    /// link outward, and trashed descendants are left out.
    pub fn open(&mut self, root_id: &str) -> Result<&mut Planner> {
        self.ensure_no_pending()?;
        let planner = self.load(root_id)?;
        Ok(self.planner.insert(planner))
    }

    /// Reload the open root. Refused while operations are pending.
    pub fn refresh(&mut self) -> Result<&mut Planner> {
        let root = self.open_root()?.to_string();
        self.open(&root)
    }

    /// Remote id of the open root.
    pub fn root_id(&self) -> Option<&str> {
        self.planner.as_ref().and_then(|p| p.root().as_remote())
    }

    pub fn planner(&self) -> Result<&Planner> {
        self.planner.as_ref().ok_or_else(not_open)
    }

    pub fn planner_mut(&mut self) -> Result<&mut Planner> {
        self.planner.as_mut().ok_or_else(not_open)
    }

    pub fn build_plan(&self) -> Result<Plan> {
        let plan = self.planner()?.build_plan();
        info!(
            plan_id = %plan.plan_id,
            operations = plan.len(),
            "plan built"
        );
        Ok(plan)
    }

    /// Apply `plan` to the remote.
    ///
    /// A plan that fails its checks is refused before any remote call and the
    /// session is left as it was. Once the run starts, the pending log is
    /// cleared and the working snapshot reset whatever the outcome. A run that
    /// completes or halts then reloads the root; a failed reload is reported
    /// in the summary, not raised. A fatal error propagates without reloading.
    pub fn apply_plan(&mut self, plan: &Plan) -> Result<SyncResult> {
        let root = ItemId::remote(self.open_root()?);
        check_plan(&root, plan)?;
        let outcome = Orchestrator::new(&self.remote).run(&root, plan);

        if let Some(planner) = self.planner.as_mut() {
            planner.clear_ops();
        }
        let execution = outcome?;

        let status = if execution.stopped_op_id.is_some() {
            SyncStatus::Failed
        } else {
            SyncStatus::Success
        };
        let mut summary = Summary::tally(&execution.results, execution.planned);

        let root_id = root.to_string();
        let snapshot_refreshed = match self.load(&root_id) {
            Ok(planner) => {
                self.planner = Some(planner);
                true
            }
            Err(err) => {
                warn!(root = %root_id, error = %err, "snapshot reload failed");
                summary.refresh_failed += 1;
                false
            }
        };

        info!(
            plan_id = %plan.plan_id,
            success = summary.success,
            failed = summary.failed,
            skipped = summary.skipped,
            "plan applied"
        );

        Ok(SyncResult {
            status,
            stopped_op_id: execution.stopped_op_id,
            results: execution.results,
            id_map: execution.id_map,
            summary,
            snapshot_refreshed,
        })
    }

    /// Build a plan from the pending operations and apply it.
    pub fn sync(&mut self) -> Result<SyncResult> {
        let plan = self.build_plan()?;
        self.apply_plan(&plan)
    }

    fn open_root(&self) -> Result<&str> {
        self.root_id().ok_or_else(not_open)
    }

    fn ensure_no_pending(&self) -> Result<()> {
        match &self.planner {
            Some(planner) if planner.has_pending() => Err(Error::InvalidState(format!(
                "{} pending operations; apply or clear them first",
                planner.pending_count()
            ))),
            _ => Ok(()),
        }
    }

    fn load(&self, root_id: &str) -> Result<Planner> {
        let mut root = self.remote.get(root_id)?;
        if !root.is_folder() {
            return Err(Error::RootNotFolder(root_id.to_string()));
        }
        root.parents.clear();

        let descendants = self.remote.list_tree(root_id)?;
        let records = std::iter::once(root).chain(descendants.into_iter().filter(|r| !r.trashed));
        let planner = Planner::from_records(root_id, records)?;

        info!(
            root = root_id,
            items = planner.snapshot().len(),
            "root opened"
        );
        Ok(planner)
    }
}

fn not_open() -> Error {
    Error::InvalidState("no root is open".into())
}
