//! Planner - the offline planning session for one root.
//!
//! The planner holds a base snapshot, a working copy that reflects every
//! planned change, and the append-only log of operations recorded so far.
//! Nothing here touches the remote.

use crate::error::{Result, Role, Violation};
use crate::{mime, validate, Action, Error, ItemId, ItemRecord, Operation, Plan, Snapshot};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::Path;
use tracing::debug;

/// Offline planning session over the subtree of one root folder.
#[derive(Debug, Clone)]
pub struct Planner {
    /// Root of the planning scope
    root: ItemId,
    /// Snapshot as loaded, restored on reset
    base: Snapshot,
    /// Snapshot with every planned change applied
    snapshot: Snapshot,
    /// Operations recorded so far
    ops: Vec<Operation>,
    /// Identities scheduled for trash or deletion
    tombstones: BTreeSet<ItemId>,
}

impl Planner {
    /// Start a session over `snapshot`, which must contain `root`.
    pub fn new(root: impl Into<ItemId>, snapshot: Snapshot) -> Result<Self> {
        let root = root.into();
        validate::is_folder(&snapshot, &root, Role::Item)
            .map_err(|_| Error::RootNotFolder(root.to_string()))?;

        Ok(Self {
            root,
            base: snapshot.clone(),
            snapshot,
            ops: Vec::new(),
            tombstones: BTreeSet::new(),
        })
    }

    /// Start a session from the root record and its descendants.
    pub fn from_records(
        root: impl Into<ItemId>,
        records: impl IntoIterator<Item = ItemRecord>,
    ) -> Result<Self> {
        Self::new(root, Snapshot::from_records(records))
    }

    pub fn root(&self) -> &ItemId {
        &self.root
    }

    /// The working snapshot, with planned changes applied.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The snapshot as it was loaded.
    pub fn base(&self) -> &Snapshot {
        &self.base
    }

    // Read API

    pub fn get(&self, id: &ItemId) -> Result<&ItemRecord> {
        validate::exists(&self.snapshot, id, Role::Item)?;
        self.snapshot.get(id)
    }

    /// Look up an in-scope item by its remote id. Never contacts the remote.
    pub fn find_by_remote_id(&self, remote_id: &str) -> Option<&ItemRecord> {
        self.snapshot
            .get(&ItemId::remote(remote_id))
            .ok()
            .filter(|record| record.remote_id() == Some(remote_id))
    }

    /// Children of a folder, sorted by name then identity.
    pub fn list_children(&self, parent: &ItemId) -> Result<Vec<&ItemRecord>> {
        validate::is_folder(&self.snapshot, parent, Role::Parent)?;
        let mut children = self.snapshot.list_children(parent);
        children.sort_by(|a, b| (&a.name, &a.id).cmp(&(&b.name, &b.id)));
        Ok(children)
    }

    /// Items named `name`, either directly under `parent` or anywhere
    /// reachable from the root. Names are not unique.
    pub fn find_by_name(&self, name: &str, parent: Option<&ItemId>) -> Result<Vec<&ItemRecord>> {
        if let Some(parent) = parent {
            validate::exists(&self.snapshot, parent, Role::Parent)?;
            return Ok(self
                .snapshot
                .children_named(parent, name)
                .iter()
                .filter_map(|id| self.snapshot.get(id).ok())
                .collect());
        }

        let mut matches = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([self.root.clone()]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Ok(record) = self.snapshot.get(&current) else {
                continue;
            };
            if record.name == name {
                matches.push(record);
            }
            for child in self.snapshot.list_children(&current) {
                if !visited.contains(&child.id) {
                    queue.push_back(child.id.clone());
                }
            }
        }
        matches.sort_by(|a, b| (&a.name, &a.id).cmp(&(&b.name, &b.id)));
        Ok(matches)
    }

    /// Operations recorded so far, in sequence order.
    pub fn list_ops(&self) -> &[Operation] {
        &self.ops
    }

    pub fn pending_count(&self) -> usize {
        self.ops.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.ops.is_empty()
    }

    pub fn is_tombstoned(&self, id: &ItemId) -> bool {
        self.tombstones.contains(id)
    }

    /// Drop every recorded operation and restore the base snapshot.
    pub fn clear_ops(&mut self) {
        self.ops.clear();
        self.tombstones.clear();
        self.snapshot = self.base.clone();
    }

    // Planning API

    /// Plan a new folder under `parent`; returns its pending identity.
    pub fn create_folder(&mut self, name: &str, parent: &ItemId) -> Result<ItemId> {
        self.check_destination(parent, Role::Parent)?;

        let id = ItemId::mint();
        let op = Operation::create_folder(
            self.next_seq(),
            parent.clone(),
            name.to_string(),
            id.clone(),
        );
        op.validate_required_fields()?;

        self.snapshot
            .add_file(ItemRecord::folder(id.clone(), name, vec![parent.clone()]));
        self.record(op);
        Ok(id)
    }

    pub fn rename(&mut self, target: &ItemId, new_name: &str) -> Result<()> {
        validate::exists(&self.snapshot, target, Role::Target)?;
        validate::not_root(&self.root, target, Action::Rename)?;
        validate::not_tombstoned(&self.tombstones, target, Role::Target)?;

        let op = Operation::rename(self.next_seq(), target.clone(), new_name.to_string());
        op.validate_required_fields()?;

        self.snapshot.rename(target, new_name)?;
        self.record(op);
        Ok(())
    }

    /// Plan a move of a single-parented item into `new_parent`.
    pub fn move_item(&mut self, target: &ItemId, new_parent: &ItemId) -> Result<()> {
        validate::exists(&self.snapshot, target, Role::Target)?;
        self.check_destination(new_parent, Role::NewParent)?;
        validate::not_root(&self.root, target, Action::Move)?;
        validate::not_tombstoned(&self.tombstones, target, Role::Target)?;
        validate::single_parent(&self.snapshot, target)?;
        validate::no_cycle(&self.snapshot, target, new_parent)?;

        let op = Operation::move_item(self.next_seq(), target.clone(), new_parent.clone());
        op.validate_required_fields()?;

        self.snapshot.replace_parent(target, new_parent)?;
        self.record(op);
        Ok(())
    }

    /// Plan a copy of a file into `new_parent`; returns the copy's identity.
    ///
    /// The copy is named after the source unless `new_name` is given.
    pub fn copy(
        &mut self,
        source: &ItemId,
        new_parent: &ItemId,
        new_name: Option<&str>,
    ) -> Result<ItemId> {
        validate::exists(&self.snapshot, source, Role::Target)?;
        self.check_destination(new_parent, Role::NewParent)?;
        validate::not_tombstoned(&self.tombstones, source, Role::Target)?;
        validate::not_folder_source(&self.snapshot, source)?;

        let source_record = self.snapshot.get(source)?;
        let name = new_name.unwrap_or(source_record.name.as_str()).to_string();
        let mime_type = source_record.mime_type.clone();

        let id = ItemId::mint();
        let op = Operation::copy(
            self.next_seq(),
            source.clone(),
            new_parent.clone(),
            new_name.map(str::to_string),
            id.clone(),
        );
        op.validate_required_fields()?;

        self.snapshot.add_file(ItemRecord::new(
            id.clone(),
            name,
            mime_type,
            vec![new_parent.clone()],
        ));
        self.record(op);
        Ok(id)
    }

    pub fn trash(&mut self, target: &ItemId) -> Result<()> {
        self.check_deletable(target, Action::Trash)?;
        let op = Operation::trash(self.next_seq(), target.clone());
        self.tombstone(target, op)
    }

    pub fn delete_permanently(&mut self, target: &ItemId) -> Result<()> {
        self.check_deletable(target, Action::DeletePermanent)?;
        let op = Operation::delete_permanently(self.next_seq(), target.clone());
        self.tombstone(target, op)
    }

    /// Plan an upload into `parent`; returns the new file's identity.
    ///
    /// Without `name` the file is named after the last component of
    /// `local_path`.
    pub fn upload_file(
        &mut self,
        local_path: impl AsRef<Path>,
        parent: &ItemId,
        name: Option<&str>,
    ) -> Result<ItemId> {
        let local_path = local_path.as_ref();
        self.check_destination(parent, Role::Parent)?;

        let file_name = match name {
            Some(name) => name.to_string(),
            None => local_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::validation(Violation::UnnamedUpload, parent))?,
        };

        let id = ItemId::mint();
        let op = Operation::upload_file(
            self.next_seq(),
            local_path.to_path_buf(),
            parent.clone(),
            name.map(str::to_string),
            id.clone(),
        );
        op.validate_required_fields()?;

        self.snapshot.add_file(ItemRecord::new(
            id.clone(),
            file_name,
            mime::OCTET_STREAM,
            vec![parent.clone()],
        ));
        self.record(op);
        Ok(id)
    }

    /// Record intent to download a file. The snapshot is unchanged.
    pub fn download_file(
        &mut self,
        target: &ItemId,
        local_path: impl AsRef<Path>,
        overwrite: bool,
    ) -> Result<()> {
        validate::exists(&self.snapshot, target, Role::Target)?;
        validate::not_tombstoned(&self.tombstones, target, Role::Target)?;

        let op = Operation::download_file(
            self.next_seq(),
            target.clone(),
            local_path.as_ref().to_path_buf(),
            overwrite,
        );
        op.validate_required_fields()?;
        self.record(op);
        Ok(())
    }

    /// Freeze the recorded operations into a plan. The log is left intact.
    pub fn build_plan(&self) -> Plan {
        Plan::build(&self.root, &self.ops, &self.snapshot)
    }

    fn next_seq(&self) -> u64 {
        self.ops.len() as u64
    }

    fn record(&mut self, op: Operation) {
        debug!(
            op_id = %op.op_id,
            seq = op.seq,
            action = %op.action,
            "operation planned"
        );
        self.ops.push(op);
    }

    /// Destination of a child-creating or reparenting call.
    fn check_destination(&self, parent: &ItemId, role: Role) -> Result<()> {
        validate::is_folder(&self.snapshot, parent, role)?;
        validate::not_tombstoned(&self.tombstones, parent, role)
    }

    fn check_deletable(&self, target: &ItemId, action: Action) -> Result<()> {
        validate::exists(&self.snapshot, target, Role::Target)?;
        validate::not_root(&self.root, target, action)?;
        validate::not_tombstoned(&self.tombstones, target, Role::Target)
    }

    fn tombstone(&mut self, target: &ItemId, op: Operation) -> Result<()> {
        op.validate_required_fields()?;
        self.snapshot.mark_trashed(target)?;
        self.tombstones.insert(target.clone());
        self.record(op);
        Ok(())
    }
}
