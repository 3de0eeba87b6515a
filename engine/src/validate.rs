//! Structural checks run before a planning call mutates anything.

use crate::error::{Result, Role, Violation};
use crate::{Action, Error, ItemId, Snapshot};
use std::collections::{BTreeSet, HashSet, VecDeque};

pub fn exists(snapshot: &Snapshot, id: &ItemId, role: Role) -> Result<()> {
    if snapshot.has(id) {
        Ok(())
    } else {
        Err(Error::validation(Violation::Missing(role), id))
    }
}

/// The item must exist and be a folder.
pub fn is_folder(snapshot: &Snapshot, id: &ItemId, role: Role) -> Result<()> {
    exists(snapshot, id, role)?;
    if snapshot.get(id)?.is_folder() {
        Ok(())
    } else {
        Err(Error::validation(Violation::NotFolder(role), id))
    }
}

pub fn not_root(root: &ItemId, target: &ItemId, action: Action) -> Result<()> {
    if root == target {
        Err(Error::validation(Violation::RootProtected(action), target))
    } else {
        Ok(())
    }
}

/// Checked against the session's tombstone set, not the trashed flag.
pub fn not_tombstoned(tombstones: &BTreeSet<ItemId>, id: &ItemId, role: Role) -> Result<()> {
    if tombstones.contains(id) {
        Err(Error::validation(Violation::Tombstoned(role), id))
    } else {
        Ok(())
    }
}

pub fn single_parent(snapshot: &Snapshot, target: &ItemId) -> Result<()> {
    if snapshot.get(target)?.parents.len() >= 2 {
        Err(Error::validation(Violation::MultiParentMove, target))
    } else {
        Ok(())
    }
}

/// Reject a move that would place `target` inside its own subtree.
///
/// Walks the ancestors of `new_parent` breadth-first through every parent
/// link. Identities outside the snapshot end their branch.
pub fn no_cycle(snapshot: &Snapshot, target: &ItemId, new_parent: &ItemId) -> Result<()> {
    let mut queue = VecDeque::from([new_parent]);
    let mut visited = HashSet::new();

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current) {
            continue;
        }
        if current == target {
            return Err(Error::validation(Violation::MoveCycle, target));
        }
        let Ok(record) = snapshot.get(current) else {
            continue;
        };
        queue.extend(record.parents.iter().filter(|p| !visited.contains(p)));
    }
    Ok(())
}

pub fn not_folder_source(snapshot: &Snapshot, source: &ItemId) -> Result<()> {
    if snapshot.get(source)?.is_folder() {
        Err(Error::validation(Violation::FolderCopy, source))
    } else {
        Ok(())
    }
}
