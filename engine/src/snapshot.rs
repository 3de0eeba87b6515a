//! Indexed virtual tree of the items under one root.
//!
//! A [`Snapshot`] owns every [`ItemRecord`] in scope plus two derived indexes:
//! parent → children and parent → name → children. Each mutation updates all
//! three structures together, so lookups never observe a half-applied change.
//! BTreeMaps keep iteration deterministic.

use crate::error::{Result, Role, Violation};
use crate::{Error, ItemId, ItemRecord};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// An indexed, in-memory view of a remote folder hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Every record in scope
    records: BTreeMap<ItemId, ItemRecord>,
    /// Parent → child identities
    children: BTreeMap<ItemId, BTreeSet<ItemId>>,
    /// Parent → name → child identities (names are not unique)
    names: BTreeMap<ItemId, BTreeMap<String, Vec<ItemId>>>,
}

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a set of records.
    ///
    /// Parents are expected to be identities within the same scope.
    pub fn from_records(records: impl IntoIterator<Item = ItemRecord>) -> Self {
        let mut snapshot = Self::new();
        for record in records {
            snapshot.add_file(record);
        }
        snapshot
    }

    pub fn has(&self, id: &ItemId) -> bool {
        self.records.contains_key(id)
    }

    /// Get a record, failing if it is not in scope.
    pub fn get(&self, id: &ItemId) -> Result<&ItemRecord> {
        self.records
            .get(id)
            .ok_or_else(|| Error::validation(Violation::Missing(Role::Item), id))
    }

    /// Mutable access to a record's unindexed fields.
    ///
    /// Name and parent changes must go through [`Snapshot::rename`] and
    /// [`Snapshot::replace_parent`] so the indexes follow.
    pub(crate) fn get_mut(&mut self, id: &ItemId) -> Result<&mut ItemRecord> {
        self.records
            .get_mut(id)
            .ok_or_else(|| Error::validation(Violation::Missing(Role::Item), id))
    }

    /// Number of records in scope.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All identities in scope, in order.
    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.records.keys()
    }

    /// All records, ordered by identity.
    pub fn records(&self) -> impl Iterator<Item = &ItemRecord> {
        self.records.values()
    }

    /// Records indexed as children of `parent`.
    pub fn list_children(&self, parent: &ItemId) -> Vec<&ItemRecord> {
        self.children
            .get(parent)
            .into_iter()
            .flatten()
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    /// Identities of the children of `parent` carrying `name`.
    pub fn children_named(&self, parent: &ItemId, name: &str) -> &[ItemId] {
        self.names
            .get(parent)
            .and_then(|by_name| by_name.get(name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Insert a record and index it under each of its parents.
    ///
    /// A record already present under the same identity is replaced.
    pub fn add_file(&mut self, record: ItemRecord) {
        if self.records.contains_key(&record.id) {
            self.detach(&record.id);
        }

        self.children.entry(record.id.clone()).or_default();
        self.names.entry(record.id.clone()).or_default();
        for parent in &record.parents {
            self.index_child(parent, &record.name, &record.id);
        }
        self.records.insert(record.id.clone(), record);
    }

    /// Remove a record and detach it from its parents' indexes.
    ///
    /// The item's own index buckets are dropped. Its children keep their
    /// records (and their parent links) but are no longer reachable through
    /// the indexes.
    pub fn remove_file(&mut self, id: &ItemId) -> Option<ItemRecord> {
        let record = self.detach(id)?;
        self.children.remove(id);
        self.names.remove(id);
        Some(record)
    }

    /// Rename an item, moving its name-index entry under every parent.
    pub fn rename(&mut self, id: &ItemId, new_name: &str) -> Result<()> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| Error::validation(Violation::Missing(Role::Item), id))?;
        if record.name == new_name {
            return Ok(());
        }

        let old_name = std::mem::replace(&mut record.name, new_name.to_string());
        for parent in &record.parents {
            // Orphans stay out of buckets their parent no longer has.
            if !self.children.get(parent).is_some_and(|kids| kids.contains(id)) {
                continue;
            }
            unindex_name(&mut self.names, parent, &old_name, id);
            index_name(&mut self.names, parent, new_name, id);
        }
        Ok(())
    }

    /// Replace all parents of an item with `new_parent`.
    ///
    /// Afterwards the parent list is exactly `[new_parent]`.
    pub fn replace_parent(&mut self, id: &ItemId, new_parent: &ItemId) -> Result<()> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| Error::validation(Violation::Missing(Role::Item), id))?;
        let old_parents = std::mem::replace(&mut record.parents, vec![new_parent.clone()]);
        let name = record.name.clone();

        for parent in &old_parents {
            self.unindex_child(parent, &name, id);
        }
        self.index_child(new_parent, &name, id);
        Ok(())
    }

    /// Flag an item as trashed without touching the indexes.
    pub fn mark_trashed(&mut self, id: &ItemId) -> Result<()> {
        self.get_mut(id)?.trashed = true;
        Ok(())
    }

    /// Shortest distance from `root` to every reachable identity.
    ///
    /// The root has depth 0. Items that are not reachable through the child
    /// index are absent from the result.
    pub fn depths_from(&self, root: &ItemId) -> BTreeMap<ItemId, usize> {
        let mut depths = BTreeMap::new();
        if !self.has(root) {
            return depths;
        }

        depths.insert(root.clone(), 0);
        let mut queue = VecDeque::from([(root.clone(), 0usize)]);
        while let Some((current, depth)) = queue.pop_front() {
            for child in self.children.get(&current).into_iter().flatten() {
                if !self.records.contains_key(child) || depths.contains_key(child) {
                    continue;
                }
                depths.insert(child.clone(), depth + 1);
                queue.push_back((child.clone(), depth + 1));
            }
        }
        depths
    }

    /// Verify the index invariants.
    ///
    /// Every identity stored in an index bucket must have a record, and every
    /// record must appear in the buckets of each parent that is in scope.
    pub fn check_consistency(&self) -> Result<()> {
        let dangling = |what: &str, parent: &ItemId, child: &ItemId| {
            Error::InvalidState(format!("{what} index of {parent} holds unknown item {child}"))
        };

        for (parent, kids) in &self.children {
            if let Some(child) = kids.iter().find(|c| !self.records.contains_key(*c)) {
                return Err(dangling("child", parent, child));
            }
        }
        for (parent, by_name) in &self.names {
            for (name, ids) in by_name {
                for child in ids {
                    let Some(record) = self.records.get(child) else {
                        return Err(dangling("name", parent, child));
                    };
                    if &record.name != name {
                        return Err(Error::InvalidState(format!(
                            "name index of {parent} files {child} under stale name {name:?}"
                        )));
                    }
                }
            }
        }

        for record in self.records.values() {
            for parent in record.parents.iter().filter(|p| self.records.contains_key(*p)) {
                let Some(kids) = self.children.get(parent) else {
                    return Err(Error::InvalidState(format!(
                        "parent {parent} of {} has no child index",
                        record.id
                    )));
                };
                let named = self.children_named(parent, &record.name);
                if !kids.contains(&record.id) || !named.contains(&record.id) {
                    return Err(Error::InvalidState(format!(
                        "{} is not indexed under parent {parent}",
                        record.id
                    )));
                }
            }
        }
        Ok(())
    }

    fn detach(&mut self, id: &ItemId) -> Option<ItemRecord> {
        let record = self.records.remove(id)?;
        for parent in &record.parents {
            self.unindex_child(parent, &record.name, id);
        }
        Some(record)
    }

    fn index_child(&mut self, parent: &ItemId, name: &str, child: &ItemId) {
        self.children
            .entry(parent.clone())
            .or_default()
            .insert(child.clone());
        index_name(&mut self.names, parent, name, child);
    }

    fn unindex_child(&mut self, parent: &ItemId, name: &str, child: &ItemId) {
        if let Some(kids) = self.children.get_mut(parent) {
            kids.remove(child);
        }
        unindex_name(&mut self.names, parent, name, child);
    }
}

fn index_name(
    names: &mut BTreeMap<ItemId, BTreeMap<String, Vec<ItemId>>>,
    parent: &ItemId,
    name: &str,
    child: &ItemId,
) {
    let ids = names
        .entry(parent.clone())
        .or_default()
        .entry(name.to_string())
        .or_default();
    if !ids.contains(child) {
        ids.push(child.clone());
    }
}

fn unindex_name(
    names: &mut BTreeMap<ItemId, BTreeMap<String, Vec<ItemId>>>,
    parent: &ItemId,
    name: &str,
    child: &ItemId,
) {
    let Some(by_name) = names.get_mut(parent) else {
        return;
    };
    if let Some(ids) = by_name.get_mut(name) {
        ids.retain(|id| id != child);
        if ids.is_empty() {
            by_name.remove(name);
        }
    }
}
