//! Pending changes for one cached query.
use std::collections::BTreeSet;

use crate::id::Id;

/// Ids whose rows changed since a query's cache was last reconciled.
///
/// An id is in at most one of the two sets: a write supersedes a pending removal and a removal supersedes a pending
/// write.  Both sets are ordered so that reconciliation visits ids in increasing order, which is also the order cache
/// rows are inserted in.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiffQueue {
    inserts: BTreeSet<Id>,
    removes: BTreeSet<Id>,
}

impl DiffQueue {
    pub fn new() -> Self {
        Default::default()
    }

    /// Record that `id` was written to one of the query's tables.
    pub fn track_insert(&mut self, id: Id) {
        self.removes.remove(&id);
        self.inserts.insert(id);
    }

    /// Record that `id` lost a row in one of the query's tables.
    pub fn track_remove(&mut self, id: Id) {
        self.inserts.remove(&id);
        self.removes.insert(id);
    }

    pub fn inserts(&self) -> impl Iterator<Item = Id> + '_ {
        self.inserts.iter().copied()
    }

    pub fn removes(&self) -> impl Iterator<Item = Id> + '_ {
        self.removes.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.removes.is_empty()
    }

    /// Number of pending ids across both sets.
    pub fn len(&self) -> usize {
        self.inserts.len() + self.removes.len()
    }

    /// Take everything pending, leaving this queue empty.
    pub fn take(&mut self) -> DiffQueue {
        std::mem::take(self)
    }
}
