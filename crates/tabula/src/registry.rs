//! The query registry: every cached query signature of one store, and which of them each table must notify.
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;

use ahash::RandomState;
use smallvec::SmallVec;

use crate::cache::QueryCache;
use crate::diff::DiffQueue;
use crate::id::Id;
use crate::query_key::QueryKey;
use crate::schema::TableIndex;

/// Index of a registered query signature.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) struct SlotIndex(usize);

struct Slot {
    key: QueryKey,
    diff: DiffQueue,
    /// Always an `Rc<QueryCache<Q>>` for the `Q` this slot was registered under.
    cache: Rc<dyn Any>,
}

pub(crate) struct Registry {
    slots: Vec<Slot>,
    by_signature: HashMap<TypeId, SlotIndex, RandomState>,
    /// For each table, the slots whose key contains it.
    dependents: Vec<SmallVec<[SlotIndex; 4]>>,
}

impl Registry {
    pub(crate) fn new(table_count: usize) -> Registry {
        Registry {
            slots: vec![],
            by_signature: Default::default(),
            dependents: vec![Default::default(); table_count],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Find the cache for signature `Q`, if it was registered.
    pub(crate) fn lookup<Q: 'static>(&self) -> Option<(SlotIndex, Rc<QueryCache<Q>>)> {
        let index = *self.by_signature.get(&TypeId::of::<Q>())?;
        let cache = self.slots[index.0]
            .cache
            .clone()
            .downcast::<QueryCache<Q>>()
            .unwrap_or_else(|_| panic!("Query slot {} holds a cache of the wrong type", index.0));
        Some((index, cache))
    }

    /// Register signature `Q` with its already-materialized cache.
    ///
    /// Panics if `Q` is already registered: registering twice would split its notifications across two slots.
    pub(crate) fn register<Q: 'static>(&mut self, key: QueryKey, cache: Rc<QueryCache<Q>>) -> SlotIndex {
        let index = SlotIndex(self.slots.len());
        let previous = self.by_signature.insert(TypeId::of::<Q>(), index);
        assert!(previous.is_none(), "Query signature registered twice");

        for table in key.tables() {
            self.dependents[table.get()].push(index);
        }
        self.slots.push(Slot {
            key,
            diff: DiffQueue::new(),
            cache,
        });

        index
    }

    pub(crate) fn key(&self, slot: SlotIndex) -> QueryKey {
        self.slots[slot.0].key
    }

    /// Notify every query reading `table` that `id` was written there.
    pub(crate) fn track_insert(&mut self, id: Id, table: TableIndex) {
        for slot in self.dependents[table.get()].iter() {
            self.slots[slot.0].diff.track_insert(id);
        }
    }

    /// Notify every query reading `table` that `id` lost its row there.
    pub(crate) fn track_remove(&mut self, id: Id, table: TableIndex) {
        for slot in self.dependents[table.get()].iter() {
            self.slots[slot.0].diff.track_remove(id);
        }
    }

    pub(crate) fn pending(&self, slot: SlotIndex) -> &DiffQueue {
        &self.slots[slot.0].diff
    }

    pub(crate) fn take_diff(&mut self, slot: SlotIndex) -> DiffQueue {
        self.slots[slot.0].diff.take()
    }
}
