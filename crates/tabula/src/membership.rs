//! The membership index: which tables currently hold a row for which id.
use crate::id::Id;
use crate::schema::TableIndex;

/// A sorted, duplicate-free vec of `(Id, TableIndex)` pairs.
///
/// Sorting by id first means all the tables of one entity are adjacent, so finding them is one binary search plus a
/// short scan.
#[derive(Clone, Debug, Default)]
pub struct Membership {
    entries: Vec<(Id, TableIndex)>,
}

impl Membership {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns whether the pair was new.
    pub fn insert(&mut self, id: Id, table: TableIndex) -> bool {
        match self.entries.binary_search(&(id, table)) {
            Ok(_) => false,
            Err(i) => {
                self.entries.insert(i, (id, table));
                true
            }
        }
    }

    /// Returns whether the pair was present.
    pub fn remove(&mut self, id: Id, table: TableIndex) -> bool {
        match self.entries.binary_search(&(id, table)) {
            Ok(i) => {
                self.entries.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, id: Id, table: TableIndex) -> bool {
        self.entries.binary_search(&(id, table)).is_ok()
    }

    /// The tables holding `id`, in increasing index order.
    pub fn tables_of(&self, id: Id) -> impl Iterator<Item = TableIndex> + '_ {
        let start = self.entries.partition_point(|(i, _)| *i < id);
        self.entries[start..]
            .iter()
            .take_while(move |(i, _)| *i == id)
            .map(|(_, t)| *t)
    }

    /// Number of `(id, table)` pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
