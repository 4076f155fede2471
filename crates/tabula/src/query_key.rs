use bitvec::prelude::*;

use crate::schema::{TableIndex, MAX_TABLES};

/// The set of tables a query signature reads, one bit per [TableIndex].
///
/// Two signatures over the same tables in a different order have the same key; the key is what write notifications
/// are routed by, while caches are kept per signature.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct QueryKey(BitArray<[u64; 1], Lsb0>);

impl Default for QueryKey {
    fn default() -> Self {
        Self::empty()
    }
}

impl QueryKey {
    pub fn empty() -> QueryKey {
        QueryKey(BitArray::ZERO)
    }

    #[must_use]
    pub fn with(mut self, table: TableIndex) -> QueryKey {
        self.insert(table);
        self
    }

    pub fn insert(&mut self, table: TableIndex) {
        debug_assert!(table.get() < MAX_TABLES);
        self.0.set(table.get(), true);
    }

    pub fn contains(&self, table: TableIndex) -> bool {
        self.0[table.get()]
    }

    pub fn len(&self) -> usize {
        self.0.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.0.not_any()
    }

    /// The tables in this key, in increasing index order.
    pub fn tables(&self) -> impl Iterator<Item = TableIndex> + '_ {
        self.0.iter_ones().map(TableIndex::new)
    }
}

impl std::fmt::Debug for QueryKey {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_set().entries(self.tables().map(|t| t.get())).finish()
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{{")?;
        for (i, t) in self.tables().enumerate() {
            if i > 0 {
                write!(fmt, ",")?;
            }
            write!(fmt, "{}", t)?;
        }
        write!(fmt, "}}")
    }
}
