//! Schemas: the closed set of row types a store holds.
//!
//! A schema is a struct whose fields are all [Table]s, with `#[derive(Schema)]` on it:
//!
//! ```ignore
//! #[derive(Schema)]
//! struct World {
//!     positions: Table<Position>,
//!     #[table(name = "display_name")]
//!     names: Table<Name>,
//! }
//! ```
//!
//! The derive implements [Schema] for the struct and [HasTable] once per field.  A row type's [TableIndex] is the
//! position of its field, so asking a store for a table the schema doesn't declare fails to compile instead of failing
//! at runtime.
use crate::id::Id;
use crate::table::Table;

/// The most tables a single schema may declare.  Query keys are one bit per table.
pub const MAX_TABLES: usize = 64;

/// The position of a table within its schema.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, derive_more::Display)]
#[display(fmt = "{}", _0)]
pub struct TableIndex(u8);

impl TableIndex {
    /// Panics (at compile time, when used in a const) if the index can't fit in a query key.
    pub const fn new(index: usize) -> TableIndex {
        assert!(index < MAX_TABLES, "Table index is out of range");
        TableIndex(index as u8)
    }

    pub const fn get(&self) -> usize {
        self.0 as usize
    }
}

/// A closed set of tables.  Implement with `#[derive(Schema)]`.
///
/// The methods here are the type-erased view of the tables, used when the store only knows a [TableIndex] (for
/// example when removing every row of an entity).
pub trait Schema: 'static {
    const TABLE_COUNT: usize;

    /// Display names of the tables, in index order.
    const TABLE_NAMES: &'static [&'static str];

    fn with_table_capacity(capacity: usize) -> Self
    where
        Self: Sized;

    /// Returns false for indices outside the schema.
    fn contains_row(&self, table: TableIndex, id: Id) -> bool;

    /// Returns whether a row was removed.
    fn remove_row(&mut self, table: TableIndex, id: Id) -> bool;

    fn table_len(&self, table: TableIndex) -> usize;

    fn table_name(table: TableIndex) -> &'static str
    where
        Self: Sized,
    {
        Self::TABLE_NAMES.get(table.get()).copied().unwrap_or("<unknown>")
    }
}

/// Implemented by a schema once for each row type it stores.
pub trait HasTable<T>: Schema {
    const INDEX: TableIndex;

    fn table(&self) -> &Table<T>;

    fn table_mut(&mut self) -> &mut Table<T>;
}
