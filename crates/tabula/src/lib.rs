//! An in-process entity store with a closed schema and incrementally maintained join caches.
//!
//! Rows of each declared type live in their own id-sorted [Table].  A query names a tuple of row types; the first time
//! it runs, the store materializes the inner join of those tables by id and keeps it.  Writes queue the written id on
//! every cached query reading the written table, and the next evaluation of each query patches its cache from that
//! queue instead of joining again.
//!
//! ```ignore
//! use tabula::{Id, Schema, Store, Table};
//!
//! #[derive(Clone)]
//! struct Position { x: f64, y: f64 }
//! #[derive(Clone)]
//! struct Name(String);
//!
//! #[derive(Schema)]
//! struct World {
//!     positions: Table<Position>,
//!     names: Table<Name>,
//! }
//!
//! let store: Store<World> = Store::new();
//! store.set(Id::new(1), Position { x: 0.0, y: 0.0 });
//! store.set(Id::new(1), Name("a".into()));
//! store.query::<(Position, Name)>(|id, (pos, name)| {
//!     println!("{} {} {} {}", id, pos.x, pos.y, name.0);
//!     true
//! });
//! ```

// The derive emits `::tabula::` paths, which need to resolve in this crate's own tests too.
extern crate self as tabula;

mod cache;
pub mod config;
pub mod diff;
pub mod errors;
pub mod id;
pub mod membership;
pub mod query;
pub mod query_key;
mod registry;
pub mod schema;
pub mod store;
pub mod table;


pub use cache::ReconcileStats;
pub use config::StoreConfig;
pub use errors::{Error, Result};
pub use id::Id;
pub use query::Query;
pub use query_key::QueryKey;
pub use schema::{HasTable, Schema, TableIndex, MAX_TABLES};
pub use store::Store;
pub use table::Table;
pub use tabula_derive::Schema;
