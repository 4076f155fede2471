//! Materialized query caches and their incremental reconciliation.
use atomic_refcell::AtomicRefCell;

use crate::diff::DiffQueue;
use crate::id::Id;
use crate::query::Query;
use crate::schema::Schema;

/// The joined rows of one query signature, sorted by id.
///
/// Shared between the store's registry and any in-progress iteration; iteration takes a shared borrow for its whole
/// duration, so reconciliation (which needs the mutable one) must not run while the store is nested inside a query.
pub(crate) struct QueryCache<Q> {
    rows: AtomicRefCell<Vec<(Id, Q)>>,
}

/// What a reconciliation did, for logging and tests.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ReconcileStats {
    /// Ids which newly joined.
    pub inserted: usize,
    /// Ids already joined whose rows were copied again.
    pub refreshed: usize,
    /// Pending inserts which don't have a row in every table yet.
    pub skipped: usize,
    /// Ids dropped from the cache.
    pub removed: usize,
}

impl<Q> QueryCache<Q> {
    pub(crate) fn new(rows: Vec<(Id, Q)>) -> Self {
        QueryCache {
            rows: AtomicRefCell::new(rows),
        }
    }

    pub(crate) fn rows(&self) -> &AtomicRefCell<Vec<(Id, Q)>> {
        &self.rows
    }
}

fn search<Q>(rows: &[(Id, Q)], id: Id) -> Result<usize, usize> {
    rows.binary_search_by_key(&id, |(i, _)| *i)
}

/// Bring `rows` up to date with `schema` by applying `diff`.
///
/// Pending inserts are checked against the live tables: an id only enters the cache once every participating table
/// holds it, and an id which is already cached gets fresh copies of its rows, or is dropped if a table lost it.
/// Pending removes drop the id if cached.  Applying the same diff twice gives the same rows.
pub(crate) fn reconcile<S: Schema, Q: Query<S>>(
    rows: &mut Vec<(Id, Q)>,
    schema: &S,
    diff: &DiffQueue,
) -> ReconcileStats {
    let mut stats = ReconcileStats::default();

    for id in diff.inserts() {
        let pos = search(rows, id);

        if !Q::is_joined(schema, id) {
            match pos {
                Ok(i) => {
                    rows.remove(i);
                    stats.removed += 1;
                }
                Err(_) => stats.skipped += 1,
            }
            continue;
        }

        let row = Q::fetch(schema, id)
            .expect("Id passed the join check but a participating table has no row for it");
        match pos {
            Ok(i) => {
                rows[i].1 = row;
                stats.refreshed += 1;
            }
            Err(i) => {
                rows.insert(i, (id, row));
                stats.inserted += 1;
            }
        }
    }

    for id in diff.removes() {
        if let Ok(i) = search(rows, id) {
            rows.remove(i);
            stats.removed += 1;
        }
    }

    stats
}

/// Check that `rows` holds exactly the ids of a fresh join.  Panics with the first divergence.
pub(crate) fn verify<S: Schema, Q: Query<S>>(rows: &[(Id, Q)], schema: &S) {
    let expected = Q::materialize(schema);
    let actual_ids = rows.iter().map(|(id, _)| *id);
    let expected_ids = expected.iter().map(|(id, _)| *id);

    if let Some((i, (a, e))) = actual_ids
        .zip(expected_ids)
        .enumerate()
        .find(|(_, (a, e))| a != e)
    {
        panic!(
            "Query cache diverged from its tables at position {}: cached {}, expected {}",
            i, a, e
        );
    }
    assert_eq!(
        rows.len(),
        expected.len(),
        "Query cache diverged from its tables: wrong number of rows"
    );
}
