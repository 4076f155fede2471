//! The [Store]: the tables of a schema plus an incrementally maintained cache per query signature.
//!
//! Writes go through [Store::set] and the removal methods, which keep the membership index current and queue the
//! written id on every cached query that reads the table.  [Store::query] materializes a signature's cache the first
//! time it is asked for and from then on only applies the queued changes before iterating.
//!
//! Callbacks may write to the store and run further queries.  While any cached query is iterating, reconciliation is
//! suspended: nested queries see their caches as of the last top-level evaluation, and whatever the callbacks write is
//! picked up by the next top-level evaluation instead.
use std::cell::Cell;
use std::rc::Rc;

use atomic_refcell::AtomicRefCell;
use log::*;
use smallvec::SmallVec;

use crate::cache::{self, QueryCache, ReconcileStats};
use crate::config::StoreConfig;
use crate::id::Id;
use crate::membership::Membership;
use crate::query::Query;
use crate::query_key::QueryKey;
use crate::registry::{Registry, SlotIndex};
use crate::schema::{HasTable, Schema, TableIndex};

/// An in-process entity store over schema `S`.
///
/// All methods take `&self` so that query callbacks can use the store.  The store is neither `Send` nor `Sync`; it is
/// meant to be driven from one thread.
pub struct Store<S: Schema> {
    config: StoreConfig,
    tables: AtomicRefCell<S>,
    membership: AtomicRefCell<Membership>,
    registry: AtomicRefCell<Registry>,

    /// How many cached queries are currently iterating.
    depth: Cell<usize>,
}

/// Holds the store's depth up for the duration of an iteration, including when a callback panics.
struct DepthGuard<'a>(&'a Cell<usize>);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> DepthGuard<'a> {
        depth.set(depth.get() + 1);
        DepthGuard(depth)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

impl<S: Schema> Default for Store<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Schema> Store<S> {
    pub fn new() -> Self {
        Self::with_config(Default::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Store {
            tables: AtomicRefCell::new(S::with_table_capacity(config.table_capacity)),
            membership: Default::default(),
            registry: AtomicRefCell::new(Registry::new(S::TABLE_COUNT)),
            depth: Cell::new(0),
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Insert or overwrite the `T` row of `id`.
    pub fn set<T>(&self, id: Id, row: T)
    where
        S: HasTable<T>,
    {
        let table = <S as HasTable<T>>::INDEX;
        <S as HasTable<T>>::table_mut(&mut self.tables.borrow_mut()).set(id, row);
        self.membership.borrow_mut().insert(id, table);
        self.registry.borrow_mut().track_insert(id, table);
    }

    /// Remove the `T` row of `id`, returning it.
    ///
    /// Cached queries reading `T` drop `id` at their next top-level evaluation.
    pub fn remove<T>(&self, id: Id) -> Option<T>
    where
        S: HasTable<T>,
    {
        let removed = <S as HasTable<T>>::table_mut(&mut self.tables.borrow_mut()).remove(id)?;
        self.forget(id, <S as HasTable<T>>::INDEX);
        Some(removed)
    }

    /// Remove every row of `id`, returning how many tables held one.
    pub fn remove_entity(&self, id: Id) -> usize {
        let tables: SmallVec<[TableIndex; 8]> = self.membership.borrow().tables_of(id).collect();

        for table in tables.iter().copied() {
            let removed = self.tables.borrow_mut().remove_row(table, id);
            assert!(
                removed,
                "Membership index says {} has a row in {}, but the table doesn't",
                id,
                S::table_name(table)
            );
            self.forget(id, table);
        }

        tables.len()
    }

    fn forget(&self, id: Id, table: TableIndex) {
        let was_member = self.membership.borrow_mut().remove(id, table);
        assert!(
            was_member,
            "Removed the row of {} from {}, but the membership index didn't know about it",
            id,
            S::table_name(table)
        );
        self.registry.borrow_mut().track_remove(id, table);
    }

    /// A copy of the `T` row of `id`.
    pub fn get<T: Clone>(&self, id: Id) -> Option<T>
    where
        S: HasTable<T>,
    {
        <S as HasTable<T>>::table(&self.tables.borrow())
            .get(id)
            .cloned()
    }

    pub fn contains<T>(&self, id: Id) -> bool
    where
        S: HasTable<T>,
    {
        <S as HasTable<T>>::table(&self.tables.borrow()).contains(id)
    }

    /// Number of rows in the `T` table.
    pub fn len<T>(&self) -> usize
    where
        S: HasTable<T>,
    {
        <S as HasTable<T>>::table(&self.tables.borrow()).len()
    }

    /// Every table holding a row for `id`, in index order.
    pub fn tables_of(&self, id: Id) -> SmallVec<[TableIndex; 8]> {
        self.membership.borrow().tables_of(id).collect()
    }

    /// Run `visit` over a fresh join of `Q`'s tables, in increasing id order, until it returns false.
    ///
    /// Nothing is cached and no query is registered.
    pub fn query_once<Q: Query<S>>(&self, mut visit: impl FnMut(Id, &Q) -> bool) {
        let rows = Q::materialize(&self.tables.borrow());

        for (id, row) in rows.iter() {
            if !visit(*id, row) {
                break;
            }
        }
    }

    /// Run `visit` over the cached join of `Q`'s tables, in increasing id order, until it returns false.
    ///
    /// The first call for a signature builds its cache.  Later top-level calls first apply the changes written since
    /// the previous top-level call; calls nested inside another query's callback use the cache as it is.
    pub fn query<Q: Query<S>>(&self, mut visit: impl FnMut(Id, &Q) -> bool) {
        let (cache, _) = self.prepare::<Q>();
        let _nested = DepthGuard::enter(&self.depth);
        let rows = cache.rows().borrow();

        for (id, row) in rows.iter() {
            if !visit(*id, row) {
                break;
            }
        }
    }

    /// Bring the cache of `Q` up to date without iterating it, building it if this is the first use of `Q`.
    ///
    /// Returns what reconciliation did, or `None` if nothing was reconciled because the cache was just built or
    /// because a query is iterating.
    pub fn refresh<Q: Query<S>>(&self) -> Option<ReconcileStats> {
        self.prepare::<Q>().1
    }

    fn prepare<Q: Query<S>>(&self) -> (Rc<QueryCache<Q>>, Option<ReconcileStats>) {
        let existing = self.registry.borrow().lookup::<Q>();
        let (slot, query_cache) = match existing {
            Some(x) => x,
            None => return (self.register::<Q>(), None),
        };

        if self.depth.get() > 0 {
            trace!(
                "Deferring reconciliation of {} ({} pending) at depth {}",
                std::any::type_name::<Q>(),
                self.registry.borrow().pending(slot).len(),
                self.depth.get()
            );
            return (query_cache, None);
        }

        let stats = self.reconcile(slot, &query_cache);
        (query_cache, Some(stats))
    }

    fn register<Q: Query<S>>(&self) -> Rc<QueryCache<Q>> {
        let key = Q::key();
        let rows = Q::materialize(&self.tables.borrow());
        debug!(
            "Registering query {} over tables [{}] with key {}: materialized {} rows",
            std::any::type_name::<Q>(),
            self.describe(key),
            key,
            rows.len()
        );

        let query_cache = Rc::new(QueryCache::new(rows));
        self.registry
            .borrow_mut()
            .register::<Q>(key, query_cache.clone());
        query_cache
    }

    fn reconcile<Q: Query<S>>(&self, slot: SlotIndex, query_cache: &QueryCache<Q>) -> ReconcileStats {
        let diff = self.registry.borrow_mut().take_diff(slot);
        if diff.is_empty() {
            return Default::default();
        }

        let tables = self.tables.borrow();
        let mut rows = query_cache.rows().borrow_mut();
        let stats = cache::reconcile::<S, Q>(&mut rows, &tables, &diff);

        if self.config.verify_reconciliation {
            cache::verify::<S, Q>(&rows, &tables);
        }

        trace!(
            "Reconciled {} (key {}): {} inserted, {} refreshed, {} skipped, {} removed, {} rows",
            std::any::type_name::<Q>(),
            self.registry.borrow().key(slot),
            stats.inserted,
            stats.refreshed,
            stats.skipped,
            stats.removed,
            rows.len()
        );

        stats
    }

    fn describe(&self, key: QueryKey) -> String {
        key.tables()
            .map(S::table_name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Number of query signatures with a cache.
    pub fn registered_queries(&self) -> usize {
        self.registry.borrow().len()
    }

    /// Changes queued for `Q` since its last reconciliation, or `None` if `Q` hasn't been queried yet.
    pub fn pending_changes<Q: Query<S>>(&self) -> Option<usize> {
        let registry = self.registry.borrow();
        let (slot, _) = registry.lookup::<Q>()?;
        Some(registry.pending(slot).len())
    }

    pub fn query_key<Q: Query<S>>() -> QueryKey {
        Q::key()
    }

    /// Whether a cached query is currently iterating, i.e. whether this is being called from a callback.
    pub fn is_querying(&self) -> bool {
        self.depth.get() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::panic::{catch_unwind, AssertUnwindSafe};

    use pretty_assertions::assert_eq;

    use crate::{Schema, Table};

    #[derive(Clone, Debug, PartialEq)]
    struct Position {
        x: i32,
        y: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Name(String);

    #[derive(Clone, Debug, PartialEq)]
    struct Tag(u8);

    #[derive(Schema)]
    struct World {
        positions: Table<Position>,
        names: Table<Name>,
        tags: Table<Tag>,
    }

    type Named = (Position, Name);

    fn pos(x: i32, y: i32) -> Position {
        Position { x, y }
    }

    fn name(n: &str) -> Name {
        Name(n.to_string())
    }

    fn id(i: u64) -> Id {
        Id::new(i)
    }

    fn visit_all<Q: Query<World>>(store: &Store<World>) -> Vec<(u64, Q)> {
        let mut out = vec![];
        store.query::<Q>(|id, row| {
            out.push((id.get(), row.clone()));
            true
        });
        out
    }

    fn ids<Q: Query<World>>(store: &Store<World>) -> Vec<u64> {
        visit_all::<Q>(store).into_iter().map(|(i, _)| i).collect()
    }

    fn setup() -> Store<World> {
        tabula_logging::log_for_tests();
        Store::new()
    }

    #[test]
    fn test_scenario() {
        let store = setup();

        store.set(id(1), pos(0, 0));
        store.set(id(1), name("A"));
        assert_eq!(visit_all::<Named>(&store), vec![(1, (pos(0, 0), name("A")))]);

        store.set(id(2), pos(5, 5));
        assert_eq!(visit_all::<Named>(&store), vec![(1, (pos(0, 0), name("A")))]);

        store.set(id(2), name("B"));
        assert_eq!(
            visit_all::<Named>(&store),
            vec![(1, (pos(0, 0), name("A"))), (2, (pos(5, 5), name("B")))]
        );

        store.set(id(1), pos(9, 9));
        assert_eq!(
            visit_all::<Named>(&store),
            vec![(1, (pos(9, 9), name("A"))), (2, (pos(5, 5), name("B")))]
        );
    }

    #[test]
    fn test_first_evaluation_sees_everything_written_before() {
        let store = setup();
        for i in [5, 3, 9, 1] {
            store.set(id(i), name("n"));
        }
        for i in [9, 4, 1, 5] {
            store.set(id(i), pos(i as i32, 0));
        }

        assert_eq!(ids::<Named>(&store), vec![1, 5, 9]);
        assert_eq!(store.registered_queries(), 1);
    }

    #[test]
    fn test_idempotent() {
        let store = setup();
        for i in 1..=4 {
            store.set(id(i), pos(0, i as i32));
            store.set(id(i), name("x"));
        }

        let first = visit_all::<Named>(&store);
        let second = visit_all::<Named>(&store);
        assert_eq!(first, second);
        assert_eq!(store.refresh::<Named>(), Some(ReconcileStats::default()));
    }

    #[test]
    fn test_short_circuit() {
        let store = setup();
        for i in 1..=10 {
            store.set(id(i), pos(0, 0));
            store.set(id(i), name("x"));
        }

        let mut seen = vec![];
        store.query::<Named>(|id, _| {
            seen.push(id.get());
            seen.len() < 3
        });
        assert_eq!(seen, vec![1, 2, 3]);

        seen.clear();
        store.query_once::<Named>(|id, _| {
            seen.push(id.get());
            false
        });
        assert_eq!(seen, vec![1]);
        assert!(!store.is_querying());
    }

    #[test]
    fn test_query_once_does_not_register() {
        let store = setup();
        store.set(id(2), pos(1, 1));
        store.set(id(2), name("b"));
        store.set(id(1), pos(0, 0));
        store.set(id(1), name("a"));

        let mut seen = vec![];
        store.query_once::<(Name, Position)>(|id, (n, p)| {
            seen.push((id.get(), n.0.clone(), p.x));
            true
        });
        assert_eq!(seen, vec![(1, "a".to_string(), 0), (2, "b".to_string(), 1)]);
        assert_eq!(store.registered_queries(), 0);
        assert_eq!(store.pending_changes::<(Name, Position)>(), None);
    }

    #[test]
    fn test_refresh_reports_work() {
        let store = setup();
        assert_eq!(store.refresh::<Named>(), None);

        store.set(id(1), pos(0, 0));
        store.set(id(1), name("a"));
        store.set(id(2), pos(0, 0));
        assert_eq!(store.pending_changes::<Named>(), Some(2));

        let stats = store.refresh::<Named>().unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(store.pending_changes::<Named>(), Some(0));

        store.set(id(1), pos(3, 3));
        assert_eq!(store.refresh::<Named>().unwrap().refreshed, 1);
    }

    #[test]
    fn test_unrelated_writes_do_not_queue() {
        let store = setup();
        store.refresh::<Named>();
        store.set(id(1), Tag(1));
        assert_eq!(store.pending_changes::<Named>(), Some(0));
        store.set(id(1), name("a"));
        assert_eq!(store.pending_changes::<Named>(), Some(1));
    }

    #[test]
    fn test_nested_same_query() {
        let store = setup();
        for i in 1..=2 {
            store.set(id(i), pos(0, 0));
            store.set(id(i), name("x"));
        }
        ids::<Named>(&store);

        let mut outer = vec![];
        let mut inner = vec![];
        store.query::<Named>(|oid, _| {
            outer.push(oid.get());
            if oid == id(1) {
                store.set(id(3), pos(1, 1));
                store.set(id(3), name("y"));
                store.set(id(2), pos(7, 7));
                assert!(store.is_querying());
                store.query::<Named>(|iid, (p, _)| {
                    inner.push((iid.get(), p.x));
                    true
                });
            }
            true
        });

        // Neither the outer nor the nested iteration sees the writes.
        assert_eq!(outer, vec![1, 2]);
        assert_eq!(inner, vec![(1, 0), (2, 0)]);
        assert_eq!(store.pending_changes::<Named>(), Some(2));

        assert_eq!(
            visit_all::<Named>(&store),
            vec![
                (1, (pos(0, 0), name("x"))),
                (2, (pos(7, 7), name("x"))),
                (3, (pos(1, 1), name("y"))),
            ]
        );
    }

    #[test]
    fn test_nested_other_queries() {
        let store = setup();
        store.set(id(1), pos(0, 0));
        store.set(id(1), name("a"));
        store.set(id(1), Tag(1));
        ids::<(Tag,)>(&store);

        store.set(id(2), Tag(2));

        let mut tags = vec![];
        let mut fresh = vec![];
        store.query::<Named>(|_, _| {
            // Registered already: stale until the next top-level call.
            store.query::<(Tag,)>(|id, _| {
                tags.push(id.get());
                true
            });
            // Never seen before: materialized from the current tables.
            store.query::<(Position, Tag)>(|id, _| {
                fresh.push(id.get());
                true
            });
            true
        });

        assert_eq!(tags, vec![1]);
        assert_eq!(fresh, vec![1]);
        assert_eq!(ids::<(Tag,)>(&store), vec![1, 2]);
        assert_eq!(store.registered_queries(), 3);
    }

    #[test]
    fn test_depth_restored_after_panic() {
        let store = setup();
        store.set(id(1), Tag(1));

        let res = catch_unwind(AssertUnwindSafe(|| {
            store.query::<(Tag,)>(|_, _| panic!("callback failed"));
        }));
        assert!(res.is_err());
        assert!(!store.is_querying());

        store.set(id(2), Tag(2));
        assert_eq!(ids::<(Tag,)>(&store), vec![1, 2]);
    }

    #[test]
    fn test_same_tables_different_order() {
        let store = setup();
        store.set(id(1), pos(1, 1));
        store.set(id(1), name("a"));

        assert_eq!(ids::<(Position, Name)>(&store), vec![1]);
        assert_eq!(ids::<(Name, Position)>(&store), vec![1]);
        assert_eq!(
            Store::<World>::query_key::<(Name, Position)>(),
            Store::<World>::query_key::<(Position, Name)>()
        );

        // Both signatures get notified; draining one must not starve the other.
        store.set(id(2), pos(2, 2));
        store.set(id(2), name("b"));
        assert_eq!(ids::<(Position, Name)>(&store), vec![1, 2]);
        assert_eq!(ids::<(Name, Position)>(&store), vec![1, 2]);
        assert_eq!(store.registered_queries(), 2);
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = setup();
        let b: Store<World> = Store::new();

        a.set(id(1), pos(0, 0));
        a.set(id(1), name("a"));
        assert_eq!(ids::<Named>(&a), vec![1]);
        assert_eq!(ids::<Named>(&b), Vec::<u64>::new());

        b.set(id(7), pos(0, 0));
        b.set(id(7), name("b"));
        assert_eq!(ids::<Named>(&b), vec![7]);
        assert_eq!(ids::<Named>(&a), vec![1]);
    }

    #[test]
    fn test_remove() {
        let store = setup();
        for i in 1..=3 {
            store.set(id(i), pos(0, 0));
            store.set(id(i), name("x"));
        }
        assert_eq!(ids::<Named>(&store), vec![1, 2, 3]);

        assert_eq!(store.remove::<Name>(id(2)), Some(name("x")));
        assert_eq!(store.remove::<Name>(id(2)), None);
        assert!(!store.contains::<Name>(id(2)));
        assert!(store.contains::<Position>(id(2)));
        assert_eq!(ids::<Named>(&store), vec![1, 3]);
        assert_eq!(ids::<(Position,)>(&store), vec![1, 2, 3]);

        store.set(id(2), name("back"));
        assert_eq!(
            visit_all::<Named>(&store)[1],
            (2, (pos(0, 0), name("back")))
        );
    }

    #[test]
    fn test_remove_then_write_other_table() {
        let store = setup();
        store.set(id(1), pos(0, 0));
        store.set(id(1), name("a"));
        assert_eq!(ids::<Named>(&store), vec![1]);

        store.remove::<Name>(id(1));
        store.set(id(1), pos(1, 1));
        assert_eq!(ids::<Named>(&store), Vec::<u64>::new());
    }

    #[test]
    fn test_remove_entity() {
        let store = setup();
        store.set(id(1), pos(0, 0));
        store.set(id(1), name("a"));
        store.set(id(1), Tag(1));
        store.set(id(2), Tag(2));
        assert_eq!(ids::<Named>(&store), vec![1]);
        assert_eq!(ids::<(Tag,)>(&store), vec![1, 2]);

        assert_eq!(
            store.tables_of(id(1)).as_slice(),
            &[TableIndex::new(0), TableIndex::new(1), TableIndex::new(2)]
        );
        assert_eq!(store.remove_entity(id(1)), 3);
        assert_eq!(store.remove_entity(id(1)), 0);
        assert!(store.tables_of(id(1)).is_empty());
        assert_eq!(store.len::<Position>(), 0);
        assert_eq!(store.len::<Tag>(), 1);

        assert_eq!(ids::<Named>(&store), Vec::<u64>::new());
        assert_eq!(ids::<(Tag,)>(&store), vec![2]);
    }

    #[test]
    fn test_removal_inside_callback() {
        let store = setup();
        for i in 1..=3 {
            store.set(id(i), Tag(i as u8));
        }
        ids::<(Tag,)>(&store);

        let mut seen = vec![];
        store.query::<(Tag,)>(|id, _| {
            seen.push(id.get());
            store.remove_entity(id);
            true
        });
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(store.len::<Tag>(), 0);
        assert_eq!(ids::<(Tag,)>(&store), Vec::<u64>::new());
    }

    #[test]
    fn test_get() {
        let store = setup();
        store.set(id(4), name("four"));
        assert_eq!(store.get::<Name>(id(4)), Some(name("four")));
        assert_eq!(store.get::<Position>(id(4)), None);
        assert_eq!(store.get::<Name>(id(5)), None);
    }

    #[test]
    fn test_with_config() {
        let config = StoreConfig {
            table_capacity: 16,
            verify_reconciliation: true,
        };
        let store: Store<World> = Store::with_config(config.clone());
        assert_eq!(store.config(), &config);

        store.set(id(1), pos(0, 0));
        store.set(id(1), name("a"));
        ids::<Named>(&store);
        store.set(id(2), pos(0, 0));
        store.set(id(2), name("b"));
        assert_eq!(ids::<Named>(&store), vec![1, 2]);
    }
}
