//! Query signatures.
//!
//! A query signature is a tuple of row types, for example `(Position, Name)`.  The tuple is also the row type of the
//! query's cache: each joined id carries one clone of each participating row.  [Query] is implemented for tuples of up
//! to 8 row types, for any schema which has a table for each of them.
use crate::id::Id;
use crate::query_key::QueryKey;
use crate::schema::{HasTable, Schema};

/// A join over some of the tables of schema `S`.
///
/// The first row type drives the join: materialization walks its table in id order and keeps an id only if every
/// other participating table holds a row for it.
pub trait Query<S: Schema>: Clone + 'static {
    /// The participating tables.
    fn key() -> QueryKey;

    /// Whether every participating table currently holds `id`.
    fn is_joined(schema: &S, id: Id) -> bool;

    /// Copy out the joined row for `id`, or `None` if some participating table lacks it.
    fn fetch(schema: &S, id: Id) -> Option<Self>;

    /// The full inner join of the participating tables, in increasing id order.
    fn materialize(schema: &S) -> Vec<(Id, Self)>;
}

macro_rules! impl_query {
    ($first:ident $(, $rest:ident)*) => {
        impl<S, $first, $($rest),*> Query<S> for ($first, $($rest,)*)
        where
            S: Schema + HasTable<$first> $(+ HasTable<$rest>)*,
            $first: Clone + 'static,
            $($rest: Clone + 'static,)*
        {
            fn key() -> QueryKey {
                QueryKey::empty()
                    .with(<S as HasTable<$first>>::INDEX)
                    $(.with(<S as HasTable<$rest>>::INDEX))*
            }

            fn is_joined(schema: &S, id: Id) -> bool {
                <S as HasTable<$first>>::table(schema).contains(id)
                    $(&& <S as HasTable<$rest>>::table(schema).contains(id))*
            }

            fn fetch(schema: &S, id: Id) -> Option<Self> {
                Some((
                    <S as HasTable<$first>>::table(schema).get(id)?.clone(),
                    $(<S as HasTable<$rest>>::table(schema).get(id)?.clone(),)*
                ))
            }

            fn materialize(schema: &S) -> Vec<(Id, Self)> {
                <S as HasTable<$first>>::table(schema)
                    .iter()
                    .filter_map(|(id, driver)| {
                        let row = (
                            driver.clone(),
                            $(<S as HasTable<$rest>>::table(schema).get(id)?.clone(),)*
                        );
                        Some((id, row))
                    })
                    .collect()
            }
        }
    };
}

impl_query!(T0);
impl_query!(T0, T1);
impl_query!(T0, T1, T2);
impl_query!(T0, T1, T2, T3);
impl_query!(T0, T1, T2, T3, T4);
impl_query!(T0, T1, T2, T3, T4, T5);
impl_query!(T0, T1, T2, T3, T4, T5, T6);
impl_query!(T0, T1, T2, T3, T4, T5, T6, T7);
