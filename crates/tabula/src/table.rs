//! The [Table] is the per-row-type storage of a schema: a single vec of `(Id, row)` pairs kept sorted by id.
use crate::id::Id;

/// Ordered storage for the rows of one row type.
///
/// Rows live in one vec sorted by [Id] with no duplicates, so lookups are a binary search and iteration is in id order
/// without any extra work.  Setting an id which is already present overwrites the row in place; setting a new one
/// inserts it at its sorted position.  Ids are usually handed out in increasing order, in which case inserting is a
/// push.
///
/// Tables are only ever mutated through their owning store, which is what keeps query caches informed.  Anything that
/// has a shared reference may read freely.
#[derive(Clone, Debug)]
pub struct Table<T> {
    rows: Vec<(Id, T)>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self { rows: vec![] }
    }
}

impl<T> Table<T> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
        }
    }

    fn search(&self, id: Id) -> Result<usize, usize> {
        self.rows.binary_search_by_key(&id, |(i, _)| *i)
    }

    /// Insert or overwrite the row for `id`, returning the stored row.
    pub fn set(&mut self, id: Id, row: T) -> &mut T {
        let index = match self.search(id) {
            Ok(i) => {
                self.rows[i].1 = row;
                i
            }
            Err(i) => {
                self.rows.insert(i, (id, row));
                i
            }
        };

        &mut self.rows[index].1
    }

    pub fn get(&self, id: Id) -> Option<&T> {
        let i = self.search(id).ok()?;
        Some(&self.rows[i].1)
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        let i = self.search(id).ok()?;
        Some(&mut self.rows[i].1)
    }

    pub fn contains(&self, id: Id) -> bool {
        self.search(id).is_ok()
    }

    /// Remove the row for `id`, if any.
    pub fn remove(&mut self, id: Id) -> Option<T> {
        let i = self.search(id).ok()?;
        Some(self.rows.remove(i).1)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns an `(Id, row)` iterator in increasing id order.
    pub fn iter(&self) -> impl Iterator<Item = (Id, &T)> {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.rows.iter().map(|(id, _)| *id)
    }
}
