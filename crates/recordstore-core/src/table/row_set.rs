//! Unique row identifiers of a table.

use std::collections::HashSet;

/// Ordered, unique row identifiers; insertion order is row order.
///
/// Omitted ids are assigned as one past the largest id seen so far, so
/// auto-assigned ids never collide with explicit ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    ids: Vec<i64>,
    seen: HashSet<i64>,
    next: i64,
}

impl RowSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored ids; returns the first duplicate on failure.
    pub fn from_ids(ids: Vec<i64>) -> Result<Self, i64> {
        let mut set = Self::new();
        for id in ids {
            if !set.insert(id) {
                return Err(id);
            }
        }
        Ok(set)
    }

    /// The id a row would receive, or `Err(id)` if `id` is taken.
    pub fn check(&self, id: Option<i64>) -> Result<i64, i64> {
        match id {
            Some(id) if self.seen.contains(&id) => Err(id),
            Some(id) => Ok(id),
            None => Ok(self.next),
        }
    }

    fn insert(&mut self, id: i64) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.ids.push(id);
        self.next = self.next.max(id.saturating_add(1));
        true
    }

    /// Append an id previously returned by [`Self::check`].
    pub(crate) fn push(&mut self, id: i64) {
        self.insert(id);
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in row order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// Row position of `id`.
    pub fn position(&self, id: i64) -> Option<usize> {
        if !self.seen.contains(&id) {
            return None;
        }
        self.ids.iter().position(|&x| x == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_ids_follow_explicit_ones() {
        let mut rows = RowSet::new();
        let id = rows.check(None).unwrap();
        rows.push(id);
        rows.push(rows.check(Some(10)).unwrap());
        rows.push(rows.check(None).unwrap());
        assert_eq!(rows.ids(), &[0, 10, 11]);
        assert_eq!(rows.check(Some(10)), Err(10));
        assert_eq!(rows.position(11), Some(2));
    }

    #[test]
    fn from_ids_rejects_duplicates() {
        assert_eq!(RowSet::from_ids(vec![1, 2, 1]), Err(1));
        assert_eq!(RowSet::from_ids(vec![3, 4]).unwrap().len(), 2);
    }
}
