// Ordered, uniquely-positioned navigation marks.
//
// Positions are the order key and live in a BTreeMap so every lookup the
// transport needs (nearest before/after, viewport range) is a tree walk.
// Callers only ever hold a MarkId; the mark itself stays inside the store.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkId(pub u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mark {
    pub id: MarkId,
    pub position: u64, // sample frame
    pub label: String,
}

// What gets persisted per mark
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkRecord {
    pub position: u64,
    #[serde(default)]
    pub label: String,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkError {
    #[error("a mark already exists at frame {0}")]
    PositionOccupied(u64),
    #[error("no such mark ({0:?})")]
    UnknownMark(MarkId),
}

#[derive(Clone, Debug, Default)]
pub struct MarkStore {
    by_position: BTreeMap<u64, MarkId>,
    marks: HashMap<MarkId, Mark>,
    next_id: u64,
}

impl MarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_position.is_empty()
    }

    pub fn get(&self, id: MarkId) -> Option<&Mark> {
        self.marks.get(&id)
    }

    pub fn at_position(&self, position: u64) -> Option<&Mark> {
        self.by_position.get(&position).and_then(|id| self.marks.get(id))
    }

    /// Insert a mark, rejecting the call if `position` is already taken.
    /// The existing mark (and its label) is left alone on rejection.
    pub fn insert(&mut self, position: u64, label: impl Into<String>) -> Result<MarkId, MarkError> {
        if self.by_position.contains_key(&position) {
            return Err(MarkError::PositionOccupied(position));
        }
        let id = MarkId(self.next_id);
        self.next_id += 1;
        self.by_position.insert(position, id);
        self.marks.insert(id, Mark { id, position, label: label.into() });
        Ok(id)
    }

    pub fn delete(&mut self, id: MarkId) -> Option<Mark> {
        let mark = self.marks.remove(&id)?;
        self.by_position.remove(&mark.position);
        Some(mark)
    }

    /// Move a mark to a new frame. Moving onto a frame held by another mark
    /// is rejected and leaves both marks where they were; moving onto its
    /// own frame is a no-op.
    pub fn reposition(&mut self, id: MarkId, new_position: u64) -> Result<(), MarkError> {
        let old_position = self.marks.get(&id).ok_or(MarkError::UnknownMark(id))?.position;
        if old_position == new_position {
            return Ok(());
        }
        if self.by_position.contains_key(&new_position) {
            return Err(MarkError::PositionOccupied(new_position));
        }
        // both maps change under one &mut borrow, so no reader sees the halfway state
        self.by_position.remove(&old_position);
        self.by_position.insert(new_position, id);
        if let Some(mark) = self.marks.get_mut(&id) {
            mark.position = new_position;
        }
        Ok(())
    }

    pub fn relabel(&mut self, id: MarkId, label: impl Into<String>) -> Result<(), MarkError> {
        let mark = self.marks.get_mut(&id).ok_or(MarkError::UnknownMark(id))?;
        mark.label = label.into();
        Ok(())
    }

    pub fn nearest_at_or_before(&self, position: u64) -> Option<&Mark> {
        self.by_position
            .range(..=position)
            .next_back()
            .and_then(|(_, id)| self.marks.get(id))
    }

    pub fn nearest_strictly_before(&self, position: u64) -> Option<&Mark> {
        self.by_position
            .range(..position)
            .next_back()
            .and_then(|(_, id)| self.marks.get(id))
    }

    pub fn nearest_strictly_after(&self, position: u64) -> Option<&Mark> {
        self.by_position
            .range((Bound::Excluded(position), Bound::Unbounded))
            .next()
            .and_then(|(_, id)| self.marks.get(id))
    }

    // Marks with low <= position <= high, ascending. Call again to restart.
    pub fn range(&self, low: u64, high: u64) -> impl Iterator<Item = &Mark> + '_ {
        let ids = if low <= high {
            Some(self.by_position.range(low..=high))
        } else {
            None
        };
        ids.into_iter()
            .flatten()
            .filter_map(|(_, id)| self.marks.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mark> + '_ {
        self.by_position.values().filter_map(|id| self.marks.get(id))
    }

    pub fn to_records(&self) -> Vec<MarkRecord> {
        self.iter()
            .map(|m| MarkRecord { position: m.position, label: m.label.clone() })
            .collect()
    }

    // Rebuild from persisted records. Duplicate positions keep the first one.
    pub fn from_records(records: &[MarkRecord]) -> Self {
        let mut store = Self::new();
        for r in records {
            let _ = store.insert(r.position, r.label.clone());
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_sorted_unique(store: &MarkStore) {
        let positions: Vec<u64> = store.iter().map(|m| m.position).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "not sorted/unique: {positions:?}");
        assert_eq!(positions.len(), store.len());
        assert_eq!(store.marks.len(), store.by_position.len());
    }

    #[test]
    fn insert_then_nearest_at_or_before_finds_it() {
        for pos in [0u64, 1, 511, 44_100, u32::MAX as u64] {
            let mut store = MarkStore::new();
            store.insert(pos + 7, "later").unwrap();
            if pos > 0 {
                store.insert(pos - 1, "earlier").unwrap();
            }
            let id = store.insert(pos, "target").unwrap();
            let found = store.nearest_at_or_before(pos).unwrap();
            assert_eq!(found.id, id);
        }
    }

    #[test]
    fn duplicate_insert_is_rejected_and_size_unchanged() {
        let mut store = MarkStore::new();
        store.insert(1000, "A").unwrap();
        let err = store.insert(1000, "B").unwrap_err();
        assert_eq!(err, MarkError::PositionOccupied(1000));
        assert_eq!(store.len(), 1);
        assert_eq!(store.at_position(1000).unwrap().label, "A");
    }

    #[test]
    fn reposition_keeps_identity_and_label() {
        let mut store = MarkStore::new();
        let id = store.insert(100, "verse").unwrap();
        store.insert(200, "chorus").unwrap();
        store.reposition(id, 300).unwrap();

        let mark = store.get(id).unwrap();
        assert_eq!(mark.position, 300);
        assert_eq!(mark.label, "verse");
        assert!(store.at_position(100).is_none());
        let order: Vec<&str> = store.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(order, ["chorus", "verse"]);
    }

    #[test]
    fn reposition_onto_occupied_position_leaves_both_marks() {
        let mut store = MarkStore::new();
        let a = store.insert(100, "A").unwrap();
        let b = store.insert(200, "B").unwrap();

        assert_eq!(store.reposition(a, 200), Err(MarkError::PositionOccupied(200)));
        assert_eq!(store.get(a).unwrap().position, 100);
        assert_eq!(store.get(b).unwrap().position, 200);
        assert_eq!(store.at_position(200).unwrap().id, b);

        // same-position move is fine
        assert_eq!(store.reposition(a, 100), Ok(()));
    }

    #[test]
    fn unknown_ids_are_reported() {
        let mut store = MarkStore::new();
        let id = store.insert(5, "x").unwrap();
        store.delete(id).unwrap();
        assert!(store.delete(id).is_none());
        assert_eq!(store.reposition(id, 6), Err(MarkError::UnknownMark(id)));
        assert_eq!(store.relabel(id, "y"), Err(MarkError::UnknownMark(id)));
    }

    #[test]
    fn nearest_queries() {
        let mut store = MarkStore::new();
        for p in [100, 200, 300] {
            store.insert(p, "").unwrap();
        }
        assert!(store.nearest_at_or_before(99).is_none());
        assert_eq!(store.nearest_at_or_before(200).unwrap().position, 200);
        assert_eq!(store.nearest_at_or_before(299).unwrap().position, 200);
        assert_eq!(store.nearest_strictly_before(200).unwrap().position, 100);
        assert!(store.nearest_strictly_before(100).is_none());
        assert!(store.nearest_strictly_before(0).is_none());
        assert_eq!(store.nearest_strictly_after(200).unwrap().position, 300);
        assert_eq!(store.nearest_strictly_after(0).unwrap().position, 100);
        assert!(store.nearest_strictly_after(300).is_none());
    }

    #[test]
    fn range_is_inclusive_and_restartable() {
        let mut store = MarkStore::new();
        for p in [10, 20, 30, 40] {
            store.insert(p, format!("m{p}")).unwrap();
        }
        let first: Vec<u64> = store.range(20, 30).map(|m| m.position).collect();
        let again: Vec<u64> = store.range(20, 30).map(|m| m.position).collect();
        assert_eq!(first, [20, 30]);
        assert_eq!(first, again);
        assert_eq!(store.range(31, 39).count(), 0);
        assert_eq!(store.range(40, 10).count(), 0);
    }

    #[test]
    fn mixed_operations_keep_store_sorted() {
        let mut store = MarkStore::new();
        let mut ids = Vec::new();
        // deterministic pseudo-random walk over positions
        let mut x: u64 = 12345;
        for step in 0..500 {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let pos = (x >> 33) % 64;
            match step % 4 {
                0 | 1 => {
                    if let Ok(id) = store.insert(pos, format!("{step}")) {
                        ids.push(id);
                    }
                }
                2 if !ids.is_empty() => {
                    let id = ids[(x as usize) % ids.len()];
                    let _ = store.reposition(id, pos);
                }
                _ if !ids.is_empty() => {
                    let id = ids.swap_remove((x as usize) % ids.len());
                    store.delete(id);
                }
                _ => {}
            }
            assert_sorted_unique(&store);
        }
    }

    #[test]
    fn records_roundtrip() {
        let mut store = MarkStore::new();
        store.insert(5000, "B").unwrap();
        store.insert(1000, "A").unwrap();
        let records = store.to_records();
        assert_eq!(records[0], MarkRecord { position: 1000, label: "A".into() });

        let rebuilt = MarkStore::from_records(&records);
        assert_eq!(rebuilt.to_records(), records);
    }
}
