//! Bucketed spatial index over agent positions.
//!
//! Buckets are `bucket_size × bucket_size` squares with
//! `bucket_size = max(vision_radius, interaction_radius, 1)`, so a radius
//! query touches a constant number of bucket rings. Consistency between the
//! reverse map and the buckets is a hard invariant; a mismatch is a bug and
//! panics immediately.

use std::collections::HashMap;

use crate::types::{AgentId, Position};

#[derive(Clone, Debug)]
pub struct SpatialIndex {
    bucket_size: i32,
    buckets: HashMap<(i32, i32), Vec<AgentId>>,
    positions: HashMap<AgentId, Position>,
}

impl SpatialIndex {
    pub fn new(bucket_size: u32) -> Self {
        Self {
            bucket_size: bucket_size.max(1) as i32,
            buckets: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    fn bucket_of(&self, pos: Position) -> (i32, i32) {
        (pos.x.div_euclid(self.bucket_size), pos.y.div_euclid(self.bucket_size))
    }

    pub fn insert(&mut self, id: AgentId, pos: Position) {
        let prev = self.positions.insert(id, pos);
        assert!(prev.is_none(), "agent {id} inserted twice into spatial index");
        self.buckets.entry(self.bucket_of(pos)).or_default().push(id);
    }

    /// Move an agent. A same-position update is a no-op.
    pub fn update(&mut self, id: AgentId, new_pos: Position) {
        let old_pos = *self
            .positions
            .get(&id)
            .unwrap_or_else(|| panic!("agent {id} missing from spatial index"));
        if old_pos == new_pos {
            return;
        }
        let old_bucket = self.bucket_of(old_pos);
        let new_bucket = self.bucket_of(new_pos);
        self.positions.insert(id, new_pos);
        if old_bucket == new_bucket {
            return;
        }
        let slot = self
            .buckets
            .get_mut(&old_bucket)
            .unwrap_or_else(|| panic!("agent {id}: bucket {old_bucket:?} missing"));
        let idx = slot
            .iter()
            .position(|&a| a == id)
            .unwrap_or_else(|| panic!("agent {id} absent from bucket {old_bucket:?}"));
        slot.swap_remove(idx);
        if slot.is_empty() {
            self.buckets.remove(&old_bucket);
        }
        self.buckets.entry(new_bucket).or_default().push(id);
    }

    pub fn remove(&mut self, id: AgentId) {
        let pos = self
            .positions
            .remove(&id)
            .unwrap_or_else(|| panic!("agent {id} missing from spatial index"));
        let bucket = self.bucket_of(pos);
        let slot = self.buckets.get_mut(&bucket).expect("bucket missing on remove");
        let idx = slot.iter().position(|&a| a == id).expect("agent absent from bucket");
        slot.swap_remove(idx);
        if slot.is_empty() {
            self.buckets.remove(&bucket);
        }
    }

    pub fn position_of(&self, id: AgentId) -> Option<Position> {
        self.positions.get(&id).copied()
    }

    /// Agents within Manhattan `radius` of `pos` (inclusive), ascending id.
    /// Includes any agent standing on `pos` itself; callers filter self.
    pub fn query_within(&self, pos: Position, radius: u32) -> Vec<AgentId> {
        let r = radius as i32;
        let rings = r.div_euclid(self.bucket_size) + 1;
        let center = self.bucket_of(pos);
        let mut found = Vec::new();
        for bx in (center.0 - rings)..=(center.0 + rings) {
            for by in (center.1 - rings)..=(center.1 + rings) {
                let Some(slot) = self.buckets.get(&(bx, by)) else {
                    continue;
                };
                for &id in slot {
                    let p = self.positions[&id];
                    if p.manhattan(pos) <= radius {
                        found.push(id);
                    }
                }
            }
        }
        found.sort_unstable();
        found
    }

    /// Unordered agent pairs within Manhattan `radius`, ascending
    /// `(min_id, max_id)`.
    pub fn query_pairs_within(&self, radius: u32) -> Vec<(AgentId, AgentId)> {
        let mut pairs = Vec::new();
        let mut ids: Vec<AgentId> = self.positions.keys().copied().collect();
        ids.sort_unstable();
        for &id in &ids {
            let pos = self.positions[&id];
            for other in self.query_within(pos, radius) {
                if other > id {
                    pairs.push((id, other));
                }
            }
        }
        pairs.sort_unstable();
        pairs
    }

    /// Verify that every tracked agent appears in exactly its own bucket,
    /// exactly once. Panics on any inconsistency.
    pub fn assert_consistent(&self) {
        let mut counted = 0usize;
        for (&bucket, slot) in &self.buckets {
            assert!(!slot.is_empty(), "empty bucket {bucket:?} retained");
            for &id in slot {
                let pos = self
                    .positions
                    .get(&id)
                    .unwrap_or_else(|| panic!("bucket {bucket:?} holds untracked agent {id}"));
                assert_eq!(
                    self.bucket_of(*pos),
                    bucket,
                    "agent {id} at {pos} filed under wrong bucket {bucket:?}"
                );
                assert_eq!(
                    slot.iter().filter(|&&a| a == id).count(),
                    1,
                    "agent {id} duplicated in bucket {bucket:?}"
                );
                counted += 1;
            }
        }
        assert_eq!(counted, self.positions.len(), "bucket/reverse-map size mismatch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(agents: &[(u32, i32, i32)]) -> SpatialIndex {
        let mut index = SpatialIndex::new(5);
        for &(id, x, y) in agents {
            index.insert(AgentId(id), Position::new(x, y));
        }
        index
    }

    #[test]
    fn query_filters_by_manhattan_distance() {
        let index = index_with(&[(0, 0, 0), (1, 2, 2), (2, 3, 3), (3, 10, 10)]);
        assert_eq!(
            index.query_within(Position::new(0, 0), 4),
            vec![AgentId(0), AgentId(1)]
        );
        assert_eq!(
            index.query_within(Position::new(0, 0), 6),
            vec![AgentId(0), AgentId(1), AgentId(2)]
        );
    }

    #[test]
    fn update_moves_between_buckets() {
        let mut index = index_with(&[(7, 1, 1)]);
        index.update(AgentId(7), Position::new(23, 17));
        index.assert_consistent();
        assert!(index.query_within(Position::new(1, 1), 3).is_empty());
        assert_eq!(index.query_within(Position::new(23, 17), 0), vec![AgentId(7)]);
    }

    #[test]
    fn same_position_update_is_a_noop() {
        let mut index = index_with(&[(1, 4, 4)]);
        let before = index.query_within(Position::new(4, 4), 1);
        index.update(AgentId(1), Position::new(4, 4));
        index.assert_consistent();
        assert_eq!(index.query_within(Position::new(4, 4), 1), before);
    }

    #[test]
    fn pairs_are_unordered_and_sorted() {
        let index = index_with(&[(2, 0, 0), (0, 1, 0), (1, 0, 1), (9, 20, 20)]);
        assert_eq!(
            index.query_pairs_within(2),
            vec![
                (AgentId(0), AgentId(1)),
                (AgentId(0), AgentId(2)),
                (AgentId(1), AgentId(2)),
            ]
        );
    }

    #[test]
    fn remove_clears_both_maps() {
        let mut index = index_with(&[(1, 2, 2), (2, 2, 3)]);
        index.remove(AgentId(1));
        index.assert_consistent();
        assert_eq!(index.query_within(Position::new(2, 2), 2), vec![AgentId(2)]);
        assert_eq!(index.position_of(AgentId(1)), None);
    }

    #[test]
    fn negative_coordinates_bucket_correctly() {
        let mut index = SpatialIndex::new(4);
        index.insert(AgentId(1), Position::new(-1, -1));
        index.insert(AgentId(2), Position::new(1, 1));
        index.assert_consistent();
        assert_eq!(
            index.query_within(Position::new(0, 0), 2),
            vec![AgentId(1), AgentId(2)]
        );
    }
}
