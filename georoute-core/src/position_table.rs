// Snowcap: Synthesizing Network-Wide Configuration Updates
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Neighbor position table: per-node knowledge of one-hop neighbors,
//! with time-based eviction and on-demand Gabriel-graph planarization.

use crate::types::{NodeId, Position, Time};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// One neighbor's last-known position and the time it was last heard
/// from.
#[derive(Debug, Clone, Copy, PartialEq)]
struct NeighborEntry {
    position: Position,
    last_heard: Time,
}

/// Per-node table of one-hop neighbors.
///
/// Entries are kept in a `BTreeMap` rather than a hash map so that
/// "first entry in iteration order" (used for tie-breaking in
/// `greedy_best` and as the fallback in `perimeter_best`) is a
/// reproducible, deterministic notion, ordered by `NodeId`.
#[derive(Debug)]
pub struct PositionTable {
    entries: BTreeMap<NodeId, NeighborEntry>,
    /// Neighbors excluded by the most recent `planarize` call.
    planarized_excluded: BTreeSet<NodeId>,
    entry_lifetime: Duration,
}

impl PositionTable {
    /// Build an empty table. `entry_lifetime` is the tunable eviction
    /// window, exposed here rather than hardcoded so a host can retune
    /// it for its own Hello interval.
    pub fn new(entry_lifetime: Duration) -> Self {
        PositionTable {
            entries: BTreeMap::new(),
            planarized_excluded: BTreeSet::new(),
            entry_lifetime,
        }
    }

    /// Insert or overwrite a neighbor's position, bumping its
    /// `last_heard` to `now`. A plain upsert — no iterator is
    /// dereferenced across the lookup and the insert.
    pub fn add_or_update(&mut self, id: NodeId, position: Position, now: Time) {
        self.entries.insert(id, NeighborEntry { position, last_heard: now });
    }

    /// Remove a neighbor. Idempotent.
    pub fn remove(&mut self, id: NodeId) {
        self.entries.remove(&id);
    }

    /// Membership test.
    pub fn is_neighbor(&self, id: NodeId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Last-known position of a neighbor, if present.
    pub fn position_of(&self, id: NodeId) -> Option<Position> {
        self.entries.get(&id).map(|e| e.position)
    }

    /// Last time `id` was heard from. Returns `Time(0.0)` for
    /// `NodeId::ZERO`; panics if `id` is absent, since the caller must
    /// check `is_neighbor` first.
    pub fn last_heard(&self, id: NodeId) -> Time {
        if id == NodeId::ZERO {
            return Time(0.0);
        }
        self.entries.get(&id).expect("last_heard called for an unknown neighbor").last_heard
    }

    /// Evict entries whose `last_heard + entry_lifetime <= now`.
    pub fn purge(&mut self, now: Time) {
        let lifetime = self.entry_lifetime;
        self.entries.retain(|_, e| e.last_heard + lifetime > now);
    }

    /// Empty the table and the planarized-excluded set.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.planarized_excluded.clear();
    }

    /// Snapshot of every neighbor, its position, and whether the most
    /// recent `planarize` call excluded it — for diagnostics and tests.
    pub fn neighbors_snapshot(&self) -> Vec<(NodeId, Position, bool)> {
        self.entries
            .iter()
            .map(|(id, e)| (*id, e.position, self.planarized_excluded.contains(id)))
            .collect()
    }

    /// Number of live neighbors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True iff there are no live neighbors.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Greedy forwarding: the neighbor minimizing distance to `dst_pos`,
    /// returned only if it makes strict progress over `self_pos`.
    pub fn greedy_best(&mut self, dst_pos: Position, self_pos: Position, now: Time) -> NodeId {
        self.purge(now);

        if self.entries.is_empty() {
            return NodeId::ZERO;
        }

        let initial_distance = self_pos.distance(&dst_pos);
        let mut best_id = NodeId::ZERO;
        let mut best_distance = f64::INFINITY;
        for (id, entry) in self.entries.iter() {
            let d = entry.position.distance(&dst_pos);
            if d < best_distance {
                best_distance = d;
                best_id = *id;
            }
        }

        if best_distance < initial_distance {
            best_id
        } else {
            NodeId::ZERO
        }
    }

    /// Electrostatic-repulsion forwarding: minimizes the potential
    /// `phi(p) = -q/|p - dst| + q_L / |p - hole_center|^n` with an
    /// induced image charge pushing the packet around the hole,
    /// returning the minimizing neighbor only if it improves on
    /// `self_pos`'s potential.
    pub fn electrostatic_best(
        &mut self,
        dst_pos: Position,
        self_pos: Position,
        hole_center: Position,
        hole_radius: f64,
        now: Time,
    ) -> NodeId {
        self.purge(now);

        if self.entries.is_empty() {
            return NodeId::ZERO;
        }

        const Q: f64 = 1.0;
        const N: f64 = 2.0;

        let b = hole_center.distance(&dst_pos);
        let q_l = Q * hole_radius.powf(N + 1.0) / (N * (b + hole_radius).powi(2));

        let potential = |p: Position| -> f64 {
            let d_dst = p.distance(&dst_pos);
            let d_hole = p.distance(&hole_center);
            if d_dst == 0.0 || d_hole == 0.0 {
                return f64::NAN;
            }
            -Q / d_dst + q_l / d_hole.powf(N)
        };

        let init_potential = potential(self_pos);
        if init_potential.is_nan() {
            return NodeId::ZERO;
        }

        let mut best_id = NodeId::ZERO;
        let mut best_potential = f64::INFINITY;
        for (id, entry) in self.entries.iter() {
            let phi = potential(entry.position);
            if phi.is_nan() {
                continue;
            }
            if phi < best_potential {
                best_potential = phi;
                best_id = *id;
            }
        }

        if best_id != NodeId::ZERO && best_potential < init_potential {
            best_id
        } else {
            NodeId::ZERO
        }
    }

    /// Perimeter (right-hand-rule) forwarding on the planarized
    /// subgraph: the neighbor with the smallest strictly-positive
    /// counter-clockwise angle from the incoming edge `self -> prev_hop`
    /// to `self -> neighbor`.
    pub fn perimeter_best(&mut self, prev_hop_pos: Position, self_pos: Position, now: Time) -> NodeId {
        self.purge(now);
        self.planarize(self_pos);

        if self.entries.is_empty() {
            return NodeId::ZERO;
        }

        let mut best_id = NodeId::ZERO;
        let mut best_angle = 360.0;
        for (id, entry) in self.entries.iter() {
            if self.planarized_excluded.contains(id) {
                continue;
            }
            let a = angle(self_pos, prev_hop_pos, entry.position);
            if a > 0.0 && a < best_angle {
                best_angle = a;
                best_id = *id;
            }
        }

        if best_id == NodeId::ZERO {
            best_id = *self.entries.keys().next().unwrap();
        }
        best_id
    }

    /// Recompute the Gabriel-graph excluded set relative to `self_pos`.
    /// A neighbor `v` is excluded iff some other neighbor `w` makes
    /// `distance(self, v) > max(distance(self, w), distance(v, w))`
    /// — i.e. `w` lies inside the disk with diameter `(self, v)`.
    pub fn planarize(&mut self, self_pos: Position) {
        self.planarized_excluded.clear();
        for (v_id, v_entry) in self.entries.iter() {
            let d_self_v = self_pos.distance(&v_entry.position);
            for (w_id, w_entry) in self.entries.iter() {
                if v_id == w_id {
                    continue;
                }
                let d_self_w = self_pos.distance(&w_entry.position);
                let d_v_w = v_entry.position.distance(&w_entry.position);
                if d_self_v > d_self_w.max(d_v_w) {
                    self.planarized_excluded.insert(*v_id);
                    break;
                }
            }
        }
    }
}

/// Counter-clockwise angle in degrees, normalized to `[0, 360)`, from
/// ray `center -> ref` to ray `center -> node` — i.e. the rotation
/// (ccw) that brings `ref`'s direction onto `node`'s direction.
/// Exposed directly for testing the right-hand-rule angle ordering.
pub fn angle(center: Position, reference: Position, node: Position) -> f64 {
    let ref_angle = (reference.y - center.y).atan2(reference.x - center.x);
    let node_angle = (node.y - center.y).atan2(node.x - center.x);
    let mut deg = (node_angle - ref_angle).to_degrees();
    deg %= 360.0;
    if deg < 0.0 {
        deg += 360.0;
    }
    deg
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn n(id: u32) -> NodeId {
        NodeId(id)
    }

    #[test]
    fn purge_evicts_expired_entries() {
        let mut t = PositionTable::new(Duration::from_secs(1));
        t.add_or_update(n(1), Position::new_2d(0.0, 0.0), Time(0.0));
        t.purge(Time(0.9));
        assert!(t.is_neighbor(n(1)));
        t.purge(Time(1.1));
        assert!(!t.is_neighbor(n(1)));
    }

    #[test]
    fn last_heard_of_zero_is_zero() {
        let t = PositionTable::new(Duration::from_secs(1));
        assert_eq!(t.last_heard(NodeId::ZERO), Time(0.0));
    }

    #[test]
    fn greedy_best_requires_strict_progress() {
        let mut t = PositionTable::new(Duration::from_secs(10));
        // S1-style chain: A=(0,0) with neighbor B=(50,0), dst D=(150,0)
        t.add_or_update(n(2), Position::new_2d(50.0, 0.0), Time(0.0));
        let next = t.greedy_best(Position::new_2d(150.0, 0.0), Position::new_2d(0.0, 0.0), Time(0.0));
        assert_eq!(next, n(2));
    }

    #[test]
    fn greedy_best_empty_table_is_zero() {
        let mut t = PositionTable::new(Duration::from_secs(10));
        let next = t.greedy_best(Position::new_2d(1.0, 0.0), Position::new_2d(0.0, 0.0), Time(0.0));
        assert_eq!(next, NodeId::ZERO);
    }

    #[test]
    fn greedy_best_returns_zero_when_neighbor_is_farther() {
        // S2: A=(0,0), only neighbor B=(0,50), dst D=(1000,0) — B is farther from D than A.
        let mut t = PositionTable::new(Duration::from_secs(10));
        t.add_or_update(n(2), Position::new_2d(0.0, 50.0), Time(0.0));
        let next = t.greedy_best(Position::new_2d(1000.0, 0.0), Position::new_2d(0.0, 0.0), Time(0.0));
        assert_eq!(next, NodeId::ZERO);
    }

    #[test]
    fn angle_of_self_is_zero_and_bounded() {
        let c = Position::new_2d(0.0, 0.0);
        let r = Position::new_2d(1.0, 0.0);
        assert_approx_eq!(angle(c, r, r), 0.0);
        for _ in 0..8 {
            let a = angle(c, r, Position::new_2d(-1.0, 0.3));
            assert!((0.0..360.0).contains(&a));
        }
    }

    #[test]
    fn angle_increases_with_ccw_rotation() {
        let c = Position::new_2d(0.0, 0.0);
        let r = Position::new_2d(1.0, 0.0);
        let n0 = Position::new_2d(1.0, 0.0);
        let n90 = Position::new_2d(0.0, 1.0);
        assert_approx_eq!(angle(c, r, n0), 0.0);
        assert_approx_eq!(angle(c, r, n90), 90.0);
    }

    #[test]
    fn planarize_excludes_neighbor_inside_gabriel_disk() {
        // self at origin, v far away along x, w sits inside the disk on (self, v)
        let mut t = PositionTable::new(Duration::from_secs(10));
        let self_pos = Position::new_2d(0.0, 0.0);
        t.add_or_update(n(1), Position::new_2d(10.0, 0.0), Time(0.0)); // v
        t.add_or_update(n(2), Position::new_2d(5.0, 0.1), Time(0.0)); // w, inside disk
        t.planarize(self_pos);
        let snapshot = t.neighbors_snapshot();
        let v_excluded = snapshot.iter().find(|(id, _, _)| *id == n(1)).unwrap().2;
        assert!(v_excluded);
    }

    #[test]
    fn electrostatic_steers_around_hole() {
        // dst=(0,6500), self=(0,0), hole at (0,3250), r = sqrt(2)*2000
        let dst = Position::new_2d(0.0, 6500.0);
        let self_pos = Position::new_2d(0.0, 0.0);
        let hole_center = Position::new_2d(0.0, 3250.0);
        let hole_radius = 2.0f64.sqrt() * 2000.0;

        let mut t = PositionTable::new(Duration::from_secs(10));
        t.add_or_update(n(1), Position::new_2d(0.0, 100.0), Time(0.0)); // N1, through the hole
        t.add_or_update(n(2), Position::new_2d(2000.0, 100.0), Time(0.0)); // N2, around the hole

        // greedy picks N1 (closer straight toward dst)
        let greedy_next = t.greedy_best(dst, self_pos, Time(0.0));
        assert_eq!(greedy_next, n(1));

        // electrostatic repulsion steers around the hole toward N2
        let repulsion_next =
            t.electrostatic_best(dst, self_pos, hole_center, hole_radius, Time(0.0));
        assert_eq!(repulsion_next, n(2));
    }

    #[test]
    fn perimeter_best_falls_back_to_first_entry_when_all_excluded_or_zero_angle() {
        let mut t = PositionTable::new(Duration::from_secs(10));
        let self_pos = Position::new_2d(0.0, 0.0);
        // single neighbor, colinear with prev hop -> angle is 0
        t.add_or_update(n(3), Position::new_2d(1.0, 0.0), Time(0.0));
        let prev_hop_pos = Position::new_2d(1.0, 0.0);
        let next = t.perimeter_best(prev_hop_pos, self_pos, Time(0.0));
        assert_eq!(next, n(3));
    }
}
