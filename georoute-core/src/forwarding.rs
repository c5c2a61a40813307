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

//! Forwarding engine: the pure dispatcher choosing between greedy,
//! electrostatic-repulsion, and perimeter next-hop selection per
//! packet.

use crate::position_table::PositionTable;
use crate::protocol::NodeConfig;
use crate::types::{NodeId, Position, Time};

/// Per-packet forwarding state machine — distinct from the node-wide
/// `repulsionMode` setting, which replaces greedy's algorithm rather
/// than adding a state of its own. `prev_hop_pos` is carried as a
/// position rather than a `NodeId` because the previous hop is not
/// necessarily this node's neighbor in the table it was received from
/// (callers resolve the wire header's entry position before calling
/// in).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PacketMode {
    /// Forwarding toward whichever known neighbor is closest to the
    /// destination, as long as that is strictly closer than self.
    Greedy,
    /// Right-hand-rule face traversal around a greedy dead end.
    Perimeter {
        /// Distance from the entry point to the destination, recorded
        /// so a later hop can detect renewed greedy progress and exit
        /// perimeter mode.
        entry_distance: f64,
        /// Position of the node the packet entered perimeter mode at,
        /// used to planarize the local face.
        prev_hop_pos: Position,
    },
}

/// Run the next-hop dispatch, mutating `mode` in place for
/// perimeter-entry bookkeeping. Stateless across calls beyond what's
/// carried in `mode` and the table.
pub fn decide_next_hop(
    mode: &mut PacketMode,
    table: &mut PositionTable,
    node_cfg: &NodeConfig,
    self_pos: Position,
    dst_pos: Position,
    now: Time,
) -> NodeId {
    if let PacketMode::Perimeter { entry_distance, prev_hop_pos } = *mode {
        if node_cfg.perimeter_mode_enabled {
            let dist_to_dst = self_pos.distance(&dst_pos);
            if dist_to_dst >= entry_distance {
                return table.perimeter_best(prev_hop_pos, self_pos, now);
            }
            *mode = PacketMode::Greedy;
        } else {
            *mode = PacketMode::Greedy;
        }
    }

    let greedy_step_taken;
    let next = if node_cfg.repulsion_mode_enabled {
        greedy_step_taken = false;
        table.electrostatic_best(dst_pos, self_pos, node_cfg.hole_center, node_cfg.hole_radius, now)
    } else {
        greedy_step_taken = true;
        table.greedy_best(dst_pos, self_pos, now)
    };

    if !next.is_zero() {
        return next;
    }

    if greedy_step_taken && node_cfg.perimeter_mode_enabled {
        let entry_distance = self_pos.distance(&dst_pos);
        *mode = PacketMode::Perimeter { entry_distance, prev_hop_pos: self_pos };
        return table.perimeter_best(self_pos, self_pos, now);
    }

    NodeId::ZERO
}
