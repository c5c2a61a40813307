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

//! Core value types shared across the protocol: node identifiers, 3-D
//! positions, and simulated time.

use std::ops::{Add, Sub};
use std::time::Duration;

/// Opaque 32-bit node identifier.
///
/// `NodeId::ZERO` is the sentinel meaning "no such node" — forwarding
/// functions return it to signal "no viable next hop".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel for "no next hop" / "no such node".
    pub const ZERO: NodeId = NodeId(0);

    /// True iff this is the `ZERO` sentinel.
    pub fn is_zero(self) -> bool {
        self == NodeId::ZERO
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        NodeId(id)
    }
}

/// A 3-D Cartesian position in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// X coordinate, meters.
    pub x: f64,
    /// Y coordinate, meters.
    pub y: f64,
    /// Z coordinate, meters.
    pub z: f64,
}

impl Position {
    /// Distinguished value returned when a position lookup fails.
    pub const INVALID: Position = Position { x: f64::NAN, y: f64::NAN, z: f64::NAN };

    /// Build a position from its three components.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Position { x, y, z }
    }

    /// Build a 2-D position (z = 0), the common case for ground-plane
    /// deployments in the test scenarios.
    pub fn new_2d(x: f64, y: f64) -> Self {
        Position { x, y, z: 0.0 }
    }

    /// A position is valid unless it is (or derives from) `INVALID`.
    pub fn is_valid(&self) -> bool {
        !self.x.is_nan() && !self.y.is_nan() && !self.z.is_nan()
    }

    /// Euclidean distance between two positions, using all three
    /// components.
    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Simulated or wall-clock time, in seconds since some epoch chosen by
/// the host. `Time(0.0)` is returned by `PositionTable::last_heard`
/// for the `NodeId::ZERO` sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Time(pub f64);

impl Time {
    /// The zero instant.
    pub const ZERO: Time = Time(0.0);
}

impl Add<Duration> for Time {
    type Output = Time;
    fn add(self, rhs: Duration) -> Time {
        Time(self.0 + rhs.as_secs_f64())
    }
}

impl Sub for Time {
    type Output = Duration;
    fn sub(self, rhs: Time) -> Duration {
        Duration::from_secs_f64((self.0 - rhs.0).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_uses_all_three_axes() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 4.0, 0.0);
        assert_eq!(a.distance(&b), 5.0);
        let c = Position::new(0.0, 0.0, 5.0);
        assert_eq!(a.distance(&c), 5.0);
    }

    #[test]
    fn invalid_position_is_not_valid() {
        assert!(!Position::INVALID.is_valid());
        assert!(Position::new(0.0, 0.0, 0.0).is_valid());
    }

    #[test]
    fn node_id_zero_sentinel() {
        assert!(NodeId::ZERO.is_zero());
        assert!(!NodeId::from(1).is_zero());
    }
}
