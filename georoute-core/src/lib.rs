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

#![deny(missing_docs)]

//! # Position-based ad-hoc routing
//!
//! Core of a position-based routing protocol for wireless multi-hop
//! networks. Each node knows its own geographic position and the
//! position of a packet's destination; forwarding decisions at each
//! hop are made locally from a table of one-hop neighbor positions,
//! with no end-to-end route setup.
//!
//! ## Structure
//!
//! - [`types`]: shared value types (`NodeId`, `Position`, `Time`).
//! - [`clock`]: the `Clock` trait nodes read time through.
//! - [`position_table`]: the neighbor position table, with time-based
//!   eviction and on-demand Gabriel-graph planarization
//!   ([`PositionTable`](position_table::PositionTable)).
//! - [`forwarding`]: the stateless next-hop dispatcher
//!   ([`decide_next_hop`](forwarding::decide_next_hop)) choosing
//!   between greedy, electrostatic-repulsion, and perimeter selection.
//! - [`queue`]: the bounded deferred-packet queue
//!   ([`DeferredQueue`](queue::DeferredQueue)).
//! - [`wire`]: Hello and data-header wire encoding
//!   ([`HelloPacket`](wire::HelloPacket), [`DataHeader`](wire::DataHeader)).
//! - [`protocol`]: the per-node engine tying the above together
//!   ([`Protocol`](protocol::Protocol)), plus the `HostStack`,
//!   `LocationService`, and `Mobility` capability traits a host
//!   implements.
//!
//! This crate carries no network-stack, mobility, or CLI code of its
//! own — see the `georoute-sim` binary for an in-process simulator
//! exercising it end to end.

pub mod clock;
pub mod error;
pub mod forwarding;
pub mod position_table;
pub mod protocol;
pub mod queue;
pub mod types;
pub mod wire;

pub use error::Error;
pub use protocol::{HostStack, LocationService, Mobility, NodeConfig, Protocol};
pub use types::{NodeId, Position, Time};
