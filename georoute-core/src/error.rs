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

//! Error types for the protocol core.
//!
//! Each component that can fail gets its own `thiserror` enum; the
//! top-level `Error` aggregates them with `#[from]`, mirroring the
//! way a network-simulation crate aggregates per-device errors into a
//! single top-level error.

use crate::queue::DropReason;
use crate::wire::WireError;
use thiserror::Error;

/// Errors surfaced by the deferred packet queue.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum QueueError {
    /// `enqueue` was called with an entry whose `(packet, dst, deadline)`
    /// matches one already in the queue.
    #[error("duplicate entry already queued")]
    Duplicate,
}

/// Errors surfaced through `HostStack::on_error`. Covers every drop
/// reason the host needs to know about except `malformed-packet`,
/// which is logged and discarded at decode time rather than handed to
/// the host.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ProtocolError {
    /// The forwarding engine returned `NodeId::ZERO` for an inbound
    /// (transit) packet: it cannot be queued, since only the
    /// originating node buffers undelivered packets.
    #[error("no route to forward transit packet")]
    NoRoute,
    /// The location service returned `Position::INVALID` for an
    /// outbound packet's destination.
    #[error("location service has no position for destination")]
    LocationUnknown,
    /// A queue entry was dropped; carries the reason for logging.
    #[error("packet dropped from queue: {0:?}")]
    Dropped(DropReason),
    /// A header failed to decode. Kept distinct from the other variants
    /// since malformed packets are logged and dropped silently, never
    /// surfaced through the host's error callback.
    #[error("malformed packet: {0}")]
    Malformed(#[from] WireError),
}

/// Aggregate error type for `georoute-core`.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// Propagated from the deferred queue.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    /// Propagated from the protocol engine.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
