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

//! Protocol engine: Hello beaconing, inbound/outbound dispatch, mode
//! selection, queue drain, header injection — the node-level glue
//! around the clock, position table, forwarding, queue, and wire
//! modules.

use crate::clock::Clock;
use crate::error::ProtocolError;
use crate::forwarding::{decide_next_hop, PacketMode};
use crate::position_table::PositionTable;
use crate::queue::{DeferredEntry, DeferredQueue, DropReason};
use crate::types::{NodeId, Position, Time};
use crate::wire::{DataHeader, HelloPacket};
use log::{debug, trace, warn};
use std::time::Duration;

/// The closed configuration surface of a node.
#[derive(Debug, Clone, Copy)]
pub struct NodeConfig {
    /// Period between outgoing Hello beacons.
    pub hello_interval: Duration,
    /// How long a neighbor table entry survives without a refreshing
    /// Hello before it's purged.
    pub entry_lifetime: Duration,
    /// Maximum number of packets the deferred queue holds at once.
    pub max_queue_len: usize,
    /// How long a packet may sit in the deferred queue before it's
    /// dropped and reported `queue-timeout`.
    pub queue_timeout: Duration,
    /// Whether greedy dead ends fall through to perimeter-mode face
    /// traversal, or report `no-route`/park outright.
    pub perimeter_mode_enabled: bool,
    /// Whether greedy next-hop selection steers around `hole_center`
    /// using electrostatic repulsion instead of plain closest-to-dst.
    pub repulsion_mode_enabled: bool,
    /// Center of the communication hole repulsion steers around.
    /// Ignored unless `repulsion_mode_enabled`.
    pub hole_center: Position,
    /// Radius of the communication hole repulsion steers around.
    /// Ignored unless `repulsion_mode_enabled`.
    pub hole_radius: f64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let hello_interval = Duration::from_secs(1);
        NodeConfig {
            hello_interval,
            entry_lifetime: hello_interval.mul_f64(2.5),
            max_queue_len: 64,
            queue_timeout: Duration::from_secs(30),
            perimeter_mode_enabled: true,
            repulsion_mode_enabled: false,
            hole_center: Position::INVALID,
            hole_radius: 0.0,
        }
    }
}

/// Resolves a destination identifier to a position. A location-service
/// oracle; implemented by the host.
pub trait LocationService {
    /// Resolve `dst`'s current position, or `Position::INVALID` if unknown.
    fn lookup(&self, dst: NodeId) -> Position;
}

/// Reports this node's own position. A mobility-model query; called
/// at most once per forwarding decision.
pub trait Mobility {
    /// This node's current geographic position.
    fn self_position(&self) -> Position;
}

/// The host network-stack contract the protocol engine is driven
/// through.
pub trait HostStack {
    /// Unicast a stamped packet to a neighbor's link address.
    fn unicast(&mut self, next_hop: NodeId, header: DataHeader, payload: &[u8]);
    /// Deliver a packet terminating at this node to the upper layer.
    fn deliver(&mut self, header: DataHeader, payload: &[u8]);
    /// Report a dropped packet and why.
    fn on_error(&mut self, header: DataHeader, payload: &[u8], reason: ProtocolError);
    /// Broadcast a Hello beacon on every attached interface.
    fn broadcast_hello(&mut self, hello: HelloPacket);
}

/// A queued outbound packet's header, paired with the per-packet mode
/// state so a `checkQueue` retry resumes from the same GREEDY/PERIMETER
/// state the packet was parked in.
type QueuedHeader = (DataHeader, PacketMode);

/// Per-node protocol state, plus the position table and deferred
/// queue it owns.
pub struct Protocol<C, M> {
    id: NodeId,
    clock: C,
    mobility: M,
    config: NodeConfig,
    table: PositionTable,
    queue: DeferredQueue<Vec<u8>, QueuedHeader>,
    hello_seq_no: u32,
    sent_initial_hello: bool,
}

impl<C: Clock, M: Mobility> Protocol<C, M> {
    /// Bring up a node with identity `id` at `config`'s defaults.
    pub fn new(id: NodeId, clock: C, mobility: M, config: NodeConfig) -> Self {
        Protocol {
            id,
            clock,
            mobility,
            table: PositionTable::new(config.entry_lifetime),
            queue: DeferredQueue::new(config.max_queue_len),
            hello_seq_no: 0,
            sent_initial_hello: false,
            config,
        }
    }

    /// This node's identity.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Read-only access to the neighbor table, for diagnostics.
    pub fn neighbors(&self) -> &PositionTable {
        &self.table
    }

    /// Number of packets currently parked in the deferred queue.
    pub fn queue_len(&self) -> usize {
        self.queue.size()
    }

    fn now(&self) -> Time {
        self.clock.now()
    }

    /// Fire the Hello timer: bumps `helloSeqNo` and returns the beacon
    /// for the host to broadcast on every interface.
    pub fn on_hello_timer(&mut self) -> HelloPacket {
        self.hello_seq_no = self.hello_seq_no.wrapping_add(1);
        trace!("node {:?}: emitting hello seq {}", self.id, self.hello_seq_no);
        HelloPacket { origin_id: self.id, origin_pos: self.mobility.self_position(), seq_no: self.hello_seq_no }
    }

    /// A Hello beacon arrived. Populates the position table.
    pub fn on_hello_received(&mut self, hello: HelloPacket) {
        debug!("node {:?}: hello from {:?} (seq {})", self.id, hello.origin_id, hello.seq_no);
        self.table.add_or_update(hello.origin_id, hello.origin_pos, self.now());
    }

    /// Outbound path: on the first outbound packet, also emit a Hello
    /// immediately so forwarding can begin quickly; then stamp a header
    /// carrying `dst`'s looked-up position and hand the packet to the
    /// forwarding engine — transmitting on a non-ZERO next hop or
    /// parking it in the deferred queue otherwise.
    pub fn on_outbound(
        &mut self,
        payload: Vec<u8>,
        dst: NodeId,
        original_protocol: u8,
        location: &impl LocationService,
        host: &mut impl HostStack,
    ) {
        if !self.sent_initial_hello {
            self.sent_initial_hello = true;
            let hello = self.on_hello_timer();
            host.broadcast_hello(hello);
        }

        let dst_pos = location.lookup(dst);
        if !dst_pos.is_valid() {
            debug!("node {:?}: location-unknown for dst {:?}", self.id, dst);
            let header = DataHeader {
                dst_pos: Position::INVALID,
                perimeter_entry_distance: None,
                prev_hop: self.id,
                original_protocol,
            };
            host.on_error(header, &payload, ProtocolError::LocationUnknown);
            return;
        }

        let header = DataHeader {
            dst_pos,
            perimeter_entry_distance: None,
            prev_hop: self.id,
            original_protocol,
        };
        let mut mode = PacketMode::Greedy;
        self.dispatch(payload, header, &mut mode, dst, host);
    }

    /// Inbound path: deliver packets destined to self; otherwise
    /// re-run the forwarding engine for transit traffic, honoring the
    /// perimeter-exit check before re-dispatch.
    pub fn on_inbound(&mut self, payload: Vec<u8>, header: DataHeader, host: &mut impl HostStack) {
        if header.dst_pos == self.mobility.self_position() {
            host.deliver(header, &payload);
            return;
        }

        let mut mode = match header.perimeter_entry_distance {
            Some(entry_distance) => PacketMode::Perimeter {
                entry_distance,
                prev_hop_pos: self.table.position_of(header.prev_hop).unwrap_or_else(|| self.mobility.self_position()),
            },
            None => PacketMode::Greedy,
        };

        let mut header = header;
        header.prev_hop = self.id;
        self.dispatch_inbound(payload, header, &mut mode, host);
    }

    /// Dispatch an outbound-origin packet: transmit, park, or report
    /// `location-unknown`/forwarding failure through the error
    /// callback.
    fn dispatch(
        &mut self,
        payload: Vec<u8>,
        mut header: DataHeader,
        mode: &mut PacketMode,
        dst: NodeId,
        host: &mut impl HostStack,
    ) {
        let self_pos = self.mobility.self_position();
        let now = self.now();
        let next = decide_next_hop(mode, &mut self.table, &self.config, self_pos, header.dst_pos, now);
        Self::stamp_mode(&mut header, mode);

        if next.is_zero() {
            let deadline = now + self.config.queue_timeout;
            self.enqueue(payload, header, *mode, dst, deadline, host);
            return;
        }

        host.unicast(next, header, &payload);
    }

    /// Dispatch a transit packet: on failure, report `no-route` rather
    /// than queueing — only the originating node buffers undelivered
    /// packets.
    fn dispatch_inbound(&mut self, payload: Vec<u8>, mut header: DataHeader, mode: &mut PacketMode, host: &mut impl HostStack) {
        let self_pos = self.mobility.self_position();
        let now = self.now();
        let next = decide_next_hop(mode, &mut self.table, &self.config, self_pos, header.dst_pos, now);
        Self::stamp_mode(&mut header, mode);

        if next.is_zero() {
            warn!("node {:?}: no route for transit packet", self.id);
            host.on_error(header, &payload, ProtocolError::NoRoute);
            return;
        }

        host.unicast(next, header, &payload);
    }

    fn stamp_mode(header: &mut DataHeader, mode: &PacketMode) {
        match *mode {
            PacketMode::Greedy => header.perimeter_entry_distance = None,
            PacketMode::Perimeter { entry_distance, .. } => {
                header.perimeter_entry_distance = Some(entry_distance)
            }
        }
    }

    fn enqueue(
        &mut self,
        payload: Vec<u8>,
        header: DataHeader,
        mode: PacketMode,
        dst: NodeId,
        deadline: Time,
        host: &mut impl HostStack,
    ) {
        let now = self.now();
        let entry = DeferredEntry { packet: payload, header: (header, mode), destination: dst, deadline };
        self.queue
            .enqueue(entry, now, |e, reason| host.on_error(e.header.0, &e.packet, ProtocolError::Dropped(reason)))
            .unwrap_or_else(|_| trace!("node {:?}: dropping duplicate deferred packet", self.id));
    }

    /// MAC TX-error notification: the presumed-broken link to
    /// `neighbor` is removed from the position table, recovered
    /// locally; the caller is expected to resubmit the failed packet
    /// one more time via `on_outbound`/`on_inbound`.
    pub fn on_tx_error(&mut self, neighbor: NodeId) {
        debug!("node {:?}: tx error to {:?}, removing neighbor", self.id, neighbor);
        self.table.remove(neighbor);
    }

    /// Periodic `checkQueue` timer: retries every queued packet against
    /// the current table state, re-parking whatever still has no
    /// viable next hop.
    pub fn on_check_queue_timer(&mut self, host: &mut impl HostStack) {
        let now = self.now();
        let self_pos = self.mobility.self_position();
        let pending =
            self.queue.take_all(now, |e, reason| host.on_error(e.header.0, &e.packet, ProtocolError::Dropped(reason)));

        for entry in pending {
            let deadline = entry.deadline;
            let destination = entry.destination;
            let (mut header, mut mode) = entry.header;
            let next = decide_next_hop(&mut mode, &mut self.table, &self.config, self_pos, header.dst_pos, now);
            Self::stamp_mode(&mut header, &mode);
            if next.is_zero() {
                self.enqueue(entry.packet, header, mode, destination, deadline, host);
            } else {
                host.unicast(next, header, &entry.packet);
            }
        }
    }

    /// Interface-down: cancel timers (the host's responsibility),
    /// drain the deferred queue reporting `interface-down`, and clear
    /// the position table.
    pub fn on_interface_down(&mut self, host: &mut impl HostStack) {
        debug!("node {:?}: interface down", self.id);
        self.queue.drain_all(DropReason::InterfaceDown, |e, reason| {
            host.on_error(e.header.0, &e.packet, ProtocolError::Dropped(reason))
        });
        self.table.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimClock;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::rc::Rc;

    struct FixedMobility(Position);
    impl Mobility for FixedMobility {
        fn self_position(&self) -> Position {
            self.0
        }
    }

    struct OracleLocation(HashMap<NodeId, Position>);
    impl LocationService for OracleLocation {
        fn lookup(&self, dst: NodeId) -> Position {
            self.0.get(&dst).copied().unwrap_or(Position::INVALID)
        }
    }

    #[derive(Default)]
    struct RecordingHost {
        unicasts: RefCell<Vec<(NodeId, DataHeader)>>,
        errors: RefCell<Vec<ProtocolError>>,
        hellos: RefCell<Vec<HelloPacket>>,
    }
    impl HostStack for RecordingHost {
        fn unicast(&mut self, next_hop: NodeId, header: DataHeader, _payload: &[u8]) {
            self.unicasts.borrow_mut().push((next_hop, header));
        }
        fn deliver(&mut self, _header: DataHeader, _payload: &[u8]) {}
        fn on_error(&mut self, _header: DataHeader, _payload: &[u8], reason: ProtocolError) {
            self.errors.borrow_mut().push(reason);
        }
        fn broadcast_hello(&mut self, hello: HelloPacket) {
            self.hellos.borrow_mut().push(hello);
        }
    }

    fn node(id: u32, pos: Position) -> Protocol<SimClock, FixedMobility> {
        Protocol::new(NodeId(id), SimClock::new(), FixedMobility(pos), NodeConfig::default())
    }

    #[derive(Clone)]
    struct SharedClock(Rc<Cell<Time>>);
    impl Clock for SharedClock {
        fn now(&self) -> Time {
            self.0.get()
        }
    }

    #[test]
    fn outbound_greedy_success_transmits_to_neighbor() {
        let mut n = node(1, Position::new_2d(0.0, 0.0));
        n.on_hello_received(HelloPacket { origin_id: NodeId(2), origin_pos: Position::new_2d(50.0, 0.0), seq_no: 1 });
        let location = OracleLocation(maplit::hashmap! { NodeId(9) => Position::new_2d(150.0, 0.0) });
        let mut host = RecordingHost::default();
        n.on_outbound(vec![1, 2, 3], NodeId(9), 17, &location, &mut host);
        assert_eq!(host.unicasts.borrow().len(), 1);
        assert_eq!(host.unicasts.borrow()[0].0, NodeId(2));
        assert_eq!(n.queue_len(), 0);
    }

    #[test]
    fn outbound_with_no_neighbors_parks_in_queue() {
        let mut n = node(1, Position::new_2d(0.0, 0.0));
        let location = OracleLocation(maplit::hashmap! { NodeId(9) => Position::new_2d(150.0, 0.0) });
        let mut host = RecordingHost::default();
        n.on_outbound(vec![1], NodeId(9), 1, &location, &mut host);
        assert_eq!(n.queue_len(), 1);
        assert!(host.unicasts.borrow().is_empty());
    }

    #[test]
    fn outbound_unknown_location_reports_route_unavailable() {
        let mut n = node(1, Position::new_2d(0.0, 0.0));
        let location = OracleLocation(HashMap::new());
        let mut host = RecordingHost::default();
        n.on_outbound(vec![1], NodeId(42), 1, &location, &mut host);
        assert_eq!(host.errors.borrow().as_slice(), [ProtocolError::LocationUnknown]);
    }

    #[test]
    fn check_queue_timer_retransmits_once_a_neighbor_appears() {
        let mut n = node(1, Position::new_2d(0.0, 0.0));
        let location = OracleLocation(maplit::hashmap! { NodeId(9) => Position::new_2d(150.0, 0.0) });
        let mut host = RecordingHost::default();
        n.on_outbound(vec![1], NodeId(9), 1, &location, &mut host);
        assert_eq!(n.queue_len(), 1);

        n.on_hello_received(HelloPacket { origin_id: NodeId(2), origin_pos: Position::new_2d(50.0, 0.0), seq_no: 1 });
        n.on_check_queue_timer(&mut host);
        assert_eq!(n.queue_len(), 0);
        assert_eq!(host.unicasts.borrow().len(), 1);
    }

    #[test]
    fn check_queue_timer_preserves_original_deadline_across_retries() {
        let clock = Rc::new(Cell::new(Time::ZERO));
        let cfg = NodeConfig { queue_timeout: Duration::from_secs(2), ..NodeConfig::default() };
        let mut n = Protocol::new(NodeId(1), SharedClock(clock.clone()), FixedMobility(Position::new_2d(0.0, 0.0)), cfg);
        let location = OracleLocation(maplit::hashmap! { NodeId(9) => Position::new_2d(1000.0, 0.0) });
        let mut host = RecordingHost::default();
        n.on_outbound(vec![1], NodeId(9), 1, &location, &mut host);
        assert_eq!(n.queue_len(), 1);

        // Retry well inside the original 2s deadline: no viable next hop
        // (no neighbors known), so the packet is re-parked.
        clock.set(Time::ZERO + Duration::from_secs(1));
        n.on_check_queue_timer(&mut host);
        assert_eq!(n.queue_len(), 1);
        assert!(host.errors.borrow().is_empty());

        // Past the *original* deadline (t=2s), but before what a reset-on-retry
        // bug would compute (1s + 2s = 3s): must report queue-timeout here.
        clock.set(Time::ZERO + Duration::from_secs(2).mul_f64(1.25));
        n.on_check_queue_timer(&mut host);
        assert_eq!(n.queue_len(), 0);
        assert_eq!(host.errors.borrow().as_slice(), [ProtocolError::Dropped(DropReason::Timeout)]);
    }

    #[test]
    fn tx_error_removes_neighbor() {
        let mut n = node(1, Position::new_2d(0.0, 0.0));
        n.on_hello_received(HelloPacket { origin_id: NodeId(2), origin_pos: Position::new_2d(50.0, 0.0), seq_no: 1 });
        assert!(n.neighbors().is_neighbor(NodeId(2)));
        n.on_tx_error(NodeId(2));
        assert!(!n.neighbors().is_neighbor(NodeId(2)));
    }

    #[test]
    fn interface_down_drains_queue_and_clears_table() {
        let cfg = NodeConfig { perimeter_mode_enabled: false, ..NodeConfig::default() };
        let mut n = Protocol::new(NodeId(1), SimClock::new(), FixedMobility(Position::new_2d(0.0, 0.0)), cfg);
        n.on_hello_received(HelloPacket { origin_id: NodeId(2), origin_pos: Position::new_2d(0.0, 50.0), seq_no: 1 });
        let location = OracleLocation(maplit::hashmap! { NodeId(9) => Position::new_2d(1000.0, 0.0) });
        let mut host = RecordingHost::default();
        // Greedy fails (B=(0,50) is farther from dst than A) and perimeter is disabled: parks in the queue.
        n.on_outbound(vec![1], NodeId(9), 1, &location, &mut host);
        assert_eq!(n.queue_len(), 1);

        n.on_interface_down(&mut host);
        assert_eq!(n.queue_len(), 0);
        assert!(n.neighbors().is_empty());
        assert_eq!(host.errors.borrow().as_slice(), [ProtocolError::Dropped(DropReason::InterfaceDown)]);
    }

    #[test]
    fn inbound_delivers_when_destination_matches_self_position() {
        let mut n = node(5, Position::new_2d(10.0, 10.0));
        let header = DataHeader {
            dst_pos: Position::new_2d(10.0, 10.0),
            perimeter_entry_distance: None,
            prev_hop: NodeId(2),
            original_protocol: 1,
        };
        let mut host = RecordingHost::default();
        n.on_inbound(vec![1, 2], header, &mut host);
        assert!(host.unicasts.borrow().is_empty());
        assert!(host.errors.borrow().is_empty());
    }
}
