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

//! The simulator's `HostStack`/`LocationService`/`Mobility` wiring: a
//! god-oracle location service, fixed node positions, and a shared
//! virtual clock so every node's `Clock::now()` reads the same
//! simulated instant.

use georoute_core::clock::Clock;
use georoute_core::error::ProtocolError;
use georoute_core::protocol::{HostStack, LocationService, Mobility, NodeConfig, Protocol};
use georoute_core::types::{NodeId, Position, Time};
use georoute_core::wire::{DataHeader, HelloPacket};
use log::{trace, warn};
use std::cell::Cell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

#[derive(Clone)]
struct SharedClock(Rc<Cell<Time>>);

impl Clock for SharedClock {
    fn now(&self) -> Time {
        self.0.get()
    }
}

struct FixedPosition(Position);

impl Mobility for FixedPosition {
    fn self_position(&self) -> Position {
        self.0
    }
}

struct GodOracle<'a>(&'a BTreeMap<NodeId, Position>);

impl LocationService for GodOracle<'_> {
    fn lookup(&self, dst: NodeId) -> Position {
        self.0.get(&dst).copied().unwrap_or(Position::INVALID)
    }
}

enum HostEvent {
    Unicast { next_hop: NodeId, header: DataHeader, payload: Vec<u8> },
    Deliver { header: DataHeader },
    Error { header: DataHeader, reason: ProtocolError },
    BroadcastHello(HelloPacket),
}

#[derive(Default)]
struct RecordingHost {
    events: Vec<HostEvent>,
}

impl HostStack for RecordingHost {
    fn unicast(&mut self, next_hop: NodeId, header: DataHeader, payload: &[u8]) {
        self.events.push(HostEvent::Unicast { next_hop, header, payload: payload.to_vec() });
    }
    fn deliver(&mut self, header: DataHeader, _payload: &[u8]) {
        self.events.push(HostEvent::Deliver { header });
    }
    fn on_error(&mut self, header: DataHeader, _payload: &[u8], reason: ProtocolError) {
        self.events.push(HostEvent::Error { header, reason });
    }
    fn broadcast_hello(&mut self, hello: HelloPacket) {
        self.events.push(HostEvent::BroadcastHello(hello));
    }
}

/// Outcome of routing a single packet to completion, for scenario
/// assertions and CLI reporting.
#[derive(Debug, Default)]
pub struct SendOutcome {
    /// Node identities the packet actually passed through, in order.
    pub path: Vec<NodeId>,
    /// Whether the packet reached a node whose position matched the
    /// destination snapshot.
    pub delivered: bool,
    /// `Some(true)` if the last header observed carried the
    /// in-perimeter-mode marker; `None` if the packet never left the
    /// originating node (immediate `location-unknown`).
    pub final_mode: Option<bool>,
    /// Number of queue entries reported `queue-timeout` while
    /// processing this send (purged ahead of the new enqueue).
    pub timeouts_reported: usize,
}

type NodeProtocol = Protocol<SharedClock, FixedPosition>;

/// An in-process discrete-event network: one `Protocol` per node, a
/// shared virtual clock, and a god-oracle location service. Hello
/// broadcast and data unicast are delivered synchronously (zero
/// propagation delay) in dispatch order — a "post-and-return"
/// transmission model where the simulator itself plays the host
/// stack's role of completing each transmission immediately.
pub struct Simulator {
    nodes: BTreeMap<NodeId, NodeProtocol>,
    positions: BTreeMap<NodeId, Position>,
    clock: Rc<Cell<Time>>,
    radio_range: f64,
}

impl Simulator {
    pub fn new(positions: BTreeMap<NodeId, Position>, radio_range: f64, config: NodeConfig) -> Self {
        let clock = Rc::new(Cell::new(Time::ZERO));
        let nodes = positions
            .iter()
            .map(|(&id, &pos)| {
                let protocol = Protocol::new(id, SharedClock(clock.clone()), FixedPosition(pos), config);
                (id, protocol)
            })
            .collect();
        Simulator { nodes, positions, clock, radio_range }
    }

    pub fn position_of(&self, id: NodeId) -> Position {
        self.positions.get(&id).copied().unwrap_or(Position::INVALID)
    }

    pub fn queue_len(&self, id: NodeId) -> usize {
        self.nodes.get(&id).map(|n| n.queue_len()).unwrap_or(0)
    }

    pub fn advance(&mut self, by: Duration) {
        self.clock.set(self.clock.get() + by);
    }

    /// Every node fires its Hello timer once; beacons are delivered to
    /// every other node within `radio_range`.
    pub fn exchange_hellos(&mut self) {
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in ids {
            self.fire_hello(id);
        }
    }

    pub fn fire_hello(&mut self, id: NodeId) {
        let hello = match self.nodes.get_mut(&id) {
            Some(n) => n.on_hello_timer(),
            None => return,
        };
        self.deliver_hello(id, hello);
    }

    fn deliver_hello(&mut self, from: NodeId, hello: HelloPacket) {
        let from_pos = match self.positions.get(&from) {
            Some(&p) => p,
            None => return,
        };
        for (&id, &pos) in self.positions.iter() {
            if id != from && from_pos.distance(&pos) <= self.radio_range {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.on_hello_received(hello);
                }
            }
        }
    }

    /// Originate a packet toward `dst`'s current position, resolved
    /// through the god-oracle location service.
    pub fn send(&mut self, src: NodeId, dst: NodeId, payload: Vec<u8>) -> SendOutcome {
        let location = GodOracle(&self.positions);
        let mut host = RecordingHost::default();
        match self.nodes.get_mut(&src) {
            Some(node) => node.on_outbound(payload, dst, 0, &location, &mut host),
            None => return SendOutcome::default(),
        }
        self.drain(src, host)
    }

    /// Originate a packet toward a destination position directly,
    /// bypassing the location service — used by scenarios whose
    /// destination (e.g. S2/S3's out-of-range `D=(1000,0)`) is not a
    /// live node in the simulation.
    pub fn send_to_position(&mut self, src: NodeId, dst_pos: Position, payload: Vec<u8>) -> SendOutcome {
        let location = SinglePosition(dst_pos);
        let mut host = RecordingHost::default();
        match self.nodes.get_mut(&src) {
            Some(node) => node.on_outbound(payload, NodeId::ZERO, 0, &location, &mut host),
            None => return SendOutcome::default(),
        }
        self.drain(src, host)
    }

    /// `src`'s own forwarding decision for a packet toward `dst_pos`,
    /// without cascading the send through any further hops. Useful for
    /// inspecting a single node's choice in isolation — a multi-hop
    /// face traversal around a communication hole isn't guaranteed to
    /// terminate in a small test topology (see `MAX_HOPS`).
    pub fn first_hop(&mut self, src: NodeId, dst_pos: Position, payload: Vec<u8>) -> Option<(NodeId, DataHeader)> {
        let location = SinglePosition(dst_pos);
        let mut host = RecordingHost::default();
        self.nodes.get_mut(&src)?.on_outbound(payload, NodeId::ZERO, 0, &location, &mut host);
        host.events.into_iter().find_map(|e| match e {
            HostEvent::Unicast { next_hop, header, .. } => Some((next_hop, header)),
            _ => None,
        })
    }

    /// Forwarding is only guaranteed to terminate when some hop makes
    /// progress toward the destination; a perimeter face with no node
    /// closer than the entry point can circle forever (a known hazard
    /// of right-hand-rule routing, not modeled as a core-level error).
    /// The simulator enforces a hop bound as its own safety net, the
    /// way a TTL field would in a real network.
    const MAX_HOPS: usize = 64;

    fn drain(&mut self, from: NodeId, host: RecordingHost) -> SendOutcome {
        let mut pending: VecDeque<(NodeId, HostEvent)> =
            host.events.into_iter().map(|e| (from, e)).collect();
        let mut outcome = SendOutcome { path: vec![from], ..SendOutcome::default() };

        while let Some((producer, event)) = pending.pop_front() {
            if outcome.path.len() > Self::MAX_HOPS {
                warn!("node {:?}: dropping packet after exceeding {} simulated hops", producer, Self::MAX_HOPS);
                break;
            }
            match event {
                HostEvent::BroadcastHello(hello) => self.deliver_hello(producer, hello),
                HostEvent::Unicast { next_hop, header, payload } => {
                    outcome.path.push(next_hop);
                    outcome.final_mode = Some(header.in_perimeter_mode());
                    let mut next_host = RecordingHost::default();
                    if let Some(node) = self.nodes.get_mut(&next_hop) {
                        node.on_inbound(payload, header, &mut next_host);
                    } else {
                        warn!("unicast to unknown node {:?}", next_hop);
                    }
                    for e in next_host.events {
                        pending.push_back((next_hop, e));
                    }
                }
                HostEvent::Deliver { header } => {
                    outcome.delivered = true;
                    outcome.final_mode = Some(header.in_perimeter_mode());
                }
                HostEvent::Error { header, reason } => {
                    trace!("node {:?}: {}", producer, reason);
                    if reason == ProtocolError::Dropped(georoute_core::queue::DropReason::Timeout) {
                        outcome.timeouts_reported += 1;
                    }
                    outcome.final_mode = Some(header.in_perimeter_mode());
                }
            }
        }

        outcome
    }
}

/// Location service used by `send_to_position`: every destination
/// resolves to the single position supplied by the caller, regardless
/// of which `NodeId` the `Protocol` asks for (the sentinel `ZERO` used
/// when the scenario's destination isn't a live simulated node).
struct SinglePosition(Position);

impl LocationService for SinglePosition {
    fn lookup(&self, _dst: NodeId) -> Position {
        self.0
    }
}
