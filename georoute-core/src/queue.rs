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

//! Deferred packet queue: a bounded FIFO of packets awaiting a usable
//! next hop, with per-entry TTL.

use crate::error::QueueError;
use crate::types::{NodeId, Time};
use std::collections::VecDeque;

/// Why a queued packet was dropped, reported through the packet's
/// error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The entry's deadline elapsed before a next hop appeared.
    Timeout,
    /// The queue was full; this entry was the oldest and got evicted
    /// to make room for a new one.
    Overflow,
    /// `drop_by_dst` was called for this entry's destination.
    RouteUnavailable,
    /// The interface went down while the entry was still queued.
    InterfaceDown,
}

/// A parked packet. `payload` and `header` are opaque to the queue —
/// it only needs to compare them for the dedup key and invoke the
/// callbacks on eviction.
#[derive(Debug, Clone)]
pub struct DeferredEntry<P, H> {
    /// The packet payload, as given by the host stack.
    pub packet: P,
    /// The stamped protocol header accompanying the packet.
    pub header: H,
    /// Destination node this packet is routed toward.
    pub destination: NodeId,
    /// Absolute time at which this entry expires.
    pub deadline: Time,
}

impl<P: PartialEq, H> DeferredEntry<P, H> {
    fn same_identity(&self, other: &Self) -> bool {
        self.packet == other.packet
            && self.destination == other.destination
            && self.deadline == other.deadline
    }
}

/// Bounded FIFO of packets parked because forwarding returned
/// `NodeId::ZERO` (no viable next hop yet). The per-entry TTL is
/// carried on each `DeferredEntry` as an absolute `deadline`, computed
/// by the caller (typically `now + queue_timeout`) — the queue itself
/// only compares deadlines against the current time.
pub struct DeferredQueue<P, H> {
    entries: VecDeque<DeferredEntry<P, H>>,
    max_len: usize,
}

impl<P: PartialEq + Clone, H> DeferredQueue<P, H> {
    /// Build an empty queue bounded at `max_len` entries.
    pub fn new(max_len: usize) -> Self {
        DeferredQueue { entries: VecDeque::new(), max_len }
    }

    /// Number of parked entries.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// True iff any entry targets `dst`.
    pub fn find(&self, dst: NodeId) -> bool {
        self.entries.iter().any(|e| e.destination == dst)
    }

    /// Enqueue `entry`, purging expired entries first. Rejects exact
    /// duplicates. If the queue is full, evicts the oldest entry
    /// (reporting it via `on_drop` with `DropReason::Overflow`) to make
    /// room.
    pub fn enqueue(
        &mut self,
        entry: DeferredEntry<P, H>,
        now: Time,
        mut on_drop: impl FnMut(DeferredEntry<P, H>, DropReason),
    ) -> Result<(), QueueError> {
        self.purge(now, &mut on_drop);

        if self.entries.iter().any(|e| e.same_identity(&entry)) {
            return Err(QueueError::Duplicate);
        }

        if self.entries.len() == self.max_len {
            if let Some(evicted) = self.entries.pop_front() {
                on_drop(evicted, DropReason::Overflow);
            }
        }

        self.entries.push_back(entry);
        Ok(())
    }

    /// Remove and return every entry, purging expired ones first
    /// (reported as `Timeout`). Unlike `drain_all`, the entries handed
    /// back are not themselves reported as dropped — used by the
    /// `checkQueue` retry loop, which re-submits each one to
    /// forwarding rather than discarding it.
    pub fn take_all(
        &mut self,
        now: Time,
        mut on_drop: impl FnMut(DeferredEntry<P, H>, DropReason),
    ) -> Vec<DeferredEntry<P, H>> {
        self.purge(now, &mut on_drop);
        self.entries.drain(..).collect()
    }

    /// Remove and return the earliest entry targeting `dst`, if any,
    /// purging expired entries first.
    pub fn dequeue(
        &mut self,
        dst: NodeId,
        now: Time,
        mut on_drop: impl FnMut(DeferredEntry<P, H>, DropReason),
    ) -> Option<DeferredEntry<P, H>> {
        self.purge(now, &mut on_drop);
        let idx = self.entries.iter().position(|e| e.destination == dst)?;
        self.entries.remove(idx)
    }

    /// Remove every entry targeting `dst`, reporting each through
    /// `on_drop` with `DropReason::RouteUnavailable`.
    pub fn drop_by_dst(&mut self, dst: NodeId, mut on_drop: impl FnMut(DeferredEntry<P, H>, DropReason)) {
        let (remove, keep): (VecDeque<_>, VecDeque<_>) =
            self.entries.drain(..).partition(|e| e.destination == dst);
        self.entries = keep;
        for e in remove {
            on_drop(e, DropReason::RouteUnavailable);
        }
    }

    /// Drain every entry, reporting each via `on_drop` with the given
    /// reason. Used when an interface goes down.
    pub fn drain_all(&mut self, reason: DropReason, mut on_drop: impl FnMut(DeferredEntry<P, H>, DropReason)) {
        while let Some(e) = self.entries.pop_front() {
            on_drop(e, reason);
        }
    }

    fn purge(&mut self, now: Time, on_drop: &mut impl FnMut(DeferredEntry<P, H>, DropReason)) {
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].deadline <= now {
                let expired = self.entries.remove(i).unwrap();
                on_drop(expired, DropReason::Timeout);
            } else {
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dst: u32, deadline: f64) -> DeferredEntry<u32, u8> {
        DeferredEntry { packet: dst, header: 0, destination: NodeId(dst), deadline: Time(deadline) }
    }

    #[test]
    fn size_never_exceeds_max_len() {
        let mut q: DeferredQueue<u32, u8> = DeferredQueue::new(2);
        let mut dropped = Vec::new();
        q.enqueue(entry(1, 10.0), Time(0.0), |e, r| dropped.push((e.packet, r))).unwrap();
        q.enqueue(entry(2, 10.0), Time(0.0), |e, r| dropped.push((e.packet, r))).unwrap();
        q.enqueue(entry(3, 10.0), Time(0.0), |e, r| dropped.push((e.packet, r))).unwrap();
        assert_eq!(q.size(), 2);
        assert_eq!(dropped, vec![(1, DropReason::Overflow)]);
    }

    #[test]
    fn duplicate_enqueue_is_rejected() {
        let mut q: DeferredQueue<u32, u8> = DeferredQueue::new(4);
        q.enqueue(entry(1, 10.0), Time(0.0), |_, _| {}).unwrap();
        let err = q.enqueue(entry(1, 10.0), Time(0.0), |_, _| {});
        assert_eq!(err, Err(QueueError::Duplicate));
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn purge_reports_timeout_for_expired_entries() {
        // S5: maxLen=4, queueTimeout=2s. Enqueue 4 at t=0, a 5th at t=2.5 purges all 4 first.
        let mut q: DeferredQueue<u32, u8> = DeferredQueue::new(4);
        for i in 1..=4 {
            q.enqueue(entry(i, 2.0), Time(0.0), |_, _| {}).unwrap();
        }
        assert_eq!(q.size(), 4);
        let mut dropped = Vec::new();
        q.enqueue(entry(5, 4.5), Time(2.5), |e, r| dropped.push((e.packet, r))).unwrap();
        assert_eq!(dropped.len(), 4);
        assert!(dropped.iter().all(|(_, r)| *r == DropReason::Timeout));
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn drop_by_dst_reports_route_unavailable() {
        let mut q: DeferredQueue<u32, u8> = DeferredQueue::new(4);
        q.enqueue(entry(1, 10.0), Time(0.0), |_, _| {}).unwrap();
        q.enqueue(entry(2, 10.0), Time(0.0), |_, _| {}).unwrap();
        let mut dropped = Vec::new();
        q.drop_by_dst(NodeId(1), |e, r| dropped.push((e.packet, r)));
        assert_eq!(dropped, vec![(1, DropReason::RouteUnavailable)]);
        assert_eq!(q.size(), 1);
    }
}
