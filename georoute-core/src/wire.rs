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

//! Wire format: Hello-packet and data-header encoding/decoding.
//!
//! Both headers are fixed-layout binary structures, not self-describing
//! documents, so this uses `byteorder`'s `Cursor`-based reader/writer
//! pair rather than `serde` — the same approach a TLV/packet codec in
//! the broader routing corpus takes.

use crate::types::{NodeId, Position};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use thiserror::Error;

const HELLO_TYPE: u8 = 1;
const DATA_TYPE: u8 = 2;

const MODE_FLAG_PERIMETER: u8 = 1 << 0;

/// Errors decoding a header off the wire. Never propagated to the
/// host's error callback — malformed packets are log-only.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum WireError {
    /// Buffer ended before a fixed-width field could be read.
    #[error("truncated packet")]
    Truncated,
    /// The leading `messageType` byte didn't match a known header.
    #[error("unrecognized message type {0}")]
    UnknownMessageType(u8),
}

impl From<std::io::Error> for WireError {
    fn from(_: std::io::Error) -> Self {
        WireError::Truncated
    }
}

/// A Hello beacon: a node's own id and position, plus a monotonic
/// sequence number hosts can use to detect lost or reordered beacons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HelloPacket {
    /// Identity of the node that sent this beacon.
    pub origin_id: NodeId,
    /// Position the origin reported itself at.
    pub origin_pos: Position,
    /// Monotonic per-origin sequence number.
    pub seq_no: u32,
}

impl HelloPacket {
    /// Serialize to the fixed-width wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 4 + 8 * 3 + 4);
        buf.push(HELLO_TYPE);
        buf.write_u32::<BigEndian>(self.origin_id.0).unwrap();
        buf.write_f64::<BigEndian>(self.origin_pos.x).unwrap();
        buf.write_f64::<BigEndian>(self.origin_pos.y).unwrap();
        buf.write_f64::<BigEndian>(self.origin_pos.z).unwrap();
        buf.write_u32::<BigEndian>(self.seq_no).unwrap();
        buf
    }

    /// Parse a beacon off the wire.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut cur = Cursor::new(buf);
        let message_type = cur.read_u8()?;
        if message_type != HELLO_TYPE {
            return Err(WireError::UnknownMessageType(message_type));
        }
        let origin_id = NodeId(cur.read_u32::<BigEndian>()?);
        let x = cur.read_f64::<BigEndian>()?;
        let y = cur.read_f64::<BigEndian>()?;
        let z = cur.read_f64::<BigEndian>()?;
        let seq_no = cur.read_u32::<BigEndian>()?;
        Ok(HelloPacket { origin_id, origin_pos: Position::new(x, y, z), seq_no })
    }
}

/// The protocol header stamped on a data packet at its first hop and
/// stripped at its destination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataHeader {
    /// Destination's position, resolved once at origination.
    pub dst_pos: Position,
    /// `Some(entry_distance)` iff the packet is in perimeter mode.
    pub perimeter_entry_distance: Option<f64>,
    /// Node that forwarded this packet to the current hop.
    pub prev_hop: NodeId,
    /// Upper-layer protocol number to restore on delivery.
    pub original_protocol: u8,
}

impl DataHeader {
    /// Serialize to the fixed-width wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 8 * 3 + 1 + 8 + 4 + 1);
        buf.push(DATA_TYPE);
        buf.write_f64::<BigEndian>(self.dst_pos.x).unwrap();
        buf.write_f64::<BigEndian>(self.dst_pos.y).unwrap();
        buf.write_f64::<BigEndian>(self.dst_pos.z).unwrap();
        let (mode_flags, entry_distance) = match self.perimeter_entry_distance {
            Some(d) => (MODE_FLAG_PERIMETER, d),
            None => (0u8, 0.0),
        };
        buf.push(mode_flags);
        buf.write_f64::<BigEndian>(entry_distance).unwrap();
        buf.write_u32::<BigEndian>(self.prev_hop.0).unwrap();
        buf.push(self.original_protocol);
        buf
    }

    /// Parse a data header off the wire.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut cur = Cursor::new(buf);
        let message_type = cur.read_u8()?;
        if message_type != DATA_TYPE {
            return Err(WireError::UnknownMessageType(message_type));
        }
        let x = cur.read_f64::<BigEndian>()?;
        let y = cur.read_f64::<BigEndian>()?;
        let z = cur.read_f64::<BigEndian>()?;
        let mode_flags = cur.read_u8()?;
        let entry_distance = cur.read_f64::<BigEndian>()?;
        let prev_hop = NodeId(cur.read_u32::<BigEndian>()?);
        let original_protocol = cur.read_u8()?;
        let perimeter_entry_distance =
            if mode_flags & MODE_FLAG_PERIMETER != 0 { Some(entry_distance) } else { None };
        Ok(DataHeader {
            dst_pos: Position::new(x, y, z),
            perimeter_entry_distance,
            prev_hop,
            original_protocol,
        })
    }

    /// `true` iff the header carries an in-flight perimeter-mode marker.
    pub fn in_perimeter_mode(&self) -> bool {
        self.perimeter_entry_distance.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_roundtrip() {
        let h = HelloPacket {
            origin_id: NodeId(42),
            origin_pos: Position::new(1.5, -2.25, 0.0),
            seq_no: 7,
        };
        let bytes = h.encode();
        assert_eq!(HelloPacket::decode(&bytes).unwrap(), h);
    }

    #[test]
    fn data_header_roundtrip_greedy() {
        let h = DataHeader {
            dst_pos: Position::new(150.0, 0.0, 0.0),
            perimeter_entry_distance: None,
            prev_hop: NodeId::ZERO,
            original_protocol: 17,
        };
        let bytes = h.encode();
        let decoded = DataHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, h);
        assert!(!decoded.in_perimeter_mode());
    }

    #[test]
    fn data_header_roundtrip_perimeter() {
        // The perimeter mode flag and entry distance round-trip bit-exactly.
        let h = DataHeader {
            dst_pos: Position::new(0.0, 1000.0, 0.0),
            perimeter_entry_distance: Some(1000.0),
            prev_hop: NodeId(1),
            original_protocol: 1,
        };
        let bytes = h.encode();
        let decoded = DataHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, h);
        assert!(decoded.in_perimeter_mode());
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let err = HelloPacket::decode(&[HELLO_TYPE, 0, 0]).unwrap_err();
        assert_eq!(err, WireError::Truncated);
    }

    #[test]
    fn decode_rejects_wrong_message_type() {
        let h = HelloPacket { origin_id: NodeId(1), origin_pos: Position::new_2d(0.0, 0.0), seq_no: 0 };
        let mut bytes = h.encode();
        bytes[0] = DATA_TYPE;
        let err = HelloPacket::decode(&bytes).unwrap_err();
        assert_eq!(err, WireError::UnknownMessageType(DATA_TYPE));
    }
}
