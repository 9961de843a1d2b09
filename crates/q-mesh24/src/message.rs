// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Mesh frame type and fixed-layout wire codec
//!
//! Every frame on the air shares one shape: a five byte header, up to
//! [`MAX_PAYLOAD`] payload bytes, and a two byte link-layer trailer the
//! connectivity layer uses for pipe negotiation.
//!
//! Wire layout of an encoded frame of length `L = 7 + payload_len`:
//!
//! ```text
//! [0]            opcode
//! [1]            message id (0 = not yet assigned)
//! [2]            sender node id
//! [3]            receiver node id (0 = broadcast)
//! [4]            payload length
//! [5..L-2]       payload
//! [L-2..L]       link data
//! ```

use heapless::Vec;
use q_common::{Error, Result};

/// 8-bit mesh node identifier. `0` is reserved and never addresses a node.
pub type NodeId = u8;

/// Broadcast / unspecified node id
pub const BROADCAST: NodeId = 0;

/// Check whether an id means "every node"
#[must_use]
pub const fn is_broadcast(id: NodeId) -> bool {
    id == BROADCAST
}

/// Maximum payload bytes carried by one frame
pub const MAX_PAYLOAD: usize = 25;

/// Header plus trailer bytes of an encoded frame
pub const FRAME_OVERHEAD: usize = 7;

/// Largest possible encoded frame
pub const MAX_FRAME: usize = MAX_PAYLOAD + FRAME_OVERHEAD;

/// Frame opcodes
///
/// Bit `0x10` marks the routing family, bit `0x20` the application family.
/// The discovery opcodes live below both bits.
pub mod opcode {
    /// Keepalive; carried no payload, unicast to every accepted neighbour
    pub const NO_OPERATION: u8 = 0x00;
    /// Discovery advertisement (broadcast); `link_data[0]` carries the
    /// sender's listen discriminator
    pub const PRESENT: u8 = 0x01;
    /// Reply to a PRESENT (unicast); `link_data[0]` carries the pipe
    /// discriminator the new link will use
    pub const RESPOND: u8 = 0x02;
    /// Finalizes a link (unicast)
    pub const ACCEPT: u8 = 0x03;
    /// Rejects a RESPOND; the recipient must drop the link
    pub const DENY: u8 = 0x04;
    /// Link-state graph request, carries the sender's neighbour row
    pub const LS_UPDATE_REQUEST: u8 = 0x10;
    /// Link-state graph announcement
    pub const LS_UPDATE: u8 = 0x11;
    /// Application payload, surfaced to the caller
    pub const APP_DATA: u8 = 0x20;

    /// Mask selecting the routing message family
    pub const ROUTING_MASK: u8 = 0x10;
    /// Mask selecting the application message family
    pub const APPLICATION_MASK: u8 = 0x20;
}

/// A single mesh frame
///
/// Messages are plain value aggregates; copies are cheap and nothing
/// aliases. `message_id` is assigned by the sending node's connectivity
/// layer the first time the frame enters the reliable send path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    /// Frame opcode, see [`opcode`]
    pub kind: u8,
    /// Sender-assigned sequence id; `0` means unassigned
    pub message_id: u8,
    /// Originating node
    pub sender: NodeId,
    /// Final receiver; [`BROADCAST`] addresses every node
    pub receiver: NodeId,
    /// Number of significant bytes in `payload`
    pub payload_len: u8,
    /// Payload bytes; only the first `payload_len` are significant
    pub payload: [u8; MAX_PAYLOAD],
    /// Link-layer side channel, filled by the connectivity layer
    pub link_data: [u8; 2],
}

impl Message {
    /// Create an empty frame with no payload
    #[must_use]
    pub const fn new(kind: u8, sender: NodeId, receiver: NodeId) -> Self {
        Self {
            kind,
            message_id: 0,
            sender,
            receiver,
            payload_len: 0,
            payload: [0; MAX_PAYLOAD],
            link_data: [0; 2],
        }
    }

    /// Create a frame carrying `payload`
    ///
    /// Fails when the payload does not fit in a single frame.
    pub fn with_payload(kind: u8, sender: NodeId, receiver: NodeId, payload: &[u8]) -> Result<Self> {
        let mut msg = Self::new(kind, sender, receiver);
        msg.set_payload(payload)?;
        Ok(msg)
    }

    /// Replace the payload
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge);
        }
        self.payload = [0; MAX_PAYLOAD];
        self.payload[..payload.len()].copy_from_slice(payload);
        self.payload_len = payload.len() as u8;
        Ok(())
    }

    /// The significant payload bytes
    #[must_use]
    pub fn payload_bytes(&self) -> &[u8] {
        &self.payload[..usize::from(self.payload_len)]
    }

    /// Encoded size of this frame in bytes
    #[must_use]
    pub const fn wire_len(&self) -> usize {
        self.payload_len as usize + FRAME_OVERHEAD
    }

    /// Encode into wire format
    #[must_use]
    pub fn encode(&self) -> Vec<u8, MAX_FRAME> {
        let mut out = Vec::new();
        let len = usize::from(self.payload_len).min(MAX_PAYLOAD);
        let _ = out.push(self.kind);
        let _ = out.push(self.message_id);
        let _ = out.push(self.sender);
        let _ = out.push(self.receiver);
        let _ = out.push(len as u8);
        let _ = out.extend_from_slice(&self.payload[..len]);
        let _ = out.extend_from_slice(&self.link_data);
        out
    }

    /// Decode a received frame
    ///
    /// Fails only when fewer than [`FRAME_OVERHEAD`] bytes arrive. The two
    /// trailing bytes are always taken as link data; any residual bytes
    /// between the declared payload and the trailer are discarded.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < FRAME_OVERHEAD {
            return None;
        }
        let body = bytes.len() - FRAME_OVERHEAD;
        let mut msg = Self::new(bytes[0], bytes[2], bytes[3]);
        msg.message_id = bytes[1];
        msg.payload_len = bytes[4].min(MAX_PAYLOAD as u8);
        let take = body.min(MAX_PAYLOAD);
        msg.payload[..take].copy_from_slice(&bytes[5..5 + take]);
        msg.link_data[0] = bytes[bytes.len() - 2];
        msg.link_data[1] = bytes[bytes.len() - 1];
        Some(msg)
    }
}
