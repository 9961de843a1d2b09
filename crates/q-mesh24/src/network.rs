// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Mesh orchestration
//!
//! [`MeshNetwork`] wires a [`Connectivity`] implementation to a [`Router`]
//! and drives the protocol from two entry points the outer loop calls:
//!
//! - [`MeshNetwork::tick`]: periodic work - a discovery broadcast at the
//!   half-way point of every keepalive round, keepalive unicasts at the end
//! - [`MeshNetwork::poll`]: drain buffered frames, deduplicate, then
//!   consume, answer, forward, or surface each one
//!
//! Everything runs synchronously inside these calls; discovery replies go
//! out before the next frame is pulled, so a handshake can complete within
//! one poll.

use heapless::Vec;
use q_common::{log_info, log_warn, Error, LogBuffer, MeshConfig, Result};

use crate::connectivity::Connectivity;
use crate::message::{opcode, Message, NodeId, BROADCAST};
use crate::pipe::{LinkState, PIPE_COUNT};
use crate::router::Router;

/// Maximum nodes on the direct-connection blacklist
pub const BLACKLIST_CAP: usize = 10;

const LOG_ORIGIN: &str = "mesh";

/// One mesh node: connectivity, routing, and the glue between them
pub struct MeshNetwork<C: Connectivity, R: Router> {
    conn: C,
    router: R,
    blacklist: Vec<NodeId, BLACKLIST_CAP>,
    update_count: u32,
    keepalive_interval: u32,
    log: LogBuffer,
}

impl<C: Connectivity, R: Router> MeshNetwork<C, R> {
    /// Build a node from its connectivity layer and router
    pub fn new(conn: C, router: R, config: &MeshConfig) -> Self {
        let mut log = LogBuffer::new();
        log.set_min_level(config.log_level);
        Self {
            conn,
            router,
            blacklist: Vec::new(),
            update_count: 0,
            keepalive_interval: config.keepalive_interval,
            log,
        }
    }

    /// Add nodes to the direct-connection blacklist
    ///
    /// Blacklisted nodes never get a direct link and their locally
    /// addressed frames are swallowed; traffic they route *through* this
    /// node is unaffected. Useful to thin out dense deployments where
    /// every node can hear every other.
    pub fn add_blacklist(&mut self, nodes: &[NodeId]) -> Result<()> {
        for node in nodes {
            self.blacklist.push(*node).map_err(|_| Error::BlacklistFull)?;
        }
        Ok(())
    }

    fn is_blacklisted(&self, id: NodeId) -> bool {
        self.blacklist.contains(&id)
    }

    /// Broadcast a discovery advertisement
    ///
    /// [`MeshNetwork::tick`] calls this periodically; it only needs to be
    /// called directly to speed up joining a fresh network.
    pub fn discover(&mut self) {
        let mut msg = Message::new(opcode::PRESENT, self.conn.node_id(), BROADCAST);
        let _ = self.conn.send(&mut msg, BROADCAST);
    }

    /// Advance periodic work by one tick of the outer loop
    pub fn tick(&mut self) {
        self.update_count += 1;
        if self.update_count > self.keepalive_interval {
            self.update_count = 0;
            let mut keepalive = Message::new(opcode::NO_OPERATION, self.conn.node_id(), BROADCAST);
            self.unicast_all_close_if_fail(&mut keepalive);
        }
        if self.update_count == self.keepalive_interval / 2 {
            self.discover();
        }
    }

    /// Drain and dispatch buffered inbound frames
    ///
    /// Frames addressed to this node (or broadcast) are handled; whatever
    /// handling does not consume is appended to `uncaught` for the
    /// application. Frames for other nodes are forwarded. Returns the
    /// number of messages appended to `uncaught`.
    pub fn poll<const N: usize>(&mut self, uncaught: &mut Vec<Message, N>) -> usize {
        let mut count = 0;
        while self.conn.has_message() {
            let Some(msg) = self.conn.next_message() else {
                break;
            };
            if !self.conn.is_new_message(&msg) {
                continue;
            }
            if msg.receiver == self.conn.node_id() || msg.receiver == BROADCAST {
                if !self.handle(&msg) && uncaught.push(msg).is_ok() {
                    count += 1;
                }
            } else {
                self.forward(msg);
            }
        }
        count
    }

    /// Relay a transit frame towards its receiver
    fn forward(&mut self, mut msg: Message) {
        let next_hop = if self.conn.link_state(msg.receiver) == LinkState::Accepted {
            BROADCAST
        } else {
            self.router.next_hop(msg.receiver)
        };
        if self.conn.send(&mut msg, next_hop).is_err() {
            log_warn!(
                self.log,
                self.update_count,
                LOG_ORIGIN,
                "forward to {:#04x} failed",
                msg.receiver
            );
            self.router.update_neighbors(&mut self.conn);
        }
    }

    /// Handle one frame addressed to this node (or broadcast)
    ///
    /// Returns whether the frame was consumed. Routing frames feed the
    /// router first and application frames surface to the caller, unless
    /// the sender is blacklisted, in which case the frame is swallowed.
    fn handle(&mut self, msg: &Message) -> bool {
        if msg.kind & opcode::ROUTING_MASK != 0 {
            self.router.on_routing(&mut self.conn, msg);
        }
        if self.is_blacklisted(msg.sender) {
            return true;
        }
        if msg.kind & opcode::APPLICATION_MASK != 0 {
            return false;
        }

        match msg.kind {
            opcode::PRESENT => {
                if self.conn.link_state(msg.sender) == LinkState::Disconnected
                    && self.conn.process_present(msg)
                {
                    let mut respond =
                        Message::new(opcode::RESPOND, self.conn.node_id(), msg.sender);
                    self.unicast_close_if_fail(&mut respond, BROADCAST);
                }
                true
            }
            opcode::RESPOND => {
                if self.conn.process_respond(msg) {
                    let mut accept = Message::new(opcode::ACCEPT, self.conn.node_id(), msg.sender);
                    if self.conn.send(&mut accept, BROADCAST).is_ok() {
                        log_info!(
                            self.log,
                            self.update_count,
                            LOG_ORIGIN,
                            "link to {:#04x} accepted",
                            msg.sender
                        );
                        self.router.update_neighbors(&mut self.conn);
                    }
                } else {
                    let mut deny = Message::new(opcode::DENY, self.conn.node_id(), msg.sender);
                    let _ = self.conn.send(&mut deny, BROADCAST);
                }
                true
            }
            opcode::ACCEPT => {
                self.conn.process_accept(msg);
                log_info!(
                    self.log,
                    self.update_count,
                    LOG_ORIGIN,
                    "link to {:#04x} accepted",
                    msg.sender
                );
                self.router.initial_update(&mut self.conn);
                true
            }
            opcode::DENY => {
                if msg.receiver == self.conn.node_id() {
                    self.conn.disconnect(msg.sender);
                    log_warn!(
                        self.log,
                        self.update_count,
                        LOG_ORIGIN,
                        "link to {:#04x} denied",
                        msg.sender
                    );
                }
                true
            }
            opcode::NO_OPERATION => true,
            _ => false,
        }
    }

    /// Send an application frame towards its receiver
    ///
    /// Stamps the local node as sender, then uses the direct link when one
    /// is accepted and the router otherwise.
    pub fn send_message(&mut self, msg: &mut Message) -> Result<()> {
        msg.sender = self.conn.node_id();
        if self.conn.link_state(msg.receiver) == LinkState::Accepted {
            return self.conn.send(msg, BROADCAST);
        }
        let hop = self.router.next_hop(msg.receiver);
        if hop == BROADCAST {
            return Err(Error::NoRoute);
        }
        self.conn.send(msg, hop)
    }

    /// Unicast, dropping the link on failure
    ///
    /// After the drop, an update flood tells the rest of the mesh the
    /// topology changed.
    pub fn unicast_close_if_fail(&mut self, msg: &mut Message, next_hop: NodeId) {
        if self.conn.send(msg, next_hop).is_err() {
            let peer = if next_hop != BROADCAST {
                next_hop
            } else {
                msg.receiver
            };
            self.conn.disconnect(peer);
            log_warn!(
                self.log,
                self.update_count,
                LOG_ORIGIN,
                "link to {:#04x} dropped",
                peer
            );
            self.router.send_update(&mut self.conn);
        }
    }

    /// Unicast to every accepted neighbour, dropping each link that fails
    ///
    /// This is the keepalive mechanism: a peer that stops acknowledging
    /// its copy is disconnected, and one update flood follows.
    pub fn unicast_all_close_if_fail(&mut self, msg: &mut Message) {
        let mut failed: Vec<NodeId, PIPE_COUNT> = Vec::new();
        if self.conn.send_all(msg, &mut failed).is_err() {
            for peer in &failed {
                log_warn!(
                    self.log,
                    self.update_count,
                    LOG_ORIGIN,
                    "keepalive to {:#04x} lost, dropping link",
                    peer
                );
                self.conn.disconnect(*peer);
            }
            self.router.send_update(&mut self.conn);
        }
    }

    /// The connectivity layer, for status displays
    pub fn connectivity(&self) -> &C {
        &self.conn
    }

    /// Mutable access to the connectivity layer
    pub fn connectivity_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// The router, for status displays
    pub fn router(&self) -> &R {
        &self.router
    }

    /// Mutable access to the router
    ///
    /// Next-hop queries need this: they may trigger a shortest-path
    /// recomputation.
    pub fn router_mut(&mut self) -> &mut R {
        &mut self.router
    }

    /// The node's log ring
    pub fn logs(&self) -> &LogBuffer {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::RadioConnectivity;
    use crate::radio::sim::{SimMedium, SimRadio};
    use crate::radio::NoDelay;
    use crate::router::DirectRouter;
    use q_common::LogLevel;

    type Node = MeshNetwork<RadioConnectivity<SimRadio, NoDelay>, DirectRouter>;

    fn node(medium: &SimMedium, id: NodeId, interval: u32) -> (Node, SimRadio) {
        let radio = medium.radio();
        let handle = radio.clone();
        let conn = RadioConnectivity::new(id, radio, NoDelay);
        let config = MeshConfig::new()
            .with_keepalive_interval(interval)
            .with_log_level(LogLevel::Debug);
        (MeshNetwork::new(conn, DirectRouter, &config), handle)
    }

    fn inject(handle: &SimRadio, msg: &Message) {
        handle.inject(&msg.encode());
    }

    #[test]
    fn app_frames_surface_to_the_caller() {
        let medium = SimMedium::new();
        let (mut a, handle) = node(&medium, 0x10, 100);

        let mut msg = Message::with_payload(opcode::APP_DATA, 0x20, 0x10, &[1, 2]).unwrap();
        msg.message_id = 9;
        inject(&handle, &msg);

        let mut uncaught: Vec<Message, 8> = Vec::new();
        assert_eq!(a.poll(&mut uncaught), 1);
        assert_eq!(uncaught[0].payload_bytes(), &[1, 2]);
    }

    #[test]
    fn duplicates_surface_once() {
        let medium = SimMedium::new();
        let (mut a, handle) = node(&medium, 0x10, 100);

        let mut msg = Message::new(opcode::APP_DATA, 0x20, 0x10);
        msg.message_id = 7;
        inject(&handle, &msg);
        inject(&handle, &msg);

        let mut uncaught: Vec<Message, 8> = Vec::new();
        assert_eq!(a.poll(&mut uncaught), 1);
    }

    #[test]
    fn blacklisted_app_frames_are_swallowed() {
        let medium = SimMedium::new();
        let (mut a, handle) = node(&medium, 0x10, 100);
        a.add_blacklist(&[0x20]).unwrap();

        let mut msg = Message::new(opcode::APP_DATA, 0x20, 0x10);
        msg.message_id = 1;
        inject(&handle, &msg);

        let mut uncaught: Vec<Message, 8> = Vec::new();
        assert_eq!(a.poll(&mut uncaught), 0);
    }

    #[test]
    fn blacklisted_present_opens_no_pipe() {
        let medium = SimMedium::new();
        let (mut a, handle) = node(&medium, 0x10, 100);
        a.add_blacklist(&[0x20]).unwrap();

        let mut present = Message::new(opcode::PRESENT, 0x20, BROADCAST);
        present.message_id = 1;
        present.link_data[0] = 0x22;
        inject(&handle, &present);

        let mut uncaught: Vec<Message, 8> = Vec::new();
        a.poll(&mut uncaught);
        assert_eq!(a.connectivity().link_state(0x20), LinkState::Disconnected);
    }

    #[test]
    fn blacklist_capacity_is_enforced() {
        let medium = SimMedium::new();
        let (mut a, _) = node(&medium, 0x10, 100);
        let many: [NodeId; BLACKLIST_CAP] = core::array::from_fn(|i| 0x30 + i as u8);
        a.add_blacklist(&many).unwrap();
        assert_eq!(a.add_blacklist(&[0x99]), Err(Error::BlacklistFull));
    }

    #[test]
    fn keepalive_and_discovery_cadence() {
        let medium = SimMedium::new();
        let (mut a, handle) = node(&medium, 0x10, 10);

        // Half interval: one PRESENT broadcast leaves the radio.
        for _ in 0..5 {
            a.tick();
        }
        assert_eq!(handle.tx_count(), 1);

        // No neighbours, so the keepalive round sends nothing further.
        for _ in 0..6 {
            a.tick();
        }
        assert_eq!(handle.tx_count(), 1);
    }

    #[test]
    fn unknown_opcodes_surface() {
        let medium = SimMedium::new();
        let (mut a, handle) = node(&medium, 0x10, 100);

        let mut msg = Message::new(0x0F, 0x20, 0x10);
        msg.message_id = 2;
        inject(&handle, &msg);

        let mut uncaught: Vec<Message, 8> = Vec::new();
        assert_eq!(a.poll(&mut uncaught), 1);
        assert_eq!(uncaught[0].kind, 0x0F);
    }

    #[test]
    fn no_operation_is_consumed_silently() {
        let medium = SimMedium::new();
        let (mut a, handle) = node(&medium, 0x10, 100);

        let mut msg = Message::new(opcode::NO_OPERATION, 0x20, 0x10);
        msg.message_id = 3;
        inject(&handle, &msg);

        let mut uncaught: Vec<Message, 8> = Vec::new();
        assert_eq!(a.poll(&mut uncaught), 0);
    }

    #[test]
    fn send_without_route_fails() {
        let medium = SimMedium::new();
        let (mut a, _) = node(&medium, 0x10, 100);
        let mut msg = Message::new(opcode::APP_DATA, 0x10, 0x55);
        assert_eq!(a.send_message(&mut msg), Err(Error::NoRoute));
    }

    #[test]
    fn deny_tears_down_the_link() {
        let medium = SimMedium::new();
        let (mut a, handle) = node(&medium, 0x10, 100);

        // Half-open link towards 0x20.
        let mut respond = Message::new(opcode::RESPOND, 0x20, 0x10);
        respond.message_id = 1;
        respond.link_data[0] = 0x12;
        inject(&handle, &respond);
        let mut uncaught: Vec<Message, 8> = Vec::new();
        a.poll(&mut uncaught);
        assert_eq!(a.connectivity().link_state(0x20), LinkState::Accepted);

        let mut deny = Message::new(opcode::DENY, 0x20, 0x10);
        deny.message_id = 2;
        inject(&handle, &deny);
        a.poll(&mut uncaught);
        assert_eq!(a.connectivity().link_state(0x20), LinkState::Disconnected);
        assert!(a.logs().iter().any(|e| e.level == LogLevel::Warn));
    }
}
