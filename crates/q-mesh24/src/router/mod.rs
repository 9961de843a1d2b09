// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Pluggable next-hop selection
//!
//! The mesh layer consumes routing through the [`Router`] capability. Every
//! method has a default no-op body, so the trait itself doubles as the
//! trivial router: [`DirectRouter`] implements nothing and yields a network
//! where only direct links carry traffic. [`link_state::LinkStateRouter`]
//! is the full implementation.
//!
//! Routers hold no reference to the connectivity layer; the adapter is
//! passed into every call that needs it.

pub mod calculator;
pub mod link_state;

use crate::connectivity::Connectivity;
use crate::message::{Message, NodeId, BROADCAST};

/// Routing capability consumed by the mesh layer
pub trait Router {
    /// Refresh the router's view of the local neighbour set
    fn update_neighbors(&mut self, _conn: &mut dyn Connectivity) {}

    /// Flood a routing announcement into the network
    fn send_update(&mut self, _conn: &mut dyn Connectivity) {}

    /// Flood the first announcement after a link comes up, requesting
    /// announcements from everyone else
    fn initial_update(&mut self, _conn: &mut dyn Connectivity) {}

    /// Incorporate a received routing frame (and propagate it)
    fn on_routing(&mut self, _conn: &mut dyn Connectivity, _msg: &Message) {}

    /// Next hop towards `receiver`, or [`BROADCAST`] when none is known
    fn next_hop(&mut self, _receiver: NodeId) -> NodeId {
        BROADCAST
    }
}

/// Router that never routes
///
/// All methods keep their defaults; traffic flows over direct links only.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectRouter;

impl Router for DirectRouter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_router_knows_no_hops() {
        let mut router = DirectRouter;
        assert_eq!(router.next_hop(0x42), BROADCAST);
    }
}
