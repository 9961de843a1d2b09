// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Link-state routing
//!
//! Every node floods its own neighbour row; every node folds received rows
//! into a [`PathCalculator`] and re-floods them, so announcements transit
//! the whole mesh. Shortest paths are only recomputed when a next-hop
//! query actually arrives after a graph change, which trades a little
//! latency for a lot of idle-time processing.
//!
//! Routing frame payload layout: `payload[2i]` is the id of neighbour `i`,
//! `payload[2i + 1]` the cost of the edge towards it.

use heapless::Vec;

use crate::connectivity::Connectivity;
use crate::message::{opcode, Message, NodeId, BROADCAST};
use crate::pipe::PIPE_COUNT;
use crate::router::calculator::{GraphNode, PathCalculator, MAX_NODE_EDGES};
use crate::router::Router;

/// Cost assigned to a direct link by the default estimator
pub const DEFAULT_LINK_COST: u8 = 1;

/// Per-neighbour link cost estimator
///
/// The default charges every link [`DEFAULT_LINK_COST`]; a platform with
/// signal-quality data can plug in its own estimate without touching the
/// flooding format.
pub type CostFn = fn(NodeId) -> u8;

fn unit_cost(_neighbor: NodeId) -> u8 {
    DEFAULT_LINK_COST
}

/// [`Router`] flooding link-state announcements
pub struct LinkStateRouter {
    calc: PathCalculator,
    solved: bool,
    cost_fn: CostFn,
}

impl LinkStateRouter {
    /// Create a router for the node with id `self_id`
    #[must_use]
    pub fn new(self_id: NodeId) -> Self {
        Self::with_cost_fn(self_id, unit_cost)
    }

    /// Create a router using a custom link cost estimator
    #[must_use]
    pub fn with_cost_fn(self_id: NodeId, cost_fn: CostFn) -> Self {
        Self {
            calc: PathCalculator::new(self_id),
            solved: false,
            cost_fn,
        }
    }

    /// The underlying graph, for status displays
    #[must_use]
    pub fn calculator(&self) -> &PathCalculator {
        &self.calc
    }

    /// Fold a received neighbour row into the graph
    fn ingest(&mut self, msg: &Message) {
        let mut node = GraphNode::new(msg.sender);
        let pairs = usize::from(msg.payload_len / 2).min(MAX_NODE_EDGES);
        for i in 0..pairs {
            node.edges[i] = msg.payload[2 * i];
            node.costs[i] = msg.payload[2 * i + 1];
        }
        node.edge_count = pairs as u8;
        self.calc.insert_replace(node);
        self.solved = false;
    }

    /// Write the local neighbour row into a routing frame's payload
    fn fill_update(&mut self, msg: &mut Message) {
        let me = *self.calc.self_node();
        msg.payload_len = me.edge_count * 2;
        for i in 0..usize::from(me.edge_count) {
            msg.payload[2 * i] = me.edges[i];
            msg.payload[2 * i + 1] = me.costs[i];
        }
        self.solved = false;
    }

    fn flood(&mut self, conn: &mut dyn Connectivity, kind: u8) {
        self.update_neighbors(conn);
        let mut msg = Message::new(kind, conn.node_id(), BROADCAST);
        self.fill_update(&mut msg);
        let mut failed: Vec<NodeId, PIPE_COUNT> = Vec::new();
        let _ = conn.send_all(&mut msg, &mut failed);
    }
}

impl Router for LinkStateRouter {
    fn update_neighbors(&mut self, conn: &mut dyn Connectivity) {
        let neighbors = conn.neighbors();
        let cost_fn = self.cost_fn;
        let me = self.calc.self_node_mut();
        me.edge_count = neighbors.len().min(MAX_NODE_EDGES) as u8;
        for (i, neighbor) in neighbors.iter().take(MAX_NODE_EDGES).enumerate() {
            me.edges[i] = *neighbor;
            me.costs[i] = cost_fn(*neighbor);
        }
        self.solved = false;
    }

    fn send_update(&mut self, conn: &mut dyn Connectivity) {
        self.flood(conn, opcode::LS_UPDATE);
    }

    fn initial_update(&mut self, conn: &mut dyn Connectivity) {
        self.flood(conn, opcode::LS_UPDATE_REQUEST);
    }

    fn on_routing(&mut self, conn: &mut dyn Connectivity, msg: &Message) {
        match msg.kind {
            opcode::LS_UPDATE_REQUEST => {
                self.ingest(msg);
                self.send_update(conn);
            }
            opcode::LS_UPDATE => self.ingest(msg),
            _ => {}
        }
        // Re-flood the original frame so the announcement transits the
        // mesh; send_all skips the original sender.
        let mut copy = *msg;
        let mut failed: Vec<NodeId, PIPE_COUNT> = Vec::new();
        let _ = conn.send_all(&mut copy, &mut failed);
    }

    fn next_hop(&mut self, receiver: NodeId) -> NodeId {
        if !self.solved {
            self.calc.setup();
            self.calc.run();
            self.calc.cleanup();
            self.solved = true;
        }
        self.calc.next_hop(receiver)
    }
}
