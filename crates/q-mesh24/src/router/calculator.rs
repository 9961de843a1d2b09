// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Bounded shortest-path calculation
//!
//! A fixed-capacity node table plus Dijkstra's algorithm, sized for the
//! small graphs a constrained node can afford to carry. Entry 0 is always
//! the local node. Solving happens in three phases the router drives on
//! demand: [`PathCalculator::setup`] resets distances,
//! [`PathCalculator::run`] relaxes edges until settled, and
//! [`PathCalculator::cleanup`] evicts rows the solve proved unreachable.

use heapless::Vec;

use crate::message::{NodeId, BROADCAST};

/// Maximum nodes the graph can hold, local node included
pub const MAX_NODES: usize = 10;

/// Maximum recorded edges per node
pub const MAX_NODE_EDGES: usize = 5;

/// Distance marker for nodes no solve has reached
const UNREACHABLE: u16 = u16::MAX;

/// One row of the neighbour graph
#[derive(Debug, Clone, Copy)]
pub struct GraphNode {
    /// Node this row describes
    pub id: NodeId,
    /// Neighbour ids; only the first `edge_count` are significant
    pub edges: [NodeId; MAX_NODE_EDGES],
    /// Cost of the matching edge
    pub costs: [u8; MAX_NODE_EDGES],
    /// Number of significant edges
    pub edge_count: u8,
    distance: u16,
    predecessor: NodeId,
}

impl GraphNode {
    /// Create a row with no edges
    #[must_use]
    pub const fn new(id: NodeId) -> Self {
        Self {
            id,
            edges: [BROADCAST; MAX_NODE_EDGES],
            costs: [0; MAX_NODE_EDGES],
            edge_count: 0,
            distance: UNREACHABLE,
            predecessor: BROADCAST,
        }
    }

    /// Distance from the local node found by the last solve
    #[must_use]
    pub const fn distance(&self) -> u16 {
        self.distance
    }

    /// Whether the last solve reached this row
    #[must_use]
    pub const fn reachable(&self) -> bool {
        self.distance != UNREACHABLE
    }
}

/// Fixed-capacity graph with on-demand shortest paths
pub struct PathCalculator {
    nodes: Vec<GraphNode, MAX_NODES>,
}

impl PathCalculator {
    /// Create a graph holding only the local node
    #[must_use]
    pub fn new(self_id: NodeId) -> Self {
        let mut nodes = Vec::new();
        let _ = nodes.push(GraphNode::new(self_id));
        Self { nodes }
    }

    /// Number of rows currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether only the local row exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Row at `index`; index 0 is the local node
    #[must_use]
    pub fn node(&self, index: usize) -> Option<&GraphNode> {
        self.nodes.get(index)
    }

    /// The local node's row
    #[must_use]
    pub fn self_node(&self) -> &GraphNode {
        &self.nodes[0]
    }

    /// Mutable access to the local node's row
    pub fn self_node_mut(&mut self) -> &mut GraphNode {
        &mut self.nodes[0]
    }

    /// Index of the row describing `id`
    #[must_use]
    pub fn find(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    /// Insert a row, replacing any existing row with the same id
    ///
    /// When the table is full and no row matches, the new row is dropped;
    /// a bigger network than the table can describe degrades to partial
    /// routing rather than evicting an arbitrary row.
    pub fn insert_replace(&mut self, node: GraphNode) {
        match self.find(node.id) {
            Some(i) => self.nodes[i] = node,
            None => {
                let _ = self.nodes.push(node);
            }
        }
    }

    /// Reset the solve state: every row unreachable, the local row at
    /// distance zero
    pub fn setup(&mut self) {
        for node in &mut self.nodes {
            node.distance = UNREACHABLE;
            node.predecessor = BROADCAST;
        }
        self.nodes[0].distance = 0;
    }

    /// Relax edges until every reachable row is settled
    ///
    /// Ties between equal distances settle in insertion order, so the
    /// outcome is deterministic for a given ingestion history.
    pub fn run(&mut self) {
        let mut visited = [false; MAX_NODES];
        loop {
            let mut current: Option<usize> = None;
            for i in 0..self.nodes.len() {
                if visited[i] || self.nodes[i].distance == UNREACHABLE {
                    continue;
                }
                if current.map_or(true, |c| self.nodes[i].distance < self.nodes[c].distance) {
                    current = Some(i);
                }
            }
            let Some(c) = current else {
                break;
            };
            visited[c] = true;

            let from_id = self.nodes[c].id;
            let from_distance = self.nodes[c].distance;
            for e in 0..usize::from(self.nodes[c].edge_count) {
                let to = self.nodes[c].edges[e];
                let cost = u16::from(self.nodes[c].costs[e]);
                let Some(t) = self.find(to) else {
                    // Edge towards a node we hold no row for yet.
                    continue;
                };
                let candidate = from_distance.saturating_add(cost);
                if candidate < self.nodes[t].distance {
                    self.nodes[t].distance = candidate;
                    self.nodes[t].predecessor = from_id;
                }
            }
        }
    }

    /// Evict rows the last solve proved unreachable
    ///
    /// The local row always survives. Remaining rows keep their relative
    /// order so tie-breaking stays stable.
    pub fn cleanup(&mut self) {
        let mut i = 1;
        while i < self.nodes.len() {
            if self.nodes[i].distance == UNREACHABLE {
                self.nodes.remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// First hop on the shortest path to `receiver`
    ///
    /// Walks the predecessor chain of the last solve backwards from the
    /// receiver. Returns [`BROADCAST`] when the receiver is unknown,
    /// unreachable, or the local node itself.
    #[must_use]
    pub fn next_hop(&self, receiver: NodeId) -> NodeId {
        let self_id = self.nodes[0].id;
        if receiver == self_id {
            return BROADCAST;
        }
        let Some(mut at) = self.find(receiver) else {
            return BROADCAST;
        };
        if self.nodes[at].distance == UNREACHABLE {
            return BROADCAST;
        }
        for _ in 0..MAX_NODES {
            let pred = self.nodes[at].predecessor;
            if pred == BROADCAST {
                return BROADCAST;
            }
            if pred == self_id {
                return self.nodes[at].id;
            }
            match self.find(pred) {
                Some(p) => at = p,
                None => return BROADCAST,
            }
        }
        BROADCAST
    }
}
