// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Q-MESH24 for Qbitel EdgeOS
//!
//! Self-organizing mesh networking for small nodes built around 2.4 GHz
//! packet radios with hardware auto-acknowledgement and a handful of
//! receive pipes:
//!
//! - **Message**: Fixed-layout frame codec
//! - **Pipe**: One direct radio link and its state machine
//! - **Connectivity**: Pipe ownership, discovery handlers, reliable send
//! - **Router**: Pluggable next-hop selection, link-state implementation
//! - **Network**: Orchestration - periodic tick, dispatch, blacklist
//!
//! The stack is single-threaded and pull-driven: an outer loop calls
//! [`MeshNetwork::tick`] and [`MeshNetwork::poll`] and everything else
//! happens synchronously inside those calls. Radio hardware is consumed
//! through the [`radio::RadioDevice`] capability; no concrete driver lives
//! in this crate.

#![no_std]
#![warn(missing_docs)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod connectivity;
pub mod message;
pub mod network;
pub mod pipe;
pub mod radio;
pub mod router;

pub use connectivity::{Connectivity, DuplicateFilter, RadioConnectivity};
pub use message::{opcode, Message, NodeId, BROADCAST, MAX_PAYLOAD};
pub use network::MeshNetwork;
pub use pipe::{LinkState, Pipe, PIPE_COUNT};
pub use radio::{Address, Delay, Mode, NoDelay, RadioDevice};
pub use router::calculator::{GraphNode, PathCalculator, MAX_NODES, MAX_NODE_EDGES};
pub use router::link_state::LinkStateRouter;
pub use router::{DirectRouter, Router};
