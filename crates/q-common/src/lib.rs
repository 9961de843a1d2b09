// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Qbitel Mesh24 Common Library
//!
//! Shared support types for the 2.4 GHz small-node mesh stack:
//!
//! - Unified error type with stable numeric codes
//! - Bounded in-memory log ring for field diagnostics
//! - Runtime configuration for a mesh node
//!
//! # Features
//!
//! - `std`: Enable standard library support (disabled by default for embedded)
//! - `defmt`: Enable defmt formatting support for embedded debugging
//!
//! No heap allocations are performed - all buffers use fixed-size arrays or
//! heapless collections.

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod config;
pub mod errors;
pub mod log;

// Re-export commonly used items
pub use config::MeshConfig;
pub use errors::{Error, Result};
pub use log::{LogBuffer, LogEntry, LogLevel};
