// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Runtime configuration for a mesh node
//!
//! Capacity limits (pipe count, graph size, queue depths) are compile-time
//! constants owned by the modules that use them; this structure carries only
//! the knobs an integrator chooses per deployment.

use crate::log::LogLevel;

/// Default keepalive period, in ticks of the outer scheduling loop
pub const DEFAULT_KEEPALIVE_INTERVAL: u32 = 1000;

/// Per-node mesh configuration
#[derive(Debug, Clone, Copy)]
pub struct MeshConfig {
    /// Ticks between keepalive rounds; discovery broadcasts fire at the
    /// half-way point of each round
    pub keepalive_interval: u32,
    /// Minimum severity retained in the node's log ring
    pub log_level: LogLevel,
}

impl MeshConfig {
    /// Create a configuration with the reference values
    #[must_use]
    pub const fn new() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            log_level: LogLevel::Info,
        }
    }

    /// Override the keepalive period
    #[must_use]
    pub const fn with_keepalive_interval(mut self, ticks: u32) -> Self {
        self.keepalive_interval = ticks;
        self
    }

    /// Override the retained log level
    #[must_use]
    pub const fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_values() {
        let config = MeshConfig::new();
        assert_eq!(config.keepalive_interval, 1000);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn builder_overrides() {
        let config = MeshConfig::new()
            .with_keepalive_interval(50)
            .with_log_level(LogLevel::Debug);
        assert_eq!(config.keepalive_interval, 50);
        assert_eq!(config.log_level, LogLevel::Debug);
    }
}
