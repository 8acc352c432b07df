//! Runtime configuration for the chain engine
//!
//! These settings are operational: they bound memory and tune throughput but
//! never change which blocks are valid. Consensus rules live in
//! [`crate::chain_params::ChainParams`]. Configuration can be built
//! programmatically, deserialized from JSON, or overlaid from environment
//! variables.

use crate::chain_params::Network;
use serde::{Deserialize, Serialize};

/// Orphan block buffer limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanPoolConfig {
    /// Maximum buffered orphans; the oldest is evicted when full
    #[serde(default = "default_max_orphans")]
    pub max_orphans: usize,

    /// Seconds an orphan may wait for its parent before it is expired
    #[serde(default = "default_orphan_ttl_secs")]
    pub orphan_ttl_secs: u64,
}

fn default_max_orphans() -> usize {
    100
}

fn default_orphan_ttl_secs() -> u64 {
    3600
}

impl Default for OrphanPoolConfig {
    fn default() -> Self {
        Self {
            max_orphans: default_max_orphans(),
            orphan_ttl_secs: default_orphan_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Verify a block's input scripts on the rayon pool
    #[serde(default = "default_true")]
    pub parallel_script_checks: bool,

    /// Allowed drift of a block timestamp ahead of the validation clock
    #[serde(default = "default_max_future_block_time_secs")]
    pub max_future_block_time_secs: u64,

    /// Recently rejected block hashes remembered for fast refusal
    #[serde(default = "default_max_rejected_blocks")]
    pub max_rejected_blocks: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_future_block_time_secs() -> u64 {
    crate::constants::MAX_FUTURE_BLOCK_TIME
}

fn default_max_rejected_blocks() -> usize {
    10_000
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            parallel_script_checks: true,
            max_future_block_time_secs: default_max_future_block_time_secs(),
            max_rejected_blocks: default_max_rejected_blocks(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Events buffered per subscriber before further events to it are dropped
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

fn default_subscriber_capacity() -> usize {
    1024
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_network")]
    pub network: Network,

    #[serde(default)]
    pub orphans: OrphanPoolConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

fn default_network() -> Network {
    Network::Mainnet
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            orphans: OrphanPoolConfig::default(),
            validation: ValidationConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl ChainConfig {
    /// Load configuration from environment variables over the defaults
    ///
    /// Variables follow the pattern `BLVM_CHAIN_<SECTION>_<KEY>`, for example
    /// `BLVM_CHAIN_ORPHANS_MAX_ORPHANS=500`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment in production)
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(network) = lookup("BLVM_CHAIN_NETWORK").and_then(|v| v.parse().ok()) {
            self.network = network;
        }
        if let Some(max) = lookup("BLVM_CHAIN_ORPHANS_MAX_ORPHANS").and_then(|v| v.parse().ok()) {
            self.orphans.max_orphans = max;
        }
        if let Some(ttl) = lookup("BLVM_CHAIN_ORPHANS_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.orphans.orphan_ttl_secs = ttl;
        }
        if let Some(enabled) =
            lookup("BLVM_CHAIN_VALIDATION_PARALLEL_SCRIPT_CHECKS").and_then(|v| v.parse().ok())
        {
            self.validation.parallel_script_checks = enabled;
        }
        if let Some(secs) =
            lookup("BLVM_CHAIN_VALIDATION_MAX_FUTURE_BLOCK_TIME_SECS").and_then(|v| v.parse().ok())
        {
            self.validation.max_future_block_time_secs = secs;
        }
        if let Some(max) =
            lookup("BLVM_CHAIN_VALIDATION_MAX_REJECTED_BLOCKS").and_then(|v| v.parse().ok())
        {
            self.validation.max_rejected_blocks = max;
        }
        if let Some(capacity) =
            lookup("BLVM_CHAIN_NOTIFICATIONS_SUBSCRIBER_CAPACITY").and_then(|v| v.parse().ok())
        {
            self.notifications.subscriber_capacity = capacity;
        }
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ChainConfig::default();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.orphans.max_orphans, 100);
        assert_eq!(config.orphans.orphan_ttl_secs, 3600);
        assert!(config.validation.parallel_script_checks);
        assert_eq!(config.validation.max_future_block_time_secs, 7200);
        assert_eq!(config.validation.max_rejected_blocks, 10_000);
        assert_eq!(config.notifications.subscriber_capacity, 1024);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            ChainConfig::from_json(r#"{"network":"regtest","orphans":{"max_orphans":5}}"#).unwrap();
        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.orphans.max_orphans, 5);
        assert_eq!(config.orphans.orphan_ttl_secs, 3600);
        assert_eq!(config.validation, ValidationConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BLVM_CHAIN_NETWORK", "simnet"),
            ("BLVM_CHAIN_ORPHANS_MAX_ORPHANS", "7"),
            ("BLVM_CHAIN_VALIDATION_PARALLEL_SCRIPT_CHECKS", "false"),
            ("BLVM_CHAIN_VALIDATION_MAX_REJECTED_BLOCKS", "64"),
            ("BLVM_CHAIN_NOTIFICATIONS_SUBSCRIBER_CAPACITY", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let config = ChainConfig::default()
            .with_env_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.network, Network::Simnet);
        assert_eq!(config.orphans.max_orphans, 7);
        assert!(!config.validation.parallel_script_checks);
        assert_eq!(config.validation.max_rejected_blocks, 64);
        assert_eq!(config.notifications.subscriber_capacity, 1024);
    }

    #[test]
    fn test_serde_round_trip() {
        let config = ChainConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(ChainConfig::from_json(&json).unwrap(), config);
    }
}
