//! Configuration management
//!
//! Handles configuration loading and validation for all subsystems. Every
//! tunable threshold lives here with its default; nothing in the engine
//! hard-codes a limit.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Closed vocabulary of capability tags (empty = open tag space)
    #[serde(default)]
    pub capability_vocabulary: Vec<String>,

    /// Closed vocabulary of interface contract names (empty = open)
    #[serde(default)]
    pub interface_vocabulary: Vec<String>,

    /// Interface contract table: interface name → required capability tags
    #[serde(default)]
    pub interface_contracts: HashMap<String, Vec<String>>,

    /// How long tombstones are retained for federation convergence
    #[serde(default = "default_tombstone_retention_secs")]
    pub tombstone_retention_secs: u64,

    /// Metric samples kept per module
    #[serde(default = "default_metrics_window")]
    pub metrics_window: usize,
}

fn default_tombstone_retention_secs() -> u64 {
    300
}

fn default_metrics_window() -> usize {
    32
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capability_vocabulary: Vec::new(),
            interface_vocabulary: Vec::new(),
            interface_contracts: HashMap::new(),
            tombstone_retention_secs: default_tombstone_retention_secs(),
            metrics_window: default_metrics_window(),
        }
    }
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Bounded queue depth per subscriber
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Ring-buffer history depth per bus instance
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_queue_capacity() -> usize {
    64
}

fn default_history_capacity() -> usize {
    256
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            history_capacity: default_history_capacity(),
        }
    }
}

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Sampling interval in milliseconds
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Per-module check timeout in milliseconds
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,
}

fn default_sample_interval_ms() -> u64 {
    5_000
}

fn default_check_timeout_ms() -> u64 {
    1_000
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            check_timeout_ms: default_check_timeout_ms(),
        }
    }
}

/// Autoscaler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingConfig {
    /// Control-loop tick interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    10_000
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Federation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Peer sync interval in milliseconds
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    /// Deadline for one sync round with a peer, in milliseconds
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,

    /// Silence duration after which a peer becomes `Unreachable`
    #[serde(default = "default_unreachable_after_secs")]
    pub unreachable_after_secs: u64,

    /// Retry attempts per sync round
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Initial retry delay in milliseconds (exponential backoff)
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    /// Ceiling on the retry delay in milliseconds
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Bounded jitter applied to each retry delay (fraction of the delay)
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter: f64,
}

fn default_sync_interval_ms() -> u64 {
    15_000
}

fn default_peer_timeout_ms() -> u64 {
    5_000
}

fn default_unreachable_after_secs() -> u64 {
    60
}

fn default_retry_max_attempts() -> u32 {
    5
}

fn default_retry_initial_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_retry_jitter() -> f64 {
    0.2
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: default_sync_interval_ms(),
            peer_timeout_ms: default_peer_timeout_ms(),
            unreachable_after_secs: default_unreachable_after_secs(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_jitter: default_retry_jitter(),
        }
    }
}

/// Top-level orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Local cluster id used for federation tie-breaks
    #[serde(default = "default_cluster_id")]
    pub cluster_id: String,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub events: EventBusConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub scaling: ScalingConfig,

    #[serde(default)]
    pub federation: FederationConfig,
}

fn default_cluster_id() -> String {
    "local".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cluster_id: default_cluster_id(),
            registry: RegistryConfig::default(),
            events: EventBusConfig::default(),
            health: HealthConfig::default(),
            scaling: ScalingConfig::default(),
            federation: FederationConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: OrchestratorConfig = toml::from_str(&contents)?;
        Ok(config)
    }
}
