use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::engine::{RateLimitConfig, TierTables};

/// Top-level application configuration. Everything here is infrastructure
/// and policy knobs — not per-request state, which lives only in the CS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub coordination: CoordinationConfig,

    #[serde(default)]
    pub admission: AdmissionConfig,

    #[serde(default)]
    pub tiers: TierTables,

    /// Static api_key → RateLimitConfig overrides, read once at startup.
    #[serde(default)]
    pub overrides: HashMap<String, RateLimitConfig>,

    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            coordination: CoordinationConfig::default(),
            admission: AdmissionConfig::default(),
            tiers: TierTables::default(),
            overrides: HashMap::new(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    #[serde(default = "default_coordination_url")]
    pub url: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Max time to wait for a pooled connection, in milliseconds.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Max time to wait for one admit/reconcile round trip, in milliseconds.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Connect retries attempted at startup before exiting with code 2.
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    #[serde(default = "default_connect_retry_backoff_ms")]
    pub connect_retry_backoff_ms: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            url: default_coordination_url(),
            pool_size: default_pool_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            connect_retries: default_connect_retries(),
            connect_retry_backoff_ms: default_connect_retry_backoff_ms(),
        }
    }
}

fn default_coordination_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_pool_size() -> usize {
    16
}

fn default_acquire_timeout_ms() -> u64 {
    50
}

fn default_command_timeout_ms() -> u64 {
    50
}

fn default_connect_retries() -> u32 {
    5
}

fn default_connect_retry_backoff_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Sliding window width, in seconds, shared by all three counters.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Upper bound on `est_out` when a request omits `max_tokens`.
    #[serde(default = "default_max_out")]
    pub default_max_out: u64,

    /// Bound on in-flight requests per node; beyond this the handler
    /// returns 503 before ever calling AE (§5 Overloaded).
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            default_max_out: default_max_out(),
            max_inflight: default_max_inflight(),
        }
    }
}

fn default_window_seconds() -> u64 {
    60
}

fn default_max_out() -> u64 {
    1024
}

fn default_max_inflight() -> usize {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_admin_listen_addr")]
    pub admin_listen_addr: String,

    /// Seconds the graceful shutdown drain waits before forcing connections
    /// closed.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            admin_listen_addr: default_admin_listen_addr(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_admin_listen_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_drain_timeout_secs() -> u64 {
    10
}
