//! Runtime-configurable tuning parameters and endpoint list loading.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `ACCEL_`) or by constructing a custom `ClientConfig`.

use crate::error::{AccelError, Result};
use crate::types::SessionId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tuning parameters for a communication client and its engine.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum wait for any blocking send/recv/barrier. Adjustable later
    /// through `AccelClient::set_timeout`.
    pub timeout: Duration,

    /// How long the TCP engine keeps retrying to reach a peer that is not
    /// listening yet.
    pub connect_timeout: Duration,

    /// Pause between connection attempts.
    pub connect_backoff: Duration,

    /// Capacity of each per-(source, tag) delivery lane.
    pub lane_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            connect_backoff: Duration::from_millis(50),
            lane_capacity: 16,
        }
    }
}

impl ClientConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `ACCEL_TIMEOUT_MS`
    /// - `ACCEL_CONNECT_TIMEOUT_MS`
    /// - `ACCEL_CONNECT_BACKOFF_MS`
    /// - `ACCEL_LANE_CAPACITY`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        let millis = |key: &str| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
        };

        if let Some(d) = millis("ACCEL_TIMEOUT_MS") {
            cfg.timeout = d;
        }
        if let Some(d) = millis("ACCEL_CONNECT_TIMEOUT_MS") {
            cfg.connect_timeout = d;
        }
        if let Some(d) = millis("ACCEL_CONNECT_BACKOFF_MS") {
            cfg.connect_backoff = d;
        }
        if let Some(n) = lookup("ACCEL_LANE_CAPACITY").and_then(|v| v.parse::<usize>().ok()) {
            if n > 0 {
                cfg.lane_capacity = n;
            }
        }

        cfg
    }
}

/// One record of the static per-rank configuration list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(alias = "ip")]
    pub address: String,
    pub port: u16,
    pub session_id: SessionId,
    pub max_segment_size: usize,
}

/// Default segment size for generated endpoint lists (64 KiB).
pub const DEFAULT_MAX_SEGMENT_SIZE: usize = 64 * 1024;

/// Build the loopback layout used by single-host runs: rank `i` listens on
/// `127.0.0.1:(base_port + world_size + i)` with session id `i`.
pub fn local_endpoints(world_size: u32, base_port: u16) -> Result<Vec<EndpointConfig>> {
    (0..world_size)
        .map(|i| {
            let port = u32::from(base_port) + world_size + i;
            let port = u16::try_from(port).map_err(|_| {
                AccelError::config(format!(
                    "port {port} for rank {i} is out of range (base port {base_port})"
                ))
            })?;
            Ok(EndpointConfig {
                address: "127.0.0.1".into(),
                port,
                session_id: i,
                max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            })
        })
        .collect()
}

/// Read an ordered endpoint list from a JSON array.
pub fn load_endpoints(path: impl AsRef<Path>) -> Result<Vec<EndpointConfig>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| AccelError::config(format!("parse {}: {e}", path.display())))
}
