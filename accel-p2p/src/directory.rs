//! Rank → endpoint addressing.

use crate::config::EndpointConfig;
use crate::error::{AccelError, Result};
use crate::types::{Rank, SessionId};
use std::collections::HashSet;

/// Addressing information the transport needs to reach one rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub rank: Rank,
    pub address: String,
    pub port: u16,
    pub session_id: SessionId,
    pub max_segment_size: usize,
}

impl Endpoint {
    /// `address:port`, suitable for `TcpStream::connect` / `lookup_host`.
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rank {} @ {}:{} (session {})",
            self.rank, self.address, self.port, self.session_id
        )
    }
}

/// Immutable rank → [`Endpoint`] table, built once at startup.
#[derive(Debug, Clone)]
pub struct EndpointDirectory {
    endpoints: Vec<Endpoint>,
}

impl EndpointDirectory {
    /// Build the directory from an ordered list, one entry per rank.
    ///
    /// Fails with `Configuration` if the list length differs from
    /// `world_size`, a session id repeats, an address is empty, or a
    /// segment size is zero.
    pub fn new(entries: Vec<EndpointConfig>, world_size: u32) -> Result<Self> {
        if world_size == 0 {
            return Err(AccelError::config("world size must be at least 1"));
        }
        if entries.len() != world_size as usize {
            return Err(AccelError::config(format!(
                "expected {world_size} endpoint entries, got {}",
                entries.len()
            )));
        }

        let mut sessions = HashSet::new();
        let mut endpoints = Vec::with_capacity(entries.len());
        for (rank, entry) in (0..world_size).zip(entries) {
            if !sessions.insert(entry.session_id) {
                return Err(AccelError::config(format!(
                    "duplicate session id {} (rank {rank})",
                    entry.session_id
                )));
            }
            if entry.address.trim().is_empty() {
                return Err(AccelError::config(format!("empty address for rank {rank}")));
            }
            if entry.max_segment_size == 0 {
                return Err(AccelError::config(format!(
                    "max_segment_size must be positive (rank {rank})"
                )));
            }
            endpoints.push(Endpoint {
                rank,
                address: entry.address,
                port: entry.port,
                session_id: entry.session_id,
                max_segment_size: entry.max_segment_size,
            });
        }

        Ok(Self { endpoints })
    }

    /// Look up the endpoint bound to `rank`.
    pub fn resolve(&self, rank: Rank) -> Result<&Endpoint> {
        self.endpoints
            .get(rank as usize)
            .ok_or(AccelError::UnknownRank {
                rank,
                world_size: self.world_size(),
            })
    }

    /// Number of ranks in the directory.
    pub fn world_size(&self) -> u32 {
        self.endpoints.len() as u32
    }

    /// All endpoints in rank order.
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }
}
