//! Configuration for TideKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, TideError};

/// The only engine implementation shipped today.
pub const IN_MEMORY_ENGINE: &str = "in_memory";

/// Main configuration for a TideKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Engine Configuration
    // -------------------------------------------------------------------------
    /// Engine implementation name (only `in_memory` is supported)
    pub engine_type: String,

    /// Number of independently locked partitions, fixed at construction
    pub partitions: usize,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Write-ahead log settings; `None` runs the storage without durability
    pub wal: Option<WalConfig>,

    // -------------------------------------------------------------------------
    // Replication Configuration
    // -------------------------------------------------------------------------
    /// Replication settings; `None` runs a standalone primary
    pub replication: Option<ReplicationConfig>,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address for client queries
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Max size of a single request line (bytes)
    pub max_message_size: usize,

    /// Connection closes after this long without a request
    pub idle_timeout: Duration,
}

/// Write-ahead log configuration
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Records per batch before a size-triggered flush
    pub flush_batch_size: usize,

    /// Upper bound on how long a partial batch waits before being flushed
    pub flush_timeout: Duration,

    /// Segment rollover threshold (bytes)
    pub max_segment_size: u64,

    /// Directory holding `segment_*.wal` files
    pub data_dir: PathBuf,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            flush_batch_size: 100,
            flush_timeout: Duration::from_millis(10),
            max_segment_size: 10 << 20, // 10 MB
            data_dir: PathBuf::from("./data/tidekv/wal"),
        }
    }
}

/// Process-wide replication role, fixed for the lifetime of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaRole {
    Primary,
    Follower,
}

impl FromStr for ReplicaRole {
    type Err = TideError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "primary" | "master" => Ok(ReplicaRole::Primary),
            "follower" | "slave" => Ok(ReplicaRole::Follower),
            other => Err(TideError::Config(format!("replica role is incorrect: {other:?}"))),
        }
    }
}

/// Replication configuration
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    pub role: ReplicaRole,

    /// Address the primary listens on and followers connect to
    pub primary_address: String,

    /// Follower synchronization tick
    pub sync_interval: Duration,

    /// Upper bound on batches returned by one sync response
    pub max_batches_per_sync: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            role: ReplicaRole::Primary,
            primary_address: "127.0.0.1:3232".to_string(),
            sync_interval: Duration::from_secs(1),
            max_batches_per_sync: 64,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine_type: IN_MEMORY_ENGINE.to_string(),
            partitions: 10,
            wal: None,
            replication: None,
            listen_addr: "127.0.0.1:3223".to_string(),
            max_connections: 100,
            max_message_size: 4 << 10, // 4 KB
            idle_timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Role of this instance; standalone instances act as primaries
    pub fn role(&self) -> ReplicaRole {
        self.replication
            .as_ref()
            .map(|r| r.role)
            .unwrap_or(ReplicaRole::Primary)
    }

    /// Reject settings the process cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.engine_type != IN_MEMORY_ENGINE {
            return Err(TideError::Config(format!(
                "engine type is incorrect: {:?}",
                self.engine_type
            )));
        }
        if self.partitions == 0 {
            return Err(TideError::Config("partition count must be positive".to_string()));
        }
        if self.max_connections == 0 {
            return Err(TideError::Config("invalid number of max connections".to_string()));
        }
        if let Some(wal) = &self.wal {
            if wal.flush_batch_size == 0 {
                return Err(TideError::Config("flush batch size must be positive".to_string()));
            }
            if wal.max_segment_size == 0 {
                return Err(TideError::Config("max segment size must be positive".to_string()));
            }
        }
        if let Some(replication) = &self.replication {
            // Followers are fed from the primary's committed log
            if replication.role == ReplicaRole::Primary && self.wal.is_none() {
                return Err(TideError::Config(
                    "a replication primary requires the write-ahead log".to_string(),
                ));
            }
            if replication.sync_interval.is_zero() {
                return Err(TideError::Config("sync interval must be positive".to_string()));
            }
            if replication.max_batches_per_sync == 0 {
                return Err(TideError::Config(
                    "max batches per sync must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the engine type
    pub fn engine_type(mut self, engine_type: impl Into<String>) -> Self {
        self.config.engine_type = engine_type.into();
        self
    }

    /// Set the number of engine partitions
    pub fn partitions(mut self, count: usize) -> Self {
        self.config.partitions = count;
        self
    }

    /// Enable the write-ahead log
    pub fn wal(mut self, wal: WalConfig) -> Self {
        self.config.wal = Some(wal);
        self
    }

    /// Enable replication
    pub fn replication(mut self, replication: ReplicationConfig) -> Self {
        self.config.replication = Some(replication);
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the maximum request size (in bytes)
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Parse a human size string such as `4KB`, `10MB`, `1GB` or `512`
pub fn parse_size(text: &str) -> Result<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);

    if digits.is_empty() {
        return Err(TideError::Config(format!("incorrect size: {text:?}")));
    }
    let number: u64 = digits
        .parse()
        .map_err(|_| TideError::Config(format!("incorrect size: {text:?}")))?;

    let multiplier: u64 = match unit.trim() {
        "" | "B" | "b" => 1,
        "KB" | "Kb" | "kb" => 1 << 10,
        "MB" | "Mb" | "mb" => 1 << 20,
        "GB" | "Gb" | "gb" => 1 << 30,
        other => {
            return Err(TideError::Config(format!("incorrect size unit: {other:?}")));
        }
    };

    number
        .checked_mul(multiplier)
        .ok_or_else(|| TideError::Config(format!("size overflows: {text:?}")))
}
