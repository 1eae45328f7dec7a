//! TideKV Server Binary
//!
//! Starts the TCP server for TideKV, as a primary or a follower.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tidekv::config::{parse_size, ReplicaRole, ReplicationConfig, WalConfig};
use tidekv::network::{QueryHandler, Server};
use tidekv::replication::{Follower, Primary, ReplicationLog};
use tidekv::storage::Role;
use tidekv::{Config, Database, Engine, Storage, Wal};
use tracing_subscriber::{fmt, EnvFilter};

/// TideKV Server
#[derive(Parser, Debug)]
#[command(name = "tidekv-server")]
#[command(about = "Partitioned in-memory key-value store with WAL and replication")]
#[command(version)]
struct Args {
    /// Listen address for client queries (host:port)
    #[arg(short, long, default_value = "127.0.0.1:3223")]
    listen: String,

    /// Maximum concurrent client connections
    #[arg(short, long, default_value = "100")]
    max_connections: usize,

    /// Maximum request size, e.g. 4KB
    #[arg(long, default_value = "4KB", value_parser = size_arg)]
    max_message_size: u64,

    /// Seconds a client may stay idle before being disconnected
    #[arg(long, default_value = "300")]
    idle_timeout_secs: u64,

    /// Number of engine partitions
    #[arg(short, long, default_value = "10")]
    partitions: usize,

    /// Engine implementation
    #[arg(long, default_value = tidekv::config::IN_MEMORY_ENGINE)]
    engine: String,

    /// Run without a write-ahead log (primary only)
    #[arg(long)]
    no_wal: bool,

    /// WAL directory
    #[arg(short, long, default_value = "./data/tidekv/wal")]
    data_dir: PathBuf,

    /// Records per WAL batch
    #[arg(long, default_value = "100")]
    flush_batch_size: usize,

    /// Milliseconds a partial WAL batch may wait before flushing
    #[arg(long, default_value = "10")]
    flush_timeout_ms: u64,

    /// WAL segment rollover size, e.g. 10MB
    #[arg(long, default_value = "10MB", value_parser = size_arg)]
    max_segment_size: u64,

    /// Replication role: primary or follower
    #[arg(short, long)]
    role: Option<ReplicaRole>,

    /// Primary replication address (listened on by a primary, dialed by a follower)
    #[arg(long, default_value = "127.0.0.1:3232")]
    primary_address: String,

    /// Milliseconds between follower syncs
    #[arg(long, default_value = "1000")]
    sync_interval_ms: u64,

    /// Maximum batches per sync response
    #[arg(long, default_value = "64")]
    max_batches_per_sync: usize,
}

fn size_arg(text: &str) -> Result<u64, String> {
    parse_size(text).map_err(|e| e.to_string())
}

impl Args {
    fn config(&self) -> Config {
        let mut builder = Config::builder()
            .engine_type(&self.engine)
            .partitions(self.partitions)
            .listen_addr(&self.listen)
            .max_connections(self.max_connections)
            .max_message_size(self.max_message_size as usize)
            .idle_timeout(Duration::from_secs(self.idle_timeout_secs));

        if !self.no_wal {
            builder = builder.wal(WalConfig {
                flush_batch_size: self.flush_batch_size,
                flush_timeout: Duration::from_millis(self.flush_timeout_ms),
                max_segment_size: self.max_segment_size,
                data_dir: self.data_dir.clone(),
            });
        }

        if let Some(role) = self.role {
            builder = builder.replication(ReplicationConfig {
                role,
                primary_address: self.primary_address.clone(),
                sync_interval: Duration::from_millis(self.sync_interval_ms),
                max_batches_per_sync: self.max_batches_per_sync,
            });
        }

        builder.build()
    }
}

/// Replication endpoint owned by the process
enum Replication {
    None,
    Primary(Primary),
    Follower(Follower),
}

impl Replication {
    fn shutdown(&self) {
        match self {
            Replication::None => {}
            Replication::Primary(primary) => primary.shutdown(),
            Replication::Follower(follower) => follower.shutdown(),
        }
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tidekv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("TideKV Server v{}", tidekv::VERSION);

    if let Err(e) = run(args.config()) {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

fn run(mut config: Config) -> tidekv::Result<()> {
    if config.role() == ReplicaRole::Follower && config.wal.take().is_some() {
        tracing::info!("Follower keeps no local WAL; ignoring WAL settings");
    }
    config.validate()?;

    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!("Role: {:?}", config.role());

    let engine = Arc::new(Engine::new(config.partitions)?);

    let (storage, replication) = match &config.replication {
        Some(replication) if replication.role == ReplicaRole::Follower => {
            let (follower, feed) = Follower::start(replication)?;
            let storage = Storage::new(engine, None, Role::Follower { feed })?;
            (storage, Replication::Follower(follower))
        }
        replication => {
            let log = Arc::new(match &config.wal {
                Some(wal_config) => ReplicationLog::new().with_segments(&wal_config.data_dir),
                None => ReplicationLog::new(),
            });
            let wal = match &config.wal {
                Some(wal_config) => {
                    tracing::info!("WAL directory: {}", wal_config.data_dir.display());
                    let wal = Wal::open(wal_config)?;
                    Some(match replication {
                        Some(_) => wal.with_commit_listener(log.clone()),
                        None => wal,
                    })
                }
                None => {
                    tracing::warn!("WAL disabled; writes are not durable");
                    None
                }
            };
            let storage = Storage::new(engine, wal, Role::Primary)?;
            let replication = match replication {
                Some(replication) => Replication::Primary(Primary::start(replication, log)?),
                None => Replication::None,
            };
            (storage, replication)
        }
    };

    let storage = Arc::new(storage);
    let database = Arc::new(Database::new(Arc::clone(&storage)));
    tracing::info!("Storage initialized successfully");

    let server = Server::bind(&config.listen_addr, config.max_connections, config.idle_timeout)?;
    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, initiating shutdown...");
        shutdown.shutdown();
    })
    .map_err(|e| tidekv::TideError::Config(format!("failed to install signal handler: {e}")))?;

    let handler = Arc::new(QueryHandler::new(database, config.max_message_size));
    let served = server.run(handler);

    // Stop in reverse order of construction: network, replication, storage
    replication.shutdown();
    storage.shutdown();
    served
}
