//! Lazylink Server Binary
//!
//! URL shortener with lazy expiration and a background reaper.

use clap::Parser;
use lazylink::{CleanupConfig, Config, Server};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Lazylink Server - URL Shortener
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Port number
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Prefix for generated short URLs
    #[arg(long, default_value = "http://localhost:8080")]
    base_url: String,

    /// Snowflake node id (0-1023)
    #[arg(long, default_value_t = 1)]
    node_id: i64,

    /// Lifetime of links created without a TTL, in seconds
    #[arg(long, default_value_t = 86_400)]
    default_ttl: u64,

    /// Cache TTL ceiling for live entries, in seconds
    #[arg(long, default_value_t = 86_400)]
    cache_ttl: u64,

    /// Cache TTL of tombstones, in seconds
    #[arg(long, default_value_t = 3_600)]
    tombstone_ttl: u64,

    /// Visit dedup window in milliseconds
    #[arg(long, default_value_t = 3_000)]
    dedup_window_ms: u64,

    /// Reaper interval in seconds
    #[arg(long, default_value_t = 900, value_parser = clap::value_parser!(u64).range(1..))]
    cleanup_interval: u64,

    /// Maximum records deleted per reaper tick
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    cleanup_batch_size: u64,

    /// Grace period past expiration before deletion, in seconds
    #[arg(long, default_value_t = 3_600)]
    cleanup_buffer: u64,

    /// Upper bound on a single reaper tick, in seconds
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    cleanup_max_duration: u64,

    /// Disable the background reaper
    #[arg(long)]
    disable_cleanup: bool,

    /// Bearer token required on admin routes
    #[arg(long, env = "LAZYLINK_ADMIN_API_KEY")]
    admin_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lazylink=info".parse()?))
        .init();

    let args = Args::parse();

    let cleanup = CleanupConfig::default()
        .with_interval(Duration::from_secs(args.cleanup_interval))
        .with_batch_size(usize::try_from(args.cleanup_batch_size)?)
        .with_buffer_time(Duration::from_secs(args.cleanup_buffer))
        .with_max_cleanup_duration(Duration::from_secs(args.cleanup_max_duration))
        .with_enabled(!args.disable_cleanup);
    cleanup.validate().map_err(anyhow::Error::msg)?;

    let mut config = Config::default()
        .with_bind(&args.bind)
        .with_port(args.port)
        .with_base_url(&args.base_url)
        .with_node_id(args.node_id)
        .with_cache_ttl(Duration::from_secs(args.cache_ttl))
        .with_dedup_window(Duration::from_millis(args.dedup_window_ms))
        .with_cleanup(cleanup);

    config.default_link_ttl = Duration::from_secs(args.default_ttl);
    config.tombstone_ttl = Duration::from_secs(args.tombstone_ttl);
    config.admin_api_key = args.admin_api_key;

    info!(
        addr = %config.addr(),
        node_id = config.node_id,
        cleanup_enabled = config.cleanup.enabled,
        "Starting Lazylink server"
    );

    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}
