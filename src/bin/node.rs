//! Storage node binary

use clap::Parser;
use minidfs::common::{config, parse_duration, NodeConfig};
use minidfs::NodeServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "minidfs-node")]
#[command(about = "minidfs storage node")]
#[command(version)]
struct Args {
    /// TOML config file (MINIDFS_* environment variables are layered on top)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Node ID (unique identifier for this node)
    #[arg(short, long)]
    id: Option<String>,

    /// Bind address for HTTP
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// URL the coordinator should use to reach this node
    #[arg(long)]
    advertise: Option<String>,

    /// Coordinator URL
    #[arg(long)]
    coordinator: Option<String>,

    /// Storage root; the node keeps its files under <storage>/<id>
    #[arg(short, long)]
    storage: Option<PathBuf>,

    /// Replication multicast port
    #[arg(long)]
    multicast_port: Option<u16>,

    /// Delay between replication datagrams, e.g. 5ms
    #[arg(long, value_parser = parse_duration)]
    pacing: Option<Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, conf: &mut NodeConfig) {
        if let Some(id) = self.id {
            conf.node_id = id;
        }
        if let Some(bind) = self.bind {
            conf.bind_addr = bind;
        }
        if let Some(url) = self.advertise {
            conf.advertise_url = url;
        }
        if let Some(url) = self.coordinator {
            conf.coordinator_url = url;
        }
        if let Some(root) = self.storage {
            conf.storage_root = root;
        }
        if let Some(port) = self.multicast_port {
            conf.multicast_port = port;
        }
        if let Some(pacing) = self.pacing {
            conf.pacing_ms = pacing.as_millis() as u64;
        }
        if let Some(level) = self.log_level {
            conf.log_level = level;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut conf: NodeConfig = config::load(args.config.as_deref())?;
    args.apply(&mut conf);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| conf.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("minidfs {}", minidfs::BUILD_INFO);

    let server = NodeServer::new(conf);
    server.serve().await?;

    Ok(())
}
