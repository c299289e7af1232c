//! Coordinator binary

use clap::Parser;
use minidfs::common::{config, parse_duration, CoordinatorConfig};
use minidfs::Coordinator;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "minidfs-coord")]
#[command(about = "minidfs coordinator: sessions, placement and replica bookkeeping")]
#[command(version)]
struct Args {
    /// TOML config file (MINIDFS_* environment variables are layered on top)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address for HTTP
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Allowed departments (comma-separated)
    #[arg(long, value_delimiter = ',')]
    departments: Vec<String>,

    /// Session token validity, e.g. 30m
    #[arg(long, value_parser = parse_duration)]
    token_ttl: Option<Duration>,

    /// Health monitor interval, e.g. 10s
    #[arg(long, value_parser = parse_duration)]
    health_interval: Option<Duration>,

    /// Daily reconcile time (HH:MM, local time)
    #[arg(long)]
    sync_at: Option<String>,

    /// Reconcile interval when no daily time is set, e.g. 1h
    #[arg(long, value_parser = parse_duration)]
    sync_interval: Option<Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// CLI flags take priority over file and environment
    fn apply(self, conf: &mut CoordinatorConfig) {
        if let Some(bind) = self.bind {
            conf.bind_addr = bind;
        }
        if !self.departments.is_empty() {
            conf.departments = self.departments;
        }
        if let Some(ttl) = self.token_ttl {
            conf.token_ttl_secs = ttl.as_secs();
        }
        if let Some(interval) = self.health_interval {
            conf.health_interval_secs = interval.as_secs().max(1);
        }
        if self.sync_at.is_some() {
            conf.sync_at = self.sync_at;
        }
        if let Some(interval) = self.sync_interval {
            conf.sync_interval_secs = interval.as_secs();
        }
        if let Some(level) = self.log_level {
            conf.log_level = level;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load config from file and environment, then override with CLI arguments
    let mut conf: CoordinatorConfig = config::load(args.config.as_deref())?;
    args.apply(&mut conf);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| conf.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("minidfs {}", minidfs::BUILD_INFO);

    let coordinator = Coordinator::new(conf)?;
    coordinator.serve().await?;

    Ok(())
}
