//! CLI for minidfs
//!
//! File bytes never pass through the coordinator: `put`, `update` and `get`
//! open a local listener, hand its address to the coordinator, and stream
//! with whichever node dials back.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use minidfs::common::{format_bytes, parse_duration};
use minidfs::{CoordinatorClient, FullName};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "minidfs")]
#[command(about = "minidfs clustered file store CLI")]
#[command(version)]
struct Cli {
    /// Coordinator URL
    #[arg(long, default_value = "http://localhost:5000")]
    coordinator: String,

    /// Session token from `minidfs login`
    #[arg(long, env = "MINIDFS_TOKEN", global = true)]
    token: Option<String>,

    /// Address nodes should dial back to
    #[arg(long, default_value = "127.0.0.1", global = true)]
    advertise: IpAddr,

    /// How long to wait for a node to dial back, e.g. 30s
    #[arg(long, default_value = "60s", value_parser = parse_duration, global = true)]
    wait: Duration,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print a session token
    Login { username: String, password: String },

    /// List departments
    Departments,

    /// List a department's files
    Files { department: String },

    /// Upload a new file
    Put {
        /// <department>/<name>
        name: FullName,

        /// Local file to upload
        #[arg(long)]
        file: PathBuf,
    },

    /// Replace an existing file
    Update {
        /// <department>/<name>
        name: FullName,

        /// Local file to upload
        #[arg(long)]
        file: PathBuf,
    },

    /// Download a file
    Get {
        /// <department>/<name>
        name: FullName,

        /// Output file
        #[arg(long)]
        output: PathBuf,
    },

    /// Delete a file
    Delete {
        /// <department>/<name>
        name: FullName,
    },

    /// Add an employee (manager only)
    AddEmployee {
        username: String,
        password: String,

        /// Departments, or MANAGER (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        roles: Vec<String>,
    },

    /// Start a reconcile pass (manager only)
    Sync,

    /// Show registered nodes and file counts
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = CoordinatorClient::new(&cli.coordinator)?;
    let token = || {
        cli.token
            .as_deref()
            .context("no session token: pass --token or set MINIDFS_TOKEN")
    };

    match &cli.command {
        Commands::Login { username, password } => {
            let token = client.login(username, password).await?;
            println!("{}", token);
        }

        Commands::Departments => {
            for department in client.list_departments(token()?).await? {
                println!("{}", department);
            }
        }

        Commands::Files { department } => {
            for file in client.list_department_files(token()?, department).await? {
                println!("{}", file);
            }
        }

        Commands::Put { name, file } | Commands::Update { name, file } => {
            let is_update = matches!(cli.command, Commands::Update { .. });
            // a bad path must fail here, before the coordinator accepts anything
            let source = open_upload(file).await?;
            let listener = TcpListener::bind(SocketAddr::new(cli.advertise, 0)).await?;
            let port = listener.local_addr()?.port();
            let addr = cli.advertise.to_string();

            let accepted = if is_update {
                client.update_file(token()?, &addr, port, name).await?
            } else {
                client.create_file(token()?, &addr, port, name).await?
            };
            if !accepted {
                bail!("coordinator refused {}", name);
            }
            let sent = serve_upload(&listener, source, cli.wait).await?;
            println!("Uploaded {} ({})", name, format_bytes(sent));
        }

        Commands::Get { name, output } => {
            let listener = TcpListener::bind(SocketAddr::new(cli.advertise, 0)).await?;
            let port = listener.local_addr()?.port();
            let accepted = client
                .get_file(
                    token()?,
                    &cli.advertise.to_string(),
                    port,
                    name.name(),
                    name.department(),
                )
                .await?;
            if !accepted {
                bail!("coordinator refused {}", name);
            }
            let received = receive_download(&listener, output, cli.wait).await?;
            println!("Downloaded {} ({})", name, format_bytes(received));
        }

        Commands::Delete { name } => {
            client.delete_file(token()?, name).await?;
            println!("Delete of {} accepted", name);
        }

        Commands::AddEmployee {
            username,
            password,
            roles,
        } => {
            client
                .add_employee(token()?, username, password, roles.clone())
                .await?;
            println!("Added {} ({})", username, roles.join(", "));
        }

        Commands::Sync => {
            client.trigger_sync(token()?).await?;
            println!("Reconcile pass started");
        }

        Commands::Status => {
            let status = client.status().await?;
            println!("Cluster status:");
            println!("  Files: {}", status.files);
            println!("  Tombstones: {}", status.tombstones);
            println!("  Busy: {}", status.busy);
            println!("  Nodes:");
            for node in status.nodes {
                println!(
                    "    {} load={} alive={}",
                    node.node_id, node.load, node.alive
                );
            }
        }
    }

    Ok(())
}

/// Open a regular file for upload
async fn open_upload(file: &Path) -> anyhow::Result<File> {
    let source = File::open(file)
        .await
        .with_context(|| format!("opening {}", file.display()))?;
    if !source.metadata().await?.is_file() {
        bail!("{} is not a regular file", file.display());
    }
    Ok(source)
}

/// Wait for the node to dial back, then stream the local file to it
async fn serve_upload(
    listener: &TcpListener,
    mut source: File,
    wait: Duration,
) -> anyhow::Result<u64> {
    let (mut stream, peer) = tokio::time::timeout(wait, listener.accept())
        .await
        .context("no node dialed back; the upload was dropped")??;
    tracing::debug!("Node connected from {}", peer);

    let sent = tokio::io::copy(&mut source, &mut stream).await?;
    stream.shutdown().await?;
    Ok(sent)
}

/// Wait for the node to dial back, then write what it sends into `output`
async fn receive_download(
    listener: &TcpListener,
    output: &Path,
    wait: Duration,
) -> anyhow::Result<u64> {
    let (mut stream, peer) = tokio::time::timeout(wait, listener.accept())
        .await
        .context("no node dialed back; the download was dropped")??;
    tracing::debug!("Node connected from {}", peer);

    let mut target = File::create(output)
        .await
        .with_context(|| format!("creating {}", output.display()))?;
    let received = tokio::io::copy(&mut stream, &mut target).await?;
    target.flush().await?;
    Ok(received)
}
