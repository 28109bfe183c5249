//! Splitter node entry point.
//!
//! Hosts or joins a shared expense group over TCP and keeps the local
//! replica in RocksDB.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use splitter_network::TcpTransport;
use splitter_node::{
    JoinOutcome, NodeEvent, NodeHandle, NodeSettings, RocksBlobStore, SplitterConfig,
    SplitterNode,
};

/// Splitter Node
#[derive(Parser, Debug)]
#[command(name = "splitter-node", version, about = "Peer-to-peer shared expense ledger")]
struct Args {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "splitter.toml")]
    config: PathBuf,

    /// Override the TCP listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Generate a default config file and exit.
    #[arg(long)]
    init: bool,

    /// Create a group with this name when none exists yet.
    #[arg(long)]
    group: Option<String>,

    /// Invite code or link of a host to join.
    #[arg(long, requires = "name")]
    join: Option<String>,

    /// Name to join under.
    #[arg(long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.init {
        SplitterConfig::default().save(&args.config)?;
        println!("wrote default config to {}", args.config.display());
        return Ok(());
    }

    let mut config = SplitterConfig::load(&args.config)?;
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(ref data_dir) = args.data_dir {
        config.storage.data_dir = data_dir.clone();
    }
    if let Some(level) = args.log_level.clone() {
        config.logging.level = level;
    }

    init_tracing(&config);
    tracing::info!("Splitter node v{}", env!("CARGO_PKG_VERSION"));

    let mut transport = TcpTransport::new(config.listen_socket());
    if let Some(ref addr) = config.network.advertise_addr {
        transport = transport.with_advertise_addr(addr.clone());
    }
    let blobs = Arc::new(RocksBlobStore::open(&config.storage.data_dir)?);

    let settings = NodeSettings {
        identity_retry_delay: config.session.identity_retry_delay(),
        ..NodeSettings::default()
    };
    let (mut node, handle) = SplitterNode::new(Arc::new(transport), blobs, settings)?;
    node.start().await?;

    let mut events = handle.subscribe();
    let node_task = tokio::spawn(node.run());

    if let Err(e) = bootstrap(&handle, &args, &config).await {
        tracing::error!(error = %e, "startup action failed");
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => report(&handle, event).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!(error = %e, "failed to listen for ctrl-c");
                }
                tracing::info!("received shutdown signal");
                break;
            }
        }
    }

    // Fails only when the loop already stopped.
    let _ = handle.shutdown().await;
    match node_task.await {
        Ok(Err(e)) => tracing::error!(error = %e, "node event loop error"),
        Err(e) => tracing::error!(error = %e, "node task panicked"),
        Ok(Ok(())) => {}
    }
    tracing::info!("Splitter node exited cleanly");
    Ok(())
}

fn init_tracing(config: &SplitterConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Create or join a group as asked on the command line, then print the
/// invite for this node.
async fn bootstrap(
    handle: &NodeHandle,
    args: &Args,
    config: &SplitterConfig,
) -> anyhow::Result<()> {
    if let (Some(invite), Some(name)) = (&args.join, &args.name) {
        match handle
            .join(invite, name, config.session.join_timeout())
            .await?
        {
            JoinOutcome::Joined { group_id, user } => {
                tracing::info!(%group_id, user = %user.name, "joined group");
            }
            JoinOutcome::AlreadyConnected => tracing::info!("already connected to host"),
            JoinOutcome::TimedOut => {
                tracing::warn!("host has not answered yet, still waiting in the background");
            }
        }
    } else if let Some(ref name) = args.group {
        if handle.snapshot().await?.groups.is_empty() {
            let group = handle.create_group(name).await?;
            tracing::info!(group_id = %group.id, name = %group.name, "group created");
        }
    }

    let code = handle.invite_code().await?;
    println!("invite code: {}", code);
    if let Some(ref base) = config.network.invite_base_url {
        println!("invite link: {}", handle.invite_link(base).await?);
    }
    Ok(())
}

async fn report(handle: &NodeHandle, event: NodeEvent) {
    match event {
        NodeEvent::Network(notice) => tracing::info!(?notice, "network"),
        NodeEvent::Joined { group_id, user } => {
            tracing::info!(%group_id, user = %user.name, "join completed");
        }
        NodeEvent::StateChanged => match handle.settlement(None).await {
            Ok(plan) => {
                for tx in &plan.transactions {
                    println!("{} owes {} {}", tx.from.name, tx.to.name, tx.amount);
                }
                if plan.is_settled() {
                    println!("all settled up");
                }
            }
            Err(e) => tracing::debug!(error = %e, "no settlement to show"),
        },
    }
}
