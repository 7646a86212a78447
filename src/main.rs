//! WireGuard peer-coordination daemon.
//!
//! Accepts client connections on a TCP port, runs the HELLO/PING/BYE
//! session protocol, and drives the local `wg` interface accordingly.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use wgac::applier::WgCommand;
use wgac::config::ServerConfig;
use wgac::server::Coordinator;
use wgac::types::DEFAULT_PORT;

#[derive(Parser)]
#[command(name = "wgac-coordinatord", version, about = "WireGuard peer-coordination daemon")]
struct Args {
    /// Path to the coordinator's `key = value` configuration file.
    #[arg(long, default_value = "/etc/wgac/coordinator.conf")]
    config: PathBuf,

    /// Path to this coordinator's long-term identity key (generated on
    /// first run if absent).
    #[arg(long, default_value = "/etc/wgac/coordinator.key")]
    identity_key: PathBuf,

    /// Path to the fleet-wide peer identity public key (hex-encoded, 32
    /// bytes), shared out of band with every client.
    #[arg(long, default_value = "/etc/wgac/peer.pub")]
    peer_pubkey: PathBuf,

    /// TCP port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Name of the local WireGuard interface to manage.
    #[arg(long, default_value = "wg0")]
    iface: String,

    /// Run detached from the controlling terminal. Currently only
    /// switches the log format; full daemonization is out of scope.
    #[arg(long)]
    daemon: bool,

    /// Run attached to the controlling terminal (default).
    #[arg(long)]
    foreground: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("wgac=info".parse().unwrap()),
        )
        .with_ansi(!args.daemon)
        .init();

    if let Err(e) = run(args).await {
        error!("fatal: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let _ = args.foreground; // accepted for CLI parity; foreground is already the default

    let config = ServerConfig::load(&args.config)?;
    let identity = wgac::keystore::load_or_generate(&args.identity_key)?;
    let peer_public_key = wgac::keystore::load_peer_public_key(&args.peer_pubkey)?;

    info!("this coordinator's public key: {}", hex::encode(identity.public_key()));

    let applier = Arc::new(WgCommand::new(args.iface));
    let coordinator = Coordinator::bind(
        ("0.0.0.0", args.port),
        config,
        identity,
        peer_public_key,
        applier,
    )
    .await?;

    info!("listening on 0.0.0.0:{}", args.port);

    coordinator.run(shutdown_signal()).await;
    info!("coordinator shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut sigquit = signal(SignalKind::quit()).expect("install SIGQUIT handler");

        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigquit.recv() => info!("received SIGQUIT"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c");
    }
}
