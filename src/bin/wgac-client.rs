//! WireGuard peer-coordination client.
//!
//! Dials the coordinator, completes HELLO/PING provisioning, and keeps
//! the session alive until shut down.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use wgac::applier::WgCommand;
use wgac::config::ClientConfig;
use wgac::types::DEFAULT_PORT;
use wgac::ClientDriver;

#[derive(Parser)]
#[command(name = "wgac-client", version, about = "WireGuard peer-coordination client")]
struct Args {
    /// Path to the client's `key = value` configuration file.
    #[arg(long, default_value = "/etc/wgac/client.conf")]
    config: PathBuf,

    /// Coordinator address, overriding `coordinator_addr` in the config
    /// file if given.
    #[arg(long)]
    server: Option<String>,

    /// Path to this client's long-term identity key (generated on first
    /// run if absent).
    #[arg(long, default_value = "/etc/wgac/client.key")]
    identity_key: PathBuf,

    /// Path to the fleet-wide peer identity public key.
    #[arg(long, default_value = "/etc/wgac/peer.pub")]
    peer_pubkey: PathBuf,

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
    let _ = args.foreground;

    let mut config = ClientConfig::load(&args.config)?;
    if let Some(server) = args.server {
        config.coordinator_addr = if server.contains(':') {
            server
        } else {
            format!("{server}:{DEFAULT_PORT}")
        };
    }

    let identity = wgac::keystore::load_or_generate(&args.identity_key)?;
    let peer_public_key = wgac::keystore::load_peer_public_key(&args.peer_pubkey)?;

    info!("this client's public key: {}", hex::encode(identity.public_key()));
    info!("coordinator: {}", config.coordinator_addr);

    let applier = Arc::new(WgCommand::new(args.iface));
    let driver = ClientDriver::new(config, identity, peer_public_key, applier);
    driver.run(shutdown_signal()).await;
    info!("client shut down cleanly");
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
