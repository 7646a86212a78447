// Distributed under the MIT software license.

//! Bridge from an accepted `PING`/`BYE` to the local WireGuard interface.
//!
//! Grounded on `original_source/src/autod/server.cpp::setup_wireguard`
//! and `::remove_wireguard` — a single external command invocation, whose
//! failure is logged but never propagated: the session still reports
//! success to the peer even if `wg` fails.

use async_trait::async_trait;
use std::net::Ipv4Addr;
use tokio::process::Command;
use tracing::warn;

/// Capability for applying/removing a WireGuard peer on the local
/// interface. The concrete implementation below shells out to the `wg`
/// tool; tests substitute a recording double instead.
#[async_trait]
pub trait PeerApplier: Send + Sync {
    async fn apply(&self, public_key: &str, overlay_ip: Ipv4Addr, endpoint_ip: Ipv4Addr, endpoint_port: u16);
    async fn remove(&self, public_key: &str);
}

/// Invokes `wg set <iface> peer ...` via a subprocess, exactly as the
/// original C++ deployment does.
pub struct WgCommand {
    iface: String,
}

impl WgCommand {
    pub fn new(iface: impl Into<String>) -> Self {
        Self { iface: iface.into() }
    }
}

impl Default for WgCommand {
    fn default() -> Self {
        Self::new("wg0")
    }
}

#[async_trait]
impl PeerApplier for WgCommand {
    async fn apply(&self, public_key: &str, overlay_ip: Ipv4Addr, endpoint_ip: Ipv4Addr, endpoint_port: u16) {
        let args = [
            "set".to_string(),
            self.iface.clone(),
            "peer".to_string(),
            public_key.to_string(),
            "allowed-ips".to_string(),
            format!("{overlay_ip}/32"),
            "endpoint".to_string(),
            format!("{endpoint_ip}:{endpoint_port}"),
            "persistent-keepalive".to_string(),
            "25".to_string(),
        ];
        run_wg(&args).await;
    }

    async fn remove(&self, public_key: &str) {
        let args = [
            "set".to_string(),
            self.iface.clone(),
            "peer".to_string(),
            public_key.to_string(),
            "remove".to_string(),
        ];
        run_wg(&args).await;
    }
}

async fn run_wg(args: &[String]) {
    match Command::new("wg").args(args).output().await {
        Ok(output) if output.status.success() => {
            tracing::info!("wg {} — OK", args.join(" "));
        }
        Ok(output) => {
            warn!(
                "wg {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Err(e) => {
            warn!("failed to invoke wg: {e}");
        }
    }
}

/// Test/inspection double recording every call instead of touching the OS.
#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Apply { public_key: String, overlay_ip: Ipv4Addr, endpoint_ip: Ipv4Addr, endpoint_port: u16 },
        Remove { public_key: String },
    }

    #[derive(Default)]
    pub struct RecordingApplier {
        pub calls: Mutex<Vec<Call>>,
    }

    #[async_trait]
    impl PeerApplier for RecordingApplier {
        async fn apply(&self, public_key: &str, overlay_ip: Ipv4Addr, endpoint_ip: Ipv4Addr, endpoint_port: u16) {
            self.calls.lock().await.push(Call::Apply {
                public_key: public_key.to_string(),
                overlay_ip,
                endpoint_ip,
                endpoint_port,
            });
        }

        async fn remove(&self, public_key: &str) {
            self.calls.lock().await.push(Call::Remove { public_key: public_key.to_string() });
        }
    }
}
