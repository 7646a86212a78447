// Distributed under the MIT software license.

//! Client-side reconnect loop: dial, HELLO, steady-state PING keepalive,
//! graceful BYE on shutdown.
//!
//! Grounded on `original_source/src/autoc/client.cpp` (`reconnectLoop`,
//! `sendHello`, the keepalive `PING` cadence, and `communication.cpp`'s
//! `setup_wireguard`/`remove_wireguard` called from `start()`/
//! `send_bye_message`) and a `main.rs`-style connection-retry pattern. The
//! original's blocking busy-poll wait for a reply becomes
//! `tokio::time::timeout` around a single `recv`.

use crate::applier::PeerApplier;
use crate::codec;
use crate::config::ClientConfig;
use crate::crypto::{Identity, SealedEnvelope};
use crate::transport::FramedTransport;
use crate::types::{ControlMessage, MessageKind};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Delay between reconnect attempts after a failed dial or dropped
/// connection.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// How long to wait for a `HELLO`/`PONG` reply before giving up on the
/// current connection attempt.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Interval between steady-state `PING`s once provisioned.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

pub struct ClientDriver {
    config: ClientConfig,
    identity: Identity,
    peer_public_key: [u8; 32],
    applier: Arc<dyn PeerApplier>,
}

impl ClientDriver {
    pub fn new(config: ClientConfig, identity: Identity, peer_public_key: [u8; 32], applier: Arc<dyn PeerApplier>) -> Self {
        Self { config, identity, peer_public_key, applier }
    }

    /// Reconnect indefinitely until `shutdown` resolves. On shutdown,
    /// attempts one best-effort `BYE` over the current connection (if
    /// any) before returning, then removes the coordinator as a local
    /// peer if it was ever applied.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut applied_peer_key: Option<String> = None;

        loop {
            let attempt = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                attempt = self.connect_and_provision() => attempt,
            };

            let (mut transport, vpn_ip, vpn_netmask) = match attempt {
                Ok(t) => t,
                Err(e) => {
                    warn!("connect/provision failed: {e}, retrying in {RECONNECT_BACKOFF:?}");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(RECONNECT_BACKOFF) => continue,
                    }
                }
            };

            info!("provisioned, entering steady-state keepalive");
            let closed_early = tokio::select! {
                _ = &mut shutdown => {
                    self.send_bye(&mut transport).await;
                    break;
                }
                result = self.keepalive_loop(&mut transport, vpn_ip, vpn_netmask, &mut applied_peer_key) => result,
            };

            if closed_early {
                warn!("connection lost, reconnecting in {RECONNECT_BACKOFF:?}");
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
        }

        if let Some(public_key) = applied_peer_key {
            self.applier.remove(&public_key).await;
        }
        info!("client driver shut down");
    }

    pub async fn connect_and_provision(&self) -> Result<(FramedTransport, Ipv4Addr, Ipv4Addr), String> {
        let stream = TcpStream::connect(&self.config.coordinator_addr)
            .await
            .map_err(|e| format!("dial {} failed: {e}", self.config.coordinator_addr))?;
        let mut transport = FramedTransport::new(stream);

        let hello = ControlMessage {
            kind: MessageKind::Hello,
            mac_addr: self.config.mac_addr,
            public_key: self.config.this_public_key.clone(),
            endpoint_ip: self.config.this_endpoint_ip,
            endpoint_port: self.config.this_endpoint_port,
            allowed_ips: self.config.this_allowed_ips.clone(),
            ..ControlMessage::nok(self.config.mac_addr)
        };

        self.send(&mut transport, &hello).await.map_err(|e| e.to_string())?;

        let reply = tokio::time::timeout(REPLY_TIMEOUT, self.recv_decoded(&mut transport))
            .await
            .map_err(|_| "timed out waiting for HELLO reply".to_string())?
            .map_err(|e| e.to_string())?;

        match reply.kind {
            MessageKind::Hello => {
                info!("assigned overlay address {}/{}", reply.vpn_ip, reply.vpn_netmask);
                Ok((transport, reply.vpn_ip, reply.vpn_netmask))
            }
            MessageKind::Nok => Err("coordinator rejected HELLO".to_string()),
            other => Err(format!("unexpected reply to HELLO: {other}")),
        }
    }

    /// Send periodic `PING`s and process `PONG`/`NOK` replies until the
    /// connection drops. Returns `true` if the loop ended because the
    /// connection was lost (the caller should reconnect). Every `PONG`
    /// applies the coordinator's returned peering info to the local
    /// interface, recording its public key in `applied_peer_key` so `run`
    /// can remove it again on shutdown.
    async fn keepalive_loop(
        &self,
        transport: &mut FramedTransport,
        vpn_ip: Ipv4Addr,
        vpn_netmask: Ipv4Addr,
        applied_peer_key: &mut Option<String>,
    ) -> bool {
        let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
        ticker.tick().await; // first tick fires immediately; consume it

        loop {
            ticker.tick().await;

            let ping = ControlMessage {
                kind: MessageKind::Ping,
                mac_addr: self.config.mac_addr,
                vpn_ip,
                vpn_netmask,
                public_key: self.config.this_public_key.clone(),
                endpoint_ip: self.config.this_endpoint_ip,
                endpoint_port: self.config.this_endpoint_port,
                allowed_ips: self.config.this_allowed_ips.clone(),
            };

            if self.send(transport, &ping).await.is_err() {
                return true;
            }

            match tokio::time::timeout(REPLY_TIMEOUT, self.recv_decoded(transport)).await {
                Ok(Ok(reply)) if reply.kind == MessageKind::Pong => {
                    debug!("PONG received, endpoint {}:{}", reply.endpoint_ip, reply.endpoint_port);
                    self.applier
                        .apply(&reply.public_key, reply.vpn_ip, reply.endpoint_ip, reply.endpoint_port)
                        .await;
                    *applied_peer_key = Some(reply.public_key);
                }
                Ok(Ok(reply)) => {
                    warn!("unexpected reply to PING: {}", reply.kind);
                }
                Ok(Err(_)) => return true,
                Err(_elapsed) => warn!("PING reply timed out, continuing"),
            }
        }
    }

    async fn send_bye(&self, transport: &mut FramedTransport) {
        let bye = ControlMessage { kind: MessageKind::Bye, ..ControlMessage::nok(self.config.mac_addr) };
        if let Err(e) = self.send(transport, &bye).await {
            warn!("failed to send graceful BYE: {e}");
        }
    }

    async fn send(
        &self,
        transport: &mut FramedTransport,
        msg: &ControlMessage,
    ) -> Result<(), crate::transport::TransportError> {
        let cleartext = codec::encode(msg);
        let envelope = self.identity.seal(&self.peer_public_key, &cleartext);
        transport.send(envelope.as_bytes()).await
    }

    async fn recv_decoded(&self, transport: &mut FramedTransport) -> Result<ControlMessage, String> {
        loop {
            match transport.recv().await {
                Ok(Some(bytes)) => {
                    let envelope = SealedEnvelope::from_bytes(bytes);
                    let cleartext = self
                        .identity
                        .open(&self.peer_public_key, &envelope)
                        .map_err(|e| e.to_string())?;
                    return codec::decode(&cleartext).map_err(|e| e.to_string());
                }
                Ok(None) => continue,
                Err(e) => return Err(e.to_string()),
            }
        }
    }
}
