// Distributed under the MIT software license.

//! Per-connection session state machine: HELLO → PING → BYE.
//!
//! Grounded on `original_source/src/autod/server.cpp::handleClientMsg`.
//! One [`Session`] runs as its own tokio task per accepted connection,
//! reading and replying on its own `FramedTransport` in strict
//! request/reply order — only the task owning a connection ever writes
//! to it, so there is no send interleaving to guard against.

use crate::applier::PeerApplier;
use crate::codec;
use crate::config::ServerConfig;
use crate::crypto::{CryptoError, Identity};
use crate::pool::AddressPool;
use crate::registry::{PeerAttrs, PeerRegistry};
use crate::transport::{FramedTransport, TransportError};
use crate::types::{ControlMessage, MacAddr, MessageKind};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHello,
    Provisioned,
    Closed,
}

/// Shared, process-wide resources a session needs. Locks are always
/// acquired `registry` before `pool`, and never held across an
/// `applier` invocation.
pub struct SessionShared {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<Mutex<PeerRegistry>>,
    pub pool: Arc<Mutex<AddressPool>>,
    pub applier: Arc<dyn PeerApplier>,
    pub identity: Arc<Identity>,
    pub peer_public_key: [u8; 32],
}

pub struct Session {
    shared: Arc<SessionShared>,
    transport: FramedTransport,
    state: SessionState,
}

impl Session {
    pub fn new(shared: Arc<SessionShared>, transport: FramedTransport) -> Self {
        Self { shared, transport, state: SessionState::AwaitingHello }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session until the peer disconnects, sends `BYE`, or a
    /// transport/decrypt error closes it.
    pub async fn run(mut self) {
        loop {
            let envelope = match self.transport.recv().await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue, // 1s read timeout, nothing to do yet
                Err(TransportError::PeerClosed) => {
                    debug!("peer disconnected");
                    break;
                }
                Err(TransportError::Io(e)) => {
                    warn!("transport error, closing session: {e}");
                    break;
                }
            };

            let cleartext = match self
                .shared
                .identity
                .open(&self.shared.peer_public_key, &crate::crypto::SealedEnvelope::from_bytes(envelope))
            {
                Ok(bytes) => bytes,
                Err(CryptoError::Decrypt) | Err(CryptoError::EnvelopeTooShort(_)) => {
                    // Resist garbage traffic: drop and keep the session open.
                    debug!("dropping envelope that failed to decrypt");
                    continue;
                }
            };

            let rmsg = match codec::decode(&cleartext) {
                Ok(m) => m,
                Err(e) => {
                    debug!("dropping envelope with malformed cleartext: {e}");
                    continue;
                }
            };

            if self.handle_message(&rmsg).await.is_break() {
                break;
            }
        }

        self.state = SessionState::Closed;
    }

    async fn handle_message(&mut self, rmsg: &ControlMessage) -> std::ops::ControlFlow<()> {
        match rmsg.kind {
            MessageKind::Hello => self.on_hello(rmsg).await,
            MessageKind::Ping => self.on_ping(rmsg).await,
            MessageKind::Bye => return self.on_bye(rmsg).await,
            _ => {
                debug!("unexpected message kind {:?} in state {:?}", rmsg.kind, self.state);
                self.reply_nok(rmsg.mac_addr).await;
            }
        }
        std::ops::ControlFlow::Continue(())
    }

    async fn on_hello(&mut self, rmsg: &ControlMessage) {
        info!("HELLO from {}", rmsg.mac_addr);

        let attrs = attrs_from(rmsg);
        self.shared.registry.lock().await.add(rmsg.mac_addr, attrs);

        let vpn_netmask = self.shared.config.this_vpn_netmask;

        let allocated = {
            let mut pool = self.shared.pool.lock().await;
            match pool.search(&rmsg.mac_addr) {
                Some(entry) => Some(entry),
                None => pool.allocate(&rmsg.mac_addr).ok(),
            }
        };

        match allocated {
            Some(entry) => {
                info!("assigning {}/{} to {}", entry.vpn_ip, vpn_netmask, rmsg.mac_addr);
                let reply = ControlMessage {
                    kind: MessageKind::Hello,
                    mac_addr: rmsg.mac_addr,
                    vpn_ip: entry.vpn_ip,
                    vpn_netmask,
                    public_key: String::new(),
                    endpoint_ip: std::net::Ipv4Addr::UNSPECIFIED,
                    endpoint_port: 0,
                    allowed_ips: String::new(),
                };
                self.send(&reply).await;
                self.state = SessionState::Provisioned;
            }
            None => {
                warn!("can't bind mac address to an overlay ip: {}", rmsg.mac_addr);
                self.reply_nok(rmsg.mac_addr).await;
            }
        }
    }

    async fn on_ping(&mut self, rmsg: &ControlMessage) {
        info!("PING from {}", rmsg.mac_addr);

        let attrs = attrs_from(rmsg);
        let updated = self.shared.registry.lock().await.update(&rmsg.mac_addr, attrs);
        if !updated {
            self.reply_nok(rmsg.mac_addr).await;
            return;
        }

        let cfg = &self.shared.config;
        let reply = ControlMessage {
            kind: MessageKind::Pong,
            mac_addr: rmsg.mac_addr,
            vpn_ip: cfg.this_vpn_ip,
            vpn_netmask: cfg.this_vpn_netmask,
            public_key: cfg.this_public_key.clone(),
            endpoint_ip: cfg.this_endpoint_ip,
            endpoint_port: cfg.this_endpoint_port,
            allowed_ips: cfg.this_allowed_ips.clone(),
        };
        self.send(&reply).await;

        self.shared
            .applier
            .apply(&rmsg.public_key, rmsg.vpn_ip, rmsg.endpoint_ip, rmsg.endpoint_port)
            .await;
    }

    async fn on_bye(&mut self, rmsg: &ControlMessage) -> std::ops::ControlFlow<()> {
        info!("BYE from {}", rmsg.mac_addr);

        let removed = self.shared.registry.lock().await.remove(&rmsg.mac_addr);
        if !removed {
            self.reply_nok(rmsg.mac_addr).await;
            return std::ops::ControlFlow::Continue(());
        }

        let reply = ControlMessage {
            kind: MessageKind::Bye,
            mac_addr: rmsg.mac_addr,
            ..ControlMessage::nok(rmsg.mac_addr)
        };
        self.send(&reply).await;

        self.shared.pool.lock().await.release(&rmsg.mac_addr);
        self.shared.applier.remove(&rmsg.public_key).await;

        std::ops::ControlFlow::Break(())
    }

    async fn reply_nok(&mut self, mac_addr: MacAddr) {
        self.send(&ControlMessage::nok(mac_addr)).await;
    }

    async fn send(&mut self, msg: &ControlMessage) {
        let cleartext = codec::encode(msg);
        let envelope = self.shared.identity.seal(&self.shared.peer_public_key, &cleartext);
        if let Err(e) = self.transport.send(envelope.as_bytes()).await {
            warn!("send failed, closing session: {e}");
            self.state = SessionState::Closed;
        }
    }
}

fn attrs_from(rmsg: &ControlMessage) -> PeerAttrs {
    PeerAttrs {
        vpn_ip: rmsg.vpn_ip,
        vpn_netmask: rmsg.vpn_netmask,
        public_key: rmsg.public_key.clone(),
        endpoint_ip: rmsg.endpoint_ip,
        endpoint_port: rmsg.endpoint_port,
        allowed_ips: rmsg.allowed_ips.clone(),
    }
}
