// Distributed under the MIT software license.

//! TCP acceptor and connection supervisor.
//!
//! Grounded on `original_source/src/autod/inc/server.h` and
//! `server.cpp::removeDeadClients` (a periodic sweep that joins and drops
//! finished client threads) and a listener-loop/per-connection-task-spawn
//! pattern. Each accepted connection becomes a tokio task instead of an
//! OS thread; the reaper sweep becomes a periodic pass over `JoinHandle`s
//! instead of `pthread_join`.

use crate::applier::PeerApplier;
use crate::config::ServerConfig;
use crate::crypto::Identity;
use crate::pool::AddressPool;
use crate::registry::PeerRegistry;
use crate::session::{Session, SessionShared};
use crate::transport::FramedTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How often the supervisor sweeps finished client tasks out of its list.
pub const REAP_INTERVAL: Duration = Duration::from_secs(2);

pub struct Coordinator {
    listener: TcpListener,
    shared: Arc<SessionShared>,
    clients: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Coordinator {
    pub async fn bind(
        addr: impl tokio::net::ToSocketAddrs,
        config: ServerConfig,
        identity: Identity,
        peer_public_key: [u8; 32],
        applier: Arc<dyn PeerApplier>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let begin = config.vpnip_range_begin;
        let end = config.vpnip_range_end;

        let shared = Arc::new(SessionShared {
            config: Arc::new(config),
            registry: Arc::new(Mutex::new(PeerRegistry::new())),
            pool: Arc::new(Mutex::new(
                AddressPool::new(begin, end).map_err(|e| std::io::Error::other(e.to_string()))?,
            )),
            applier,
            identity: Arc::new(identity),
            peer_public_key,
        });

        Ok(Self {
            listener,
            shared,
            clients: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections and reap finished sessions until `shutdown`
    /// resolves.
    pub async fn run(self, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut reap_interval = tokio::time::interval(REAP_INTERVAL);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            info!("accepted connection from {peer_addr}");
                            self.spawn_session(stream).await;
                        }
                        Err(e) => warn!("accept failed: {e}"),
                    }
                }
                _ = reap_interval.tick() => {
                    self.reap_dead_clients().await;
                }
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping accept loop");
                    break;
                }
            }
        }
    }

    async fn spawn_session(&self, stream: tokio::net::TcpStream) {
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            let session = Session::new(shared, FramedTransport::new(stream));
            session.run().await;
        });
        self.clients.lock().await.push(handle);
    }

    /// Drop handles for client tasks that have already finished. Never
    /// holds the client-list lock across session I/O — only across the
    /// cheap `is_finished` check and `Vec::retain`.
    async fn reap_dead_clients(&self) {
        let mut clients = self.clients.lock().await;
        let before = clients.len();
        clients.retain(|h| !h.is_finished());
        let reaped = before - clients.len();
        if reaped > 0 {
            info!("reaped {reaped} dead client session(s), {} remaining", clients.len());
        }
    }
}
