// Distributed under the MIT software license.

//! End-to-end provisioning flow: a real `Coordinator` over a real TCP
//! socket, driven by a real `ClientDriver` — first HELLO provisions an
//! address and PING/BYE drive the coordinator's `PeerApplier`, and a pool
//! exhausted by three live clients rejects a fourth.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use wgac::applier::mock::{Call, RecordingApplier};
use wgac::client_driver::ClientDriver;
use wgac::codec;
use wgac::config::{ClientConfig, ServerConfig};
use wgac::crypto::SealedEnvelope;
use wgac::transport::FramedTransport;
use wgac::types::{ControlMessage, MessageKind};
use wgac::{Coordinator, Identity};

/// All clients in these tests share one secret, matching the fleet-wide
/// single-keypair model the coordinator implements: it holds exactly one
/// peer public key, so every client identity must derive from it.
const CLIENT_SECRET: [u8; 32] = [7u8; 32];

fn server_config() -> ServerConfig {
    ServerConfig {
        vpnip_range_begin: Ipv4Addr::new(10, 9, 0, 1),
        vpnip_range_end: Ipv4Addr::new(10, 9, 0, 3),
        this_vpn_ip: Ipv4Addr::new(10, 9, 0, 254),
        this_vpn_netmask: Ipv4Addr::new(255, 255, 255, 0),
        this_endpoint_ip: Ipv4Addr::new(198, 51, 100, 20),
        this_endpoint_port: 51822,
        this_allowed_ips: "10.9.0.0/24".to_string(),
        this_public_key: "COORDINATORKEY".to_string(),
    }
}

fn client_config(coordinator_addr: String, last_octet: u8) -> ClientConfig {
    ClientConfig {
        coordinator_addr,
        mac_addr: format!("02:00:00:00:00:{last_octet:02x}").parse().unwrap(),
        this_public_key: format!("CLIENTKEY{last_octet}"),
        this_endpoint_ip: Ipv4Addr::new(203, 0, 113, last_octet),
        this_endpoint_port: 51820,
        this_allowed_ips: "10.9.0.0/32".to_string(),
    }
}

#[tokio::test]
async fn s1_s2_first_client_is_provisioned_and_applied() {
    let coordinator_identity = Identity::generate();
    let coordinator_pub = coordinator_identity.public_key();
    let client_identity = Identity::from_secret_bytes(CLIENT_SECRET);
    let applier = Arc::new(RecordingApplier::default());

    let coordinator = Coordinator::bind(
        "127.0.0.1:0",
        server_config(),
        coordinator_identity,
        client_identity.public_key(),
        applier.clone(),
    )
    .await
    .unwrap();
    let addr = coordinator.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let server_task = tokio::spawn(coordinator.run(async {
        let _ = shutdown_rx.await;
    }));

    let cfg = client_config(addr.to_string(), 1);
    let driver = ClientDriver::new(
        cfg.clone(),
        Identity::from_secret_bytes(CLIENT_SECRET),
        coordinator_pub,
        Arc::new(RecordingApplier::default()),
    );
    let (mut transport, vpn_ip, vpn_netmask) =
        tokio::time::timeout(Duration::from_secs(2), driver.connect_and_provision())
            .await
            .expect("HELLO did not complete in time")
            .expect("HELLO was rejected");

    assert_eq!(vpn_ip, Ipv4Addr::new(10, 9, 0, 1));
    assert_eq!(vpn_netmask, Ipv4Addr::new(255, 255, 255, 0));

    // S2: a PING carrying the assigned overlay address must make the
    // coordinator apply this client as a local WireGuard peer.
    let ping = ControlMessage {
        kind: MessageKind::Ping,
        mac_addr: cfg.mac_addr,
        vpn_ip,
        vpn_netmask,
        public_key: cfg.this_public_key.clone(),
        endpoint_ip: cfg.this_endpoint_ip,
        endpoint_port: cfg.this_endpoint_port,
        allowed_ips: cfg.this_allowed_ips.clone(),
    };
    send_sealed(&mut transport, &client_identity, &coordinator_pub, &ping).await;
    let pong = recv_sealed(&mut transport, &client_identity, &coordinator_pub).await;
    assert_eq!(pong.kind, MessageKind::Pong);

    assert_eq!(
        applier.calls.lock().await.as_slice(),
        &[Call::Apply {
            public_key: cfg.this_public_key.clone(),
            overlay_ip: vpn_ip,
            endpoint_ip: cfg.this_endpoint_ip,
            endpoint_port: cfg.this_endpoint_port,
        }],
    );

    // S3: BYE must remove the same peer again.
    let bye = ControlMessage { kind: MessageKind::Bye, public_key: cfg.this_public_key.clone(), ..ping };
    send_sealed(&mut transport, &client_identity, &coordinator_pub, &bye).await;
    let bye_reply = recv_sealed(&mut transport, &client_identity, &coordinator_pub).await;
    assert_eq!(bye_reply.kind, MessageKind::Bye);

    let calls = applier.calls.lock().await;
    assert_eq!(calls.last(), Some(&Call::Remove { public_key: cfg.this_public_key }));
    drop(calls);

    drop(transport);
    let _ = shutdown_tx.send(());
    server_task.await.unwrap();
}

#[tokio::test]
async fn s4_third_client_exhausts_the_pool() {
    // Range is 10.9.0.1..=10.9.0.3 — three slots.
    let coordinator_identity = Identity::generate();
    let coordinator_pub = coordinator_identity.public_key();
    let client_pub = Identity::from_secret_bytes(CLIENT_SECRET).public_key();

    let coordinator = Coordinator::bind(
        "127.0.0.1:0",
        server_config(),
        coordinator_identity,
        client_pub,
        Arc::new(RecordingApplier::default()),
    )
    .await
    .unwrap();
    let addr = coordinator.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let server_task = tokio::spawn(coordinator.run(async {
        let _ = shutdown_rx.await;
    }));

    // Three successful HELLOs consume the whole /30-ish range. Every
    // driver uses the one secret whose public key the coordinator holds.
    let mut held_transports = Vec::new();
    for i in 1..=3u8 {
        let driver = ClientDriver::new(
            client_config(addr.to_string(), i),
            Identity::from_secret_bytes(CLIENT_SECRET),
            coordinator_pub,
            Arc::new(RecordingApplier::default()),
        );
        let (transport, _, _) = driver.connect_and_provision().await.unwrap();
        held_transports.push(transport);
    }

    // A fourth, distinct MAC gets rejected — the pool has nothing left.
    let driver = ClientDriver::new(
        client_config(addr.to_string(), 4),
        Identity::from_secret_bytes(CLIENT_SECRET),
        coordinator_pub,
        Arc::new(RecordingApplier::default()),
    );
    let result = driver.connect_and_provision().await;
    assert!(result.is_err(), "fourth HELLO should be rejected once the pool is exhausted");

    drop(held_transports);
    let _ = shutdown_tx.send(());
    server_task.await.unwrap();
}

async fn send_sealed(transport: &mut FramedTransport, identity: &Identity, peer_public_key: &[u8; 32], msg: &ControlMessage) {
    let envelope = identity.seal(peer_public_key, &codec::encode(msg));
    transport.send(envelope.as_bytes()).await.unwrap();
}

async fn recv_sealed(transport: &mut FramedTransport, identity: &Identity, peer_public_key: &[u8; 32]) -> ControlMessage {
    loop {
        if let Some(bytes) = transport.recv().await.unwrap() {
            let cleartext = identity.open(peer_public_key, &SealedEnvelope::from_bytes(bytes)).unwrap();
            return codec::decode(&cleartext).unwrap();
        }
    }
}
