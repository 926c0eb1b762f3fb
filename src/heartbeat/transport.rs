//! UDP Heartbeat Transport
//!
//! Moves heartbeats between the two nodes: queued outbound beats are
//! framed and sent to the peer, inbound datagrams are checked and handed
//! to the arbiter. Delivery is best-effort in both directions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

use super::protocol::{Packet, MAX_DATAGRAM};
use super::HeartbeatMessage;
use crate::error::{Error, Result};
use crate::state::ClusterArbiter;
use crate::uptime::{PeerUptime, UptimeSource};

/// UDP transport bound to one local address and one peer
pub struct HeartbeatTransport {
    socket: Arc<UdpSocket>,
    peer_address: SocketAddr,
    cluster_id: u32,
    arbiter: Arc<ClusterArbiter>,
    uptime: Arc<dyn UptimeSource>,
    peer_uptime: Arc<PeerUptime>,
    shutdown: watch::Sender<bool>,
}

impl HeartbeatTransport {
    /// Bind the heartbeat socket
    pub async fn bind(
        bind_address: &str,
        peer_address: &str,
        cluster_id: u32,
        arbiter: Arc<ClusterArbiter>,
        uptime: Arc<dyn UptimeSource>,
        peer_uptime: Arc<PeerUptime>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(bind_address)
            .await
            .map_err(|e| Error::Network(format!("Failed to bind heartbeat socket {}: {}", bind_address, e)))?;

        let peer_address = tokio::net::lookup_host(peer_address)
            .await?
            .next()
            .ok_or_else(|| Error::Network(format!("Could not resolve peer address {}", peer_address)))?;

        let (shutdown, _) = watch::channel(false);

        tracing::info!(
            "Heartbeat transport listening on {}, peer {}",
            socket.local_addr()?,
            peer_address
        );

        Ok(Self {
            socket: Arc::new(socket),
            peer_address,
            cluster_id,
            arbiter,
            uptime,
            peer_uptime,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Drain queued heartbeats and send them to the peer
    pub async fn run_sender(&self, mut outgoing: mpsc::Receiver<HeartbeatMessage>) {
        let mut shutdown_rx = self.shutdown.subscribe();
        tracing::info!("Heartbeat sender started");

        loop {
            tokio::select! {
                msg = outgoing.recv() => {
                    let Some(msg) = msg else { break };
                    if let Err(e) = self.send_one(msg).await {
                        tracing::debug!("Heartbeat send to {} failed: {}", self.peer_address, e);
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Heartbeat sender stopped");
    }

    async fn send_one(&self, msg: HeartbeatMessage) -> Result<()> {
        let packet = Packet::new(msg, self.uptime.local_uptime().as_secs());
        let datagram = packet.encode()?;
        self.socket.send_to(&datagram, self.peer_address).await?;
        tracing::trace!("Heartbeat sent to {} ({} bytes)", self.peer_address, datagram.len());
        Ok(())
    }

    /// Receive datagrams and feed them to the arbiter
    pub async fn run_receiver(&self) {
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut buf = [0u8; MAX_DATAGRAM];
        tracing::info!("Heartbeat receiver started");

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, src)) => {
                            if let Err(e) = self.handle_datagram(&buf[..len], src) {
                                tracing::warn!("Dropped heartbeat from {}: {}", src, e);
                            }
                        }
                        Err(e) => {
                            tracing::trace!("Heartbeat recv error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Heartbeat receiver stopped");
    }

    /// Decode one datagram and deliver it
    pub fn handle_datagram(&self, datagram: &[u8], src: SocketAddr) -> Result<()> {
        let packet = Packet::decode(datagram)?;

        if packet.heartbeat.cluster_id != self.cluster_id {
            return Err(Error::InvalidArgument(format!(
                "heartbeat for cluster {} (we are {})",
                packet.heartbeat.cluster_id, self.cluster_id
            )));
        }

        tracing::trace!(
            "Heartbeat from {} ({}, role {})",
            src,
            packet.heartbeat.sender_serial,
            packet.heartbeat.sender_role
        );

        self.peer_uptime.record(packet.uptime_secs);
        self.arbiter.receive(&packet.heartbeat)
    }

    /// Stop both loops
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Call `tick` on a fixed cadence until `shutdown` flips to true
pub async fn run_ticker(arbiter: Arc<ClusterArbiter>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!("Heartbeat ticker started ({:?})", period);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = arbiter.tick() {
                    tracing::error!("Heartbeat tick failed: {}", e);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Heartbeat ticker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::heartbeat::ChannelSender;
    use crate::plane::{LoggingNetworkPlane, RoleActuator};
    use crate::state::{BoundedSerial, ClusterRole, Collaborators};
    use chrono::Utc;

    struct StaticUptime(u64);

    impl UptimeSource for StaticUptime {
        fn local_uptime(&self) -> Duration {
            Duration::from_secs(self.0)
        }
        fn peer_uptime(&self) -> Duration {
            Duration::ZERO
        }
    }

    fn arbiter(tx: mpsc::Sender<HeartbeatMessage>) -> Arc<ClusterArbiter> {
        let arbiter = ClusterArbiter::new(Collaborators {
            actuator: RoleActuator::new(Arc::new(LoggingNetworkPlane)),
            sender: Arc::new(ChannelSender::new(tx)),
            uptime: Arc::new(StaticUptime(0)),
            clock: Arc::new(SystemClock),
        });
        Arc::new(arbiter)
    }

    fn packet(cluster_id: u32, role: ClusterRole) -> Vec<u8> {
        Packet::new(
            HeartbeatMessage {
                cluster_id,
                sender_role: role,
                sender_serial: BoundedSerial::new("SN2000"),
                timestamp: Utc::now(),
            },
            1234,
        )
        .encode()
        .unwrap()
    }

    async fn transport(cluster_id: u32) -> (HeartbeatTransport, Arc<ClusterArbiter>, Arc<PeerUptime>) {
        let (tx, _rx) = mpsc::channel(8);
        let arbiter = arbiter(tx);
        arbiter.init(cluster_id, "SN1000").unwrap();
        let peer_uptime = Arc::new(PeerUptime::new());
        let transport = HeartbeatTransport::bind(
            "127.0.0.1:0",
            "127.0.0.1:9",
            cluster_id,
            Arc::clone(&arbiter),
            Arc::new(StaticUptime(10)),
            Arc::clone(&peer_uptime),
        )
        .await
        .unwrap();
        (transport, arbiter, peer_uptime)
    }

    #[tokio::test]
    async fn test_datagram_delivered_to_arbiter() {
        let (transport, arbiter, peer_uptime) = transport(42).await;
        let src: SocketAddr = "127.0.0.1:7700".parse().unwrap();

        transport.handle_datagram(&packet(42, ClusterRole::Active), src).unwrap();

        let status = arbiter.get_status().unwrap();
        assert!(status.heartbeat_up);
        assert_eq!(status.peer_role, ClusterRole::Active);
        assert_eq!(status.peer_serial.as_str(), "SN2000");
        assert_eq!(peer_uptime.get(), Duration::from_secs(1234));
    }

    #[tokio::test]
    async fn test_foreign_cluster_dropped() {
        let (transport, arbiter, peer_uptime) = transport(42).await;
        let src: SocketAddr = "127.0.0.1:7700".parse().unwrap();

        let result = transport.handle_datagram(&packet(99, ClusterRole::Active), src);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(!arbiter.get_status().unwrap().heartbeat_up);
        assert_eq!(peer_uptime.get(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_garbage_dropped() {
        let (transport, arbiter, _) = transport(42).await;
        let src: SocketAddr = "127.0.0.1:7700".parse().unwrap();

        assert!(transport.handle_datagram(b"not a heartbeat", src).is_err());
        assert!(!arbiter.get_status().unwrap().heartbeat_up);
    }

    #[tokio::test]
    async fn test_two_nodes_exchange_heartbeats() {
        // Node A and node B on loopback, each pointed at the other
        let sock_a = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let sock_b = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr_a = sock_a.local_addr().unwrap().to_string();
        let addr_b = sock_b.local_addr().unwrap().to_string();
        drop(sock_a);
        drop(sock_b);

        let (tx_a, rx_a) = mpsc::channel(8);
        let arbiter_a = arbiter(tx_a);
        arbiter_a.init(42, "SN1000").unwrap();
        arbiter_a.force_role(ClusterRole::Active).unwrap();

        let (tx_b, _rx_b) = mpsc::channel(8);
        let arbiter_b = arbiter(tx_b);
        arbiter_b.init(42, "SN2000").unwrap();

        let node_a = Arc::new(
            HeartbeatTransport::bind(
                &addr_a,
                &addr_b,
                42,
                Arc::clone(&arbiter_a),
                Arc::new(StaticUptime(10)),
                Arc::new(PeerUptime::new()),
            )
            .await
            .unwrap(),
        );
        let node_b = Arc::new(
            HeartbeatTransport::bind(
                &addr_b,
                &addr_a,
                42,
                Arc::clone(&arbiter_b),
                Arc::new(StaticUptime(20)),
                Arc::new(PeerUptime::new()),
            )
            .await
            .unwrap(),
        );

        let a = Arc::clone(&node_a);
        tokio::spawn(async move { a.run_sender(rx_a).await });
        let b = Arc::clone(&node_b);
        tokio::spawn(async move { b.run_receiver().await });

        arbiter_a.tick().unwrap();

        let mut delivered = false;
        for _ in 0..50 {
            let status = arbiter_b.get_status().unwrap();
            if status.heartbeat_up {
                assert_eq!(status.peer_role, ClusterRole::Active);
                assert_eq!(status.peer_serial.as_str(), "SN1000");
                delivered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(delivered, "heartbeat never reached node B");

        node_a.stop();
        node_b.stop();
    }

    #[tokio::test]
    async fn test_ticker_stops_on_shutdown() {
        let (tx, mut rx) = mpsc::channel(64);
        let arbiter = arbiter(tx);
        arbiter.init(42, "SN1000").unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_ticker(Arc::clone(&arbiter), Duration::from_millis(10), stop_rx));

        // First interval tick fires immediately
        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(first.unwrap().cluster_id, 42);

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
