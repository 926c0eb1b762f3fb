//! Heartbeat Module
//!
//! Messages exchanged between the two nodes of a pair, the outbound
//! sender seam used by the arbiter, and the UDP transport.

pub mod protocol;
mod transport;

pub use protocol::{Packet, FrameHeader};
pub use transport::{HeartbeatTransport, run_ticker};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::state::{BoundedSerial, ClusterRole};

/// One heartbeat, sent every tick and consumed on receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    pub cluster_id: u32,
    pub sender_role: ClusterRole,
    pub sender_serial: BoundedSerial,
    /// Wall-clock seconds
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

/// Outbound heartbeat path
///
/// Called with the cluster lock held; implementations must not block.
pub trait HeartbeatSender: Send + Sync {
    fn send(&self, msg: HeartbeatMessage);
}

/// Sender that hands heartbeats to the transport task through a channel
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<HeartbeatMessage>,
}

impl ChannelSender {
    pub fn new(tx: mpsc::Sender<HeartbeatMessage>) -> Self {
        Self { tx }
    }
}

impl HeartbeatSender for ChannelSender {
    fn send(&self, msg: HeartbeatMessage) {
        // A full queue drops this beat
        if let Err(e) = self.tx.try_send(msg) {
            tracing::debug!("Heartbeat dropped before transport: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sender_never_blocks() {
        let (tx, mut rx) = mpsc::channel(1);
        let sender = ChannelSender::new(tx);

        let msg = HeartbeatMessage {
            cluster_id: 7,
            sender_role: ClusterRole::Active,
            sender_serial: BoundedSerial::new("SN1000"),
            timestamp: Utc::now(),
        };

        sender.send(msg.clone());
        // Queue is full now; this one is dropped instead of waiting
        sender.send(msg.clone());

        assert_eq!(rx.recv().await.unwrap(), msg);
        assert!(rx.try_recv().is_err());
    }
}
