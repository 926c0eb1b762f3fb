//! Uptime sources for the uptime election policy

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sysinfo::System;

/// Local and peer uptime, consulted only by the uptime election policy
pub trait UptimeSource: Send + Sync {
    fn local_uptime(&self) -> Duration;
    fn peer_uptime(&self) -> Duration;
}

/// Host uptime as reported by the OS
pub fn host_uptime() -> Duration {
    Duration::from_secs(System::uptime())
}

/// Last uptime advertised by the peer in its heartbeats
#[derive(Debug, Default)]
pub struct PeerUptime {
    secs: AtomicU64,
}

impl PeerUptime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the value carried by an inbound heartbeat
    pub fn record(&self, uptime_secs: u64) {
        self.secs.store(uptime_secs, Ordering::Relaxed);
    }

    pub fn get(&self) -> Duration {
        Duration::from_secs(self.secs.load(Ordering::Relaxed))
    }
}

/// Host uptime paired with the peer's advertised uptime
#[derive(Debug, Clone)]
pub struct SystemUptime {
    peer: Arc<PeerUptime>,
}

impl SystemUptime {
    pub fn new(peer: Arc<PeerUptime>) -> Self {
        Self { peer }
    }
}

impl UptimeSource for SystemUptime {
    fn local_uptime(&self) -> Duration {
        host_uptime()
    }

    fn peer_uptime(&self) -> Duration {
        // Zero until the first heartbeat arrives
        self.peer.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_uptime_tracking() {
        let peer = Arc::new(PeerUptime::new());
        let source = SystemUptime::new(peer.clone());
        assert_eq!(source.peer_uptime(), Duration::ZERO);

        peer.record(86_400);
        assert_eq!(source.peer_uptime(), Duration::from_secs(86_400));
    }
}
