//! Pairguard - Failover Arbitration for HA Appliance Pairs
//!
//! Decides which node of a two-node high-availability pair forwards
//! traffic (ACTIVE) and which waits (STANDBY), working only from
//! heartbeats that can be lost, delayed or race with operator commands.
//!
//! # Architecture
//!
//! A [`ClusterArbiter`](state::ClusterArbiter) owns the node's cluster state
//! behind a single lock. A periodic tick evaluates peer liveness, promotes a
//! standby whose peer went silent, and detects split-brain (both nodes
//! ACTIVE). Inbound heartbeats refresh what is known about the peer.
//! Operators can force a role at any time, which always clears an
//! outstanding split-brain.
//!
//! # Features
//!
//! - Standby-to-active failover on heartbeat loss
//! - Edge-triggered split-brain detection
//! - Optional automatic resolution by serial number or uptime
//! - UDP heartbeat transport with checksummed framing
//! - Virtual IP and forwarding-table control through iproute2
//! - HTTP API for status and operator overrides

pub mod config;
pub mod error;
pub mod clock;
pub mod state;
pub mod heartbeat;
pub mod plane;
pub mod uptime;
pub mod api;

pub use config::PairguardConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::PairguardConfig;
    pub use crate::error::{Error, Result};
    pub use crate::clock::{Clock, SystemClock, ManualClock};
    pub use crate::state::{
        BoundedSerial, ClusterArbiter, ClusterRole, ClusterStatus, Collaborators, ElectionPolicy,
    };
    pub use crate::heartbeat::{HeartbeatMessage, HeartbeatSender};
    pub use crate::plane::{NetworkPlane, RoleActuator};
    pub use crate::uptime::UptimeSource;
}
