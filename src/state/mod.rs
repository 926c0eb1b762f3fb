//! State Management Module
//!
//! The role state machine of a node: roles, bounded identities, the
//! lock-guarded cluster state and split-brain resolution.

mod role;
mod serial;
mod cluster;
pub mod election;

pub use role::{ClusterRole, ElectionPolicy, RecoveryMode};
pub use serial::BoundedSerial;
pub use cluster::{
    ClusterArbiter, ClusterState, ClusterStatus, Collaborators,
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT,
};
pub use election::Resolution;
