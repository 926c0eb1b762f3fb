//! Split-Brain Resolution
//!
//! Runs inside a tick, with the cluster lock already held, once both nodes
//! have been seen claiming ACTIVE. Each node evaluates the same comparison
//! independently; the designated loser demotes itself and the winner waits
//! for the peer to do the same. There is no fallback when the comparison
//! is a tie: both nodes stay ACTIVE and the split flag stays raised.

use std::cmp::Ordering;

use crate::plane::RoleActuator;
use crate::state::cluster::ClusterState;
use crate::state::{ClusterRole, ElectionPolicy};
use crate::uptime::UptimeSource;

/// Outcome of one resolver pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Local node lost the tie-break and is now STANDBY
    Demoted,
    /// Local node stays ACTIVE and waits for the peer to yield
    RemainsActive,
    /// Local node was not ACTIVE, nothing to give up
    NotActive,
    /// No split-brain outstanding, nothing was evaluated
    NoSplit,
}

/// Whether the local node is the one that has to yield under `policy`
pub fn local_must_yield(state: &ClusterState, policy: ElectionPolicy, uptime: &dyn UptimeSource) -> bool {
    match policy {
        // Greater serial yields; equal serials leave both sides ACTIVE
        ElectionPolicy::SerialNumber => {
            state.local_serial.as_bytes().cmp(state.peer_serial.as_bytes()) == Ordering::Greater
        }
        // More recently booted node yields
        ElectionPolicy::Uptime => uptime.local_uptime() < uptime.peer_uptime(),
    }
}

/// Apply the configured election policy to a dual-active state
pub(crate) fn auto_resolve(
    state: &mut ClusterState,
    actuator: &RoleActuator,
    uptime: &dyn UptimeSource,
) -> Resolution {
    let policy = state.election_policy;
    tracing::info!("Auto-resolving split-brain using policy: {}", policy);

    if state.local_role != ClusterRole::Active {
        tracing::debug!(
            "Local node already {}, nothing to demote",
            state.local_role
        );
        return Resolution::NotActive;
    }

    if !local_must_yield(state, policy, uptime) {
        tracing::info!(
            "Local node remains ACTIVE under {} policy (serial: {}, peer: {}). Waiting for peer to demote.",
            policy,
            state.local_serial,
            state.peer_serial
        );
        return Resolution::RemainsActive;
    }

    match policy {
        ElectionPolicy::SerialNumber => tracing::warn!(
            "Auto-demoting local node to STANDBY (serial: {} > peer: {})",
            state.local_serial,
            state.peer_serial
        ),
        ElectionPolicy::Uptime => tracing::warn!(
            "Auto-demoting local node to STANDBY (uptime {:?} < peer {:?})",
            uptime.local_uptime(),
            uptime.peer_uptime()
        ),
    }

    state.local_role = ClusterRole::Standby;
    actuator.release();
    state.split_brain_detected = false;

    Resolution::Demoted
}
