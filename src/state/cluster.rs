//! Cluster State Arbitration
//!
//! Owns the single [`ClusterState`] of a node and mediates every access to
//! it through one mutex. The role fields, the liveness flag and the
//! split-brain flag are only meaningful together, so each public operation
//! holds the lock for its whole duration, including the side effects it
//! triggers, and nothing outside the lock ever sees a half-applied change.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::heartbeat::{HeartbeatMessage, HeartbeatSender};
use crate::plane::RoleActuator;
use crate::state::election::{self, Resolution};
use crate::state::{BoundedSerial, ClusterRole, ElectionPolicy};
use crate::uptime::UptimeSource;

/// Default time without a peer heartbeat before it is declared lost
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Recommended tick cadence
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);

/// Decision state of one node
#[derive(Debug, Clone)]
pub struct ClusterState {
    pub(crate) cluster_id: u32,
    pub(crate) local_role: ClusterRole,
    pub(crate) peer_role: ClusterRole,
    pub(crate) heartbeat_up: bool,
    pub(crate) last_heartbeat_rx: Option<DateTime<Utc>>,
    pub(crate) last_heartbeat_tx: Option<DateTime<Utc>>,
    pub(crate) local_serial: BoundedSerial,
    pub(crate) peer_serial: BoundedSerial,
    pub(crate) split_brain_detected: bool,
    pub(crate) auto_recovery_enabled: bool,
    pub(crate) election_policy: ElectionPolicy,
}

impl ClusterState {
    /// Fresh state: both roles INIT, no heartbeat, manual recovery, serial policy
    pub fn new(cluster_id: u32, local_serial: BoundedSerial) -> Self {
        Self {
            cluster_id,
            local_role: ClusterRole::Init,
            peer_role: ClusterRole::Init,
            heartbeat_up: false,
            last_heartbeat_rx: None,
            last_heartbeat_tx: None,
            local_serial,
            peer_serial: BoundedSerial::default(),
            split_brain_detected: false,
            auto_recovery_enabled: false,
            election_policy: ElectionPolicy::SerialNumber,
        }
    }

    fn both_active(&self) -> bool {
        self.local_role == ClusterRole::Active && self.peer_role == ClusterRole::Active
    }

    fn snapshot(&self) -> ClusterStatus {
        ClusterStatus {
            cluster_id: self.cluster_id,
            local_role: self.local_role,
            peer_role: self.peer_role,
            heartbeat_up: self.heartbeat_up,
            split_brain_detected: self.split_brain_detected,
            last_heartbeat_rx: self.last_heartbeat_rx,
            last_heartbeat_tx: self.last_heartbeat_tx,
            local_serial: self.local_serial.clone(),
            peer_serial: self.peer_serial.clone(),
            auto_recovery_enabled: self.auto_recovery_enabled,
            election_policy: self.election_policy,
        }
    }
}

/// Point-in-time copy of the cluster state, for show commands and the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub cluster_id: u32,
    pub local_role: ClusterRole,
    pub peer_role: ClusterRole,
    pub heartbeat_up: bool,
    pub split_brain_detected: bool,
    pub last_heartbeat_rx: Option<DateTime<Utc>>,
    pub last_heartbeat_tx: Option<DateTime<Utc>>,
    pub local_serial: BoundedSerial,
    pub peer_serial: BoundedSerial,
    pub auto_recovery_enabled: bool,
    pub election_policy: ElectionPolicy,
}

/// External services the arbiter drives
#[derive(Clone)]
pub struct Collaborators {
    pub actuator: RoleActuator,
    pub sender: Arc<dyn HeartbeatSender>,
    pub uptime: Arc<dyn UptimeSource>,
    pub clock: Arc<dyn Clock>,
}

/// Failover arbiter for one node of an HA pair
pub struct ClusterArbiter {
    /// `None` until `init` runs
    state: Mutex<Option<ClusterState>>,
    /// Peer liveness window
    heartbeat_timeout: Duration,
    collaborators: Collaborators,
}

impl ClusterArbiter {
    /// Create an arbiter; it rejects every operation until [`init`](Self::init)
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            state: Mutex::new(None),
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            collaborators,
        }
    }

    /// Override the liveness timeout
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Run `f` on the state with the lock held
    fn with_state<T>(&self, f: impl FnOnce(&mut ClusterState) -> Result<T>) -> Result<T> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| Error::Internal("cluster state lock poisoned".into()))?;
        let state = guard.as_mut().ok_or(Error::NotInitialized)?;
        f(state)
    }

    /// Reset all state for `cluster_id`
    ///
    /// Calling this again discards everything, including a role already
    /// taken and any configured recovery settings.
    pub fn init(&self, cluster_id: u32, local_serial: &str) -> Result<()> {
        let serial = BoundedSerial::new(local_serial);
        let mut guard = self
            .state
            .lock()
            .map_err(|_| Error::Internal("cluster state lock poisoned".into()))?;

        if guard.is_some() {
            tracing::warn!("Cluster {} re-initialized, previous state discarded", cluster_id);
        }
        *guard = Some(ClusterState::new(cluster_id, serial.clone()));

        tracing::info!("Cluster {} initialized. Local serial: {}", cluster_id, serial);
        Ok(())
    }

    /// Periodic heartbeat processing
    ///
    /// Declares the peer lost once the liveness window has passed, promotes
    /// a STANDBY node that lost its peer, raises the split-brain flag on the
    /// transition into dual-ACTIVE (optionally resolving it), and always
    /// emits one outbound heartbeat.
    pub fn tick(&self) -> Result<()> {
        self.with_state(|state| {
            let now = self.collaborators.clock.now();

            if let (true, Some(last_rx)) = (state.heartbeat_up, state.last_heartbeat_rx) {
                let ms_since_rx = now.signed_duration_since(last_rx).num_milliseconds();

                if ms_since_rx > self.heartbeat_timeout.as_millis() as i64 {
                    tracing::warn!("Heartbeat lost (last rx: {} ms ago)", ms_since_rx);
                    state.heartbeat_up = false;

                    // A standby cannot tell a dead peer from a dead link; it assumes the former
                    if state.local_role == ClusterRole::Standby {
                        tracing::warn!(
                            "STANDBY node lost heartbeat. Assuming ACTIVE node failed. Promoting to ACTIVE."
                        );
                        state.local_role = ClusterRole::Active;
                        self.collaborators.actuator.activate();
                    }
                }
            }

            if state.both_active() && !state.split_brain_detected {
                tracing::error!(
                    "CLUSTER SPLIT-BRAIN DETECTED: Both nodes active! Cluster ID: {}",
                    state.cluster_id
                );
                state.split_brain_detected = true;

                if state.auto_recovery_enabled {
                    let resolution = election::auto_resolve(
                        state,
                        &self.collaborators.actuator,
                        self.collaborators.uptime.as_ref(),
                    );
                    tracing::debug!("Split-brain resolution: {:?}", resolution);
                }
            }

            self.collaborators.sender.send(HeartbeatMessage {
                cluster_id: state.cluster_id,
                sender_role: state.local_role,
                sender_serial: state.local_serial.clone(),
                timestamp: now,
            });
            state.last_heartbeat_tx = Some(now);

            Ok(())
        })
    }

    /// Process a heartbeat from the peer
    ///
    /// Refreshes liveness and the peer's role and serial. Never changes the
    /// local role and never clears the split-brain flag.
    pub fn receive(&self, msg: &HeartbeatMessage) -> Result<()> {
        self.with_state(|state| {
            if !msg.sender_role.is_assignable() {
                tracing::warn!(
                    "Ignoring heartbeat from {} carrying role {}",
                    msg.sender_serial,
                    msg.sender_role
                );
                return Err(Error::InvalidArgument(format!(
                    "peer role {} cannot be stored",
                    msg.sender_role
                )));
            }

            state.last_heartbeat_rx = Some(self.collaborators.clock.now());
            if !state.heartbeat_up {
                tracing::info!("Heartbeat from peer {} is up", msg.sender_serial);
            }
            state.heartbeat_up = true;
            if state.peer_role != msg.sender_role {
                tracing::info!("Peer role changed: {} -> {}", state.peer_role, msg.sender_role);
            }
            state.peer_role = msg.sender_role;
            state.peer_serial = msg.sender_serial.clone();

            if state.split_brain_detected {
                tracing::info!(
                    "Heartbeat restored during split-brain. Manual or auto recovery can proceed."
                );
            }

            Ok(())
        })
    }

    /// Operator override of the local role
    ///
    /// Applies the matching side effect unconditionally and always clears
    /// the split-brain flag. Only ACTIVE and STANDBY are accepted.
    pub fn force_role(&self, role: ClusterRole) -> Result<()> {
        self.with_state(|state| {
            match role {
                ClusterRole::Active => {
                    tracing::warn!("Forcing role to ACTIVE (operator command)");
                    self.collaborators.actuator.activate();
                }
                ClusterRole::Standby => {
                    tracing::warn!("Forcing role to STANDBY (operator command)");
                    self.collaborators.actuator.release();
                }
                ClusterRole::Init | ClusterRole::Split => {
                    return Err(Error::InvalidArgument(format!(
                        "cannot force role {}, expected ACTIVE or STANDBY",
                        role
                    )));
                }
            }

            state.local_role = role;
            state.split_brain_detected = false;
            Ok(())
        })
    }

    /// Consistent snapshot of the current state
    pub fn get_status(&self) -> Result<ClusterStatus> {
        self.with_state(|state| Ok(state.snapshot()))
    }

    /// Enable or disable automatic split-brain resolution
    pub fn set_auto_recovery(&self, enabled: bool) -> Result<()> {
        self.with_state(|state| {
            if state.auto_recovery_enabled != enabled {
                tracing::info!(
                    "Split-brain recovery set to {}",
                    if enabled { "automatic" } else { "manual" }
                );
            }
            state.auto_recovery_enabled = enabled;
            Ok(())
        })
    }

    /// Select the tie-break used by automatic resolution
    pub fn set_election_policy(&self, policy: ElectionPolicy) -> Result<()> {
        self.with_state(|state| {
            if state.election_policy != policy {
                tracing::info!("Election policy set to {}", policy);
            }
            state.election_policy = policy;
            Ok(())
        })
    }

    /// Run the resolver once against an outstanding split-brain
    ///
    /// Only a tick triggers resolution in normal operation; this exists so
    /// tooling can re-evaluate an outstanding split. Without one it returns
    /// [`Resolution::NoSplit`] and touches nothing.
    pub fn resolve_now(&self) -> Result<Resolution> {
        self.with_state(|state| {
            if !state.split_brain_detected {
                tracing::info!("Resolve requested with no split-brain outstanding, ignoring");
                return Ok(Resolution::NoSplit);
            }

            Ok(election::auto_resolve(
                state,
                &self.collaborators.actuator,
                self.collaborators.uptime.as_ref(),
            ))
        })
    }
}
