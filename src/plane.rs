//! Network-plane side effects
//!
//! Virtual IP ownership and forwarding-table state follow the local role.
//! Every call here is best-effort and idempotent: a failure is logged and
//! the role bookkeeping carries on as if it had succeeded.

use std::sync::Arc;

use crate::config::NetworkConfig;

/// Forwarding resources controlled by the active node
pub trait NetworkPlane: Send + Sync {
    fn activate_virtual_ips(&self);
    fn release_virtual_ips(&self);
    fn activate_forwarding_tables(&self);
    fn flush_forwarding_tables(&self);
}

/// Applies the side effects of a role change
#[derive(Clone)]
pub struct RoleActuator {
    plane: Arc<dyn NetworkPlane>,
}

impl RoleActuator {
    pub fn new(plane: Arc<dyn NetworkPlane>) -> Self {
        Self { plane }
    }

    /// Take ownership of forwarding (becoming ACTIVE)
    pub fn activate(&self) {
        tracing::info!("Activating virtual IPs and forwarding tables");
        self.plane.activate_virtual_ips();
        self.plane.activate_forwarding_tables();
    }

    /// Give up forwarding (becoming STANDBY)
    pub fn release(&self) {
        tracing::info!("Releasing virtual IPs and flushing forwarding tables");
        self.plane.release_virtual_ips();
        self.plane.flush_forwarding_tables();
    }
}

/// Plane that only logs, for dry runs and lab setups
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNetworkPlane;

impl NetworkPlane for LoggingNetworkPlane {
    fn activate_virtual_ips(&self) {
        tracing::info!("[dry-run] activate virtual IPs");
    }

    fn release_virtual_ips(&self) {
        tracing::info!("[dry-run] release virtual IPs");
    }

    fn activate_forwarding_tables(&self) {
        tracing::info!("[dry-run] activate forwarding tables");
    }

    fn flush_forwarding_tables(&self) {
        tracing::info!("[dry-run] flush forwarding tables");
    }
}

/// Plane driven through iproute2 and arping on a single interface
#[derive(Debug, Clone)]
pub struct IpNetworkPlane {
    interface: String,
    virtual_ips: Vec<String>,
}

impl IpNetworkPlane {
    pub fn new(interface: String, virtual_ips: Vec<String>) -> Self {
        Self { interface, virtual_ips }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(config.interface.clone(), config.virtual_ips.clone())
    }

    /// Address without prefix length, as arping wants it
    fn bare_address(vip: &str) -> &str {
        vip.split('/').next().unwrap_or(vip)
    }

    fn run(&self, program: &str, args: &[&str]) {
        match std::process::Command::new(program).args(args).output() {
            Ok(output) if output.status.success() => {
                tracing::debug!("{} {} ok", program, args.join(" "));
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                tracing::warn!(
                    "{} {} failed ({}): {}",
                    program,
                    args.join(" "),
                    output.status,
                    stderr.trim()
                );
            }
            Err(e) => {
                tracing::warn!("Could not run {}: {}", program, e);
            }
        }
    }
}

impl NetworkPlane for IpNetworkPlane {
    fn activate_virtual_ips(&self) {
        for vip in &self.virtual_ips {
            self.run("ip", &["addr", "add", vip, "dev", &self.interface]);
        }
    }

    fn release_virtual_ips(&self) {
        for vip in &self.virtual_ips {
            self.run("ip", &["addr", "del", vip, "dev", &self.interface]);
        }
    }

    fn activate_forwarding_tables(&self) {
        // Gratuitous ARP so neighbours repoint their MAC tables at us
        for vip in &self.virtual_ips {
            let addr = Self::bare_address(vip);
            self.run("arping", &["-U", "-c", "1", "-I", &self.interface, addr]);
        }
    }

    fn flush_forwarding_tables(&self) {
        self.run("ip", &["neigh", "flush", "dev", &self.interface]);
    }
}
