//! Pairguard Configuration
//!
//! This module provides configuration structures for a Pairguard node.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::state::{BoundedSerial, ClusterRole, ElectionPolicy, RecoveryMode};

/// Main Pairguard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairguardConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// HA pair configuration
    pub cluster: ClusterConfig,

    /// Forwarding resources owned by the active node
    #[serde(default)]
    pub network: NetworkConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Serial number, the default election key (truncated to 31 bytes)
    pub serial: String,

    /// UDP address to receive peer heartbeats on
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// UDP address of the peer
    pub peer_address: String,
}

/// HA pair configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Identifier shared by both nodes of the pair
    pub id: u32,

    /// Heartbeat interval in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Time without a peer heartbeat before it is declared lost
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Split-brain recovery (manual or automatic)
    #[serde(default)]
    pub split_brain_recovery: RecoveryMode,

    /// Tie-break used by automatic recovery
    #[serde(default)]
    pub election_policy: ElectionPolicy,

    /// Role taken right after startup (otherwise INIT until an operator decides)
    #[serde(default)]
    pub initial_role: Option<String>,
}

/// Network-plane configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Interface carrying the virtual IPs
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Virtual IPs in CIDR notation
    #[serde(default)]
    pub virtual_ips: Vec<String>,

    /// Log side effects instead of touching the system
    #[serde(default)]
    pub dry_run: bool,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log to file path (optional)
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:7700".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    1000
}

fn default_heartbeat_timeout_ms() -> u64 {
    3000
}

fn default_interface() -> String {
    "eth0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "127.0.0.1:7780".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            virtual_ips: Vec::new(),
            dry_run: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
            cors_enabled: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl PairguardConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: PairguardConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.serial.is_empty() {
            return Err(crate::Error::Config("node.serial cannot be empty".into()));
        }

        if self.node.serial.len() > BoundedSerial::MAX_LEN {
            tracing::warn!(
                "node.serial is longer than {} bytes and will be truncated",
                BoundedSerial::MAX_LEN
            );
        }

        if self.node.bind_address.is_empty() {
            return Err(crate::Error::Config("node.bind_address cannot be empty".into()));
        }

        if self.node.peer_address.is_empty() {
            return Err(crate::Error::Config("node.peer_address cannot be empty".into()));
        }

        if self.cluster.id == 0 {
            return Err(crate::Error::Config("cluster.id must be non-zero".into()));
        }

        if self.cluster.heartbeat_interval_ms == 0 {
            return Err(crate::Error::Config("cluster.heartbeat_interval_ms must be positive".into()));
        }

        if self.cluster.heartbeat_timeout_ms <= self.cluster.heartbeat_interval_ms {
            return Err(crate::Error::Config(format!(
                "cluster.heartbeat_timeout_ms ({}) must exceed heartbeat_interval_ms ({})",
                self.cluster.heartbeat_timeout_ms, self.cluster.heartbeat_interval_ms
            )));
        }

        self.initial_role()?;

        if !self.network.dry_run && self.network.virtual_ips.is_empty() {
            tracing::warn!("network.virtual_ips is empty, role changes will not move any address");
        }

        Ok(())
    }

    /// Parsed `cluster.initial_role`
    pub fn initial_role(&self) -> crate::Result<Option<ClusterRole>> {
        match self.cluster.initial_role.as_deref() {
            None => Ok(None),
            Some(name) => match ClusterRole::parse(name) {
                Ok(role @ (ClusterRole::Active | ClusterRole::Standby)) => Ok(Some(role)),
                _ => Err(crate::Error::Config(format!(
                    "cluster.initial_role must be 'active' or 'standby', got '{}'",
                    name
                ))),
            },
        }
    }

    /// Get heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.cluster.heartbeat_interval_ms)
    }

    /// Get heartbeat timeout as Duration
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.cluster.heartbeat_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[node]
serial = "SN1000"
bind_address = "0.0.0.0:7700"
peer_address = "10.0.0.2:7700"

[cluster]
id = 42
split_brain_recovery = "automatic"
election_policy = "uptime"
initial_role = "standby"

[network]
interface = "bond0"
virtual_ips = ["10.0.0.100/24"]
"#;

    #[test]
    fn test_parse_config() {
        let config = PairguardConfig::from_str(SAMPLE).unwrap();
        assert_eq!(config.node.serial, "SN1000");
        assert_eq!(config.cluster.id, 42);
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(1000));
        assert_eq!(config.heartbeat_timeout(), Duration::from_millis(3000));
        assert!(config.cluster.split_brain_recovery.is_automatic());
        assert_eq!(config.cluster.election_policy, ElectionPolicy::Uptime);
        assert_eq!(config.initial_role().unwrap(), Some(ClusterRole::Standby));
        assert_eq!(config.network.interface, "bond0");
        assert!(config.api.enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_defaults() {
        let toml = r#"
[node]
serial = "SN1"
peer_address = "10.0.0.2:7700"

[cluster]
id = 1
"#;
        let config = PairguardConfig::from_str(toml).unwrap();
        assert_eq!(config.node.bind_address, "0.0.0.0:7700");
        assert_eq!(config.cluster.split_brain_recovery, RecoveryMode::Manual);
        assert_eq!(config.cluster.election_policy, ElectionPolicy::SerialNumber);
        assert_eq!(config.initial_role().unwrap(), None);
    }

    #[test]
    fn test_validation_failures() {
        let zero_id = SAMPLE.replace("id = 42", "id = 0");
        assert!(matches!(PairguardConfig::from_str(&zero_id), Err(crate::Error::Config(_))));

        let bad_timeout = SAMPLE.replace("id = 42", "id = 42\nheartbeat_timeout_ms = 500");
        assert!(matches!(PairguardConfig::from_str(&bad_timeout), Err(crate::Error::Config(_))));

        let bad_role = SAMPLE.replace("\"standby\"", "\"split\"");
        assert!(matches!(PairguardConfig::from_str(&bad_role), Err(crate::Error::Config(_))));

        let bad_policy = SAMPLE.replace("\"uptime\"", "\"coin-flip\"");
        assert!(matches!(PairguardConfig::from_str(&bad_policy), Err(crate::Error::ConfigParse(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = PairguardConfig::from_file(file.path()).unwrap();
        assert_eq!(config.node.peer_address, "10.0.0.2:7700");

        let missing = PairguardConfig::from_file(std::path::Path::new("/nonexistent/pairguard.toml"));
        assert!(matches!(missing, Err(crate::Error::Io(_))));
    }
}
