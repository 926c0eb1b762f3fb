//! Cluster roles and election policy

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Role of a node in the HA pair
///
/// Travels on the wire as a single byte and as a lowercase name in JSON and
/// TOML. `Split` is an overlay value that can be encoded but is never
/// stored as a local or peer role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterRole {
    /// No role established yet
    Init = 0,
    /// Forwarding traffic
    Active = 1,
    /// Passive, ready to take over
    Standby = 2,
    /// Both nodes active (error overlay)
    Split = 3,
}

impl ClusterRole {
    /// Whether this value may be held in a role field
    pub fn is_assignable(self) -> bool {
        !matches!(self, ClusterRole::Split)
    }

    pub fn name(self) -> &'static str {
        match self {
            ClusterRole::Init => "init",
            ClusterRole::Active => "active",
            ClusterRole::Standby => "standby",
            ClusterRole::Split => "split",
        }
    }

    /// Parse an operator-supplied role name
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "init" => Ok(ClusterRole::Init),
            "active" => Ok(ClusterRole::Active),
            "standby" => Ok(ClusterRole::Standby),
            "split" => Ok(ClusterRole::Split),
            other => Err(Error::InvalidArgument(format!("unknown cluster role '{}'", other))),
        }
    }
}

impl From<ClusterRole> for u8 {
    fn from(role: ClusterRole) -> u8 {
        role as u8
    }
}

impl TryFrom<u8> for ClusterRole {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ClusterRole::Init),
            1 => Ok(ClusterRole::Active),
            2 => Ok(ClusterRole::Standby),
            3 => Ok(ClusterRole::Split),
            other => Err(Error::InvalidArgument(format!("invalid role byte {}", other))),
        }
    }
}

impl Serialize for ClusterRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(self.name())
        } else {
            serializer.serialize_u8(u8::from(*self))
        }
    }
}

impl<'de> Deserialize<'de> for ClusterRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let name = String::deserialize(deserializer)?;
            ClusterRole::parse(&name).map_err(D::Error::custom)
        } else {
            let byte = u8::deserialize(deserializer)?;
            ClusterRole::try_from(byte).map_err(D::Error::custom)
        }
    }
}

impl std::fmt::Display for ClusterRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterRole::Init => write!(f, "INIT"),
            ClusterRole::Active => write!(f, "ACTIVE"),
            ClusterRole::Standby => write!(f, "STANDBY"),
            ClusterRole::Split => write!(f, "SPLIT"),
        }
    }
}

/// Tie-break used when both nodes claim ACTIVE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElectionPolicy {
    /// The node with the greater serial demotes itself
    #[default]
    SerialNumber,
    /// The node with the lower uptime demotes itself
    Uptime,
}

impl std::fmt::Display for ElectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElectionPolicy::SerialNumber => write!(f, "serial-number"),
            ElectionPolicy::Uptime => write!(f, "uptime"),
        }
    }
}

impl std::str::FromStr for ElectionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial-number" | "serial" => Ok(ElectionPolicy::SerialNumber),
            "uptime" => Ok(ElectionPolicy::Uptime),
            other => Err(Error::InvalidArgument(format!("unknown election policy '{}'", other))),
        }
    }
}

/// Split-brain recovery mode as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMode {
    /// Detect and log only
    #[default]
    Manual,
    /// Run the resolver on detection
    Automatic,
}

impl RecoveryMode {
    pub fn is_automatic(self) -> bool {
        self == RecoveryMode::Automatic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_bytes() {
        assert_eq!(u8::from(ClusterRole::Init), 0);
        assert_eq!(u8::from(ClusterRole::Active), 1);
        assert_eq!(u8::from(ClusterRole::Standby), 2);
        assert_eq!(u8::from(ClusterRole::Split), 3);

        assert_eq!(ClusterRole::try_from(2).unwrap(), ClusterRole::Standby);
        assert!(matches!(ClusterRole::try_from(9), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_json_uses_names() {
        assert_eq!(serde_json::to_string(&ClusterRole::Standby).unwrap(), "\"standby\"");
        let role: ClusterRole = serde_json::from_str("\"active\"").unwrap();
        assert_eq!(role, ClusterRole::Active);
        assert!(serde_json::from_str::<ClusterRole>("\"leader\"").is_err());
    }

    #[test]
    fn test_split_is_not_assignable() {
        assert!(ClusterRole::Active.is_assignable());
        assert!(ClusterRole::Init.is_assignable());
        assert!(!ClusterRole::Split.is_assignable());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(ClusterRole::parse("Active").unwrap(), ClusterRole::Active);
        assert_eq!(ClusterRole::parse(" standby ").unwrap(), ClusterRole::Standby);
        assert!(ClusterRole::parse("leader").is_err());

        assert_eq!("uptime".parse::<ElectionPolicy>().unwrap(), ElectionPolicy::Uptime);
        assert_eq!("serial-number".parse::<ElectionPolicy>().unwrap(), ElectionPolicy::SerialNumber);
        assert!("coin-flip".parse::<ElectionPolicy>().is_err());
        assert_eq!(ElectionPolicy::Uptime.to_string(), "uptime");
    }
}
