//! Bounded node identity
//!
//! Serial numbers are the default election key. They are capped at
//! [`BoundedSerial::MAX_LEN`] bytes; [`BoundedSerial::new`] truncates
//! silently (at a UTF-8 boundary) while [`BoundedSerial::try_new`] refuses
//! oversized input. Ordering is plain byte order.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Serial number bounded to 31 bytes
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct BoundedSerial(String);

impl BoundedSerial {
    /// Maximum number of bytes kept
    pub const MAX_LEN: usize = 31;

    /// Build a serial, truncating anything past `MAX_LEN` bytes
    pub fn new(serial: &str) -> Self {
        if serial.len() <= Self::MAX_LEN {
            return Self(serial.to_string());
        }

        let mut end = Self::MAX_LEN;
        while !serial.is_char_boundary(end) {
            end -= 1;
        }
        tracing::debug!(
            "Serial '{}' exceeds {} bytes, truncated to '{}'",
            serial,
            Self::MAX_LEN,
            &serial[..end]
        );
        Self(serial[..end].to_string())
    }

    /// Build a serial, failing instead of truncating
    pub fn try_new(serial: &str) -> Result<Self> {
        if serial.is_empty() {
            return Err(Error::InvalidArgument("serial cannot be empty".into()));
        }
        if serial.len() > Self::MAX_LEN {
            return Err(Error::InvalidArgument(format!(
                "serial '{}' is {} bytes, limit is {}",
                serial,
                serial.len(),
                Self::MAX_LEN
            )));
        }
        Ok(Self(serial.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for BoundedSerial {
    fn from(s: String) -> Self {
        if s.len() <= Self::MAX_LEN {
            Self(s)
        } else {
            Self::new(&s)
        }
    }
}

impl From<&str> for BoundedSerial {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<BoundedSerial> for String {
    fn from(serial: BoundedSerial) -> String {
        serial.0
    }
}

impl std::fmt::Display for BoundedSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_serial_kept() {
        let serial = BoundedSerial::new("SN1000");
        assert_eq!(serial.as_str(), "SN1000");
    }

    #[test]
    fn test_truncation() {
        let long = "X".repeat(40);
        let serial = BoundedSerial::new(&long);
        assert_eq!(serial.as_str().len(), BoundedSerial::MAX_LEN);

        // Multi-byte char straddling the limit is dropped whole
        let tricky = format!("{}é", "a".repeat(30));
        let serial = BoundedSerial::new(&tricky);
        assert_eq!(serial.as_str(), "a".repeat(30));
    }

    #[test]
    fn test_strict_constructor() {
        assert!(BoundedSerial::try_new("SN1").is_ok());
        assert!(matches!(BoundedSerial::try_new(""), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            BoundedSerial::try_new(&"9".repeat(32)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_byte_ordering() {
        assert!(BoundedSerial::new("SN2000") > BoundedSerial::new("SN1000"));
        assert!(BoundedSerial::new("SN1000") == BoundedSerial::new("SN1000"));
        assert!(BoundedSerial::new("SN10") < BoundedSerial::new("SN9"));
    }
}
