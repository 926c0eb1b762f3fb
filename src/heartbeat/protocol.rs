//! Heartbeat Wire Protocol
//!
//! A datagram is an 8-byte frame header (length, crc32) followed by a
//! bincode-encoded [`Packet`]. Encryption and authentication are left to
//! the link.

use serde::{Deserialize, Serialize};

use super::HeartbeatMessage;
use crate::error::{Error, Result};

/// Largest datagram we are willing to parse
pub const MAX_DATAGRAM: usize = 512;

/// What actually travels between the nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub heartbeat: HeartbeatMessage,
    /// Sender's host uptime, for the uptime election policy
    pub uptime_secs: u64,
}

impl Packet {
    pub fn new(heartbeat: HeartbeatMessage, uptime_secs: u64) -> Self {
        Self { heartbeat, uptime_secs }
    }

    /// Serialize into a framed datagram
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)?;
        let header = FrameHeader::new(&body);

        let mut datagram = Vec::with_capacity(FrameHeader::SIZE + body.len());
        datagram.extend_from_slice(&header.to_bytes());
        datagram.extend_from_slice(&body);
        Ok(datagram)
    }

    /// Parse a framed datagram, verifying length and checksum
    pub fn decode(datagram: &[u8]) -> Result<Self> {
        if datagram.len() < FrameHeader::SIZE {
            return Err(Error::Network(format!(
                "Datagram too short: {} bytes",
                datagram.len()
            )));
        }

        let (head, body) = datagram.split_at(FrameHeader::SIZE);
        let header = FrameHeader::from_slice(head);

        if header.length as usize != body.len() {
            return Err(Error::Network(format!(
                "Frame length mismatch: header says {}, got {}",
                header.length,
                body.len()
            )));
        }

        if crc32fast::hash(body) != header.checksum {
            return Err(Error::Network("Heartbeat checksum mismatch".into()));
        }

        Ok(bincode::deserialize(body)?)
    }
}

/// Frame header for length-prefixed datagrams
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Body length
    pub length: u32,
    /// Body checksum
    pub checksum: u32,
}

impl FrameHeader {
    /// Header size in bytes
    pub const SIZE: usize = 8;

    pub fn new(data: &[u8]) -> Self {
        Self {
            length: data.len() as u32,
            checksum: crc32fast::hash(data),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Read a header from the first `SIZE` bytes of `bytes`
    fn from_slice(bytes: &[u8]) -> Self {
        let mut length = [0u8; 4];
        let mut checksum = [0u8; 4];
        length.copy_from_slice(&bytes[0..4]);
        checksum.copy_from_slice(&bytes[4..8]);
        Self {
            length: u32::from_le_bytes(length),
            checksum: u32::from_le_bytes(checksum),
        }
    }
}
