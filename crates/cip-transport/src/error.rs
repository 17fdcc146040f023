use crate::AttributePath;
use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("disconnected: {0}")]
    Disconnected(String),
    #[error("attribute {path}: {} (status 0x{status:02X})", status_text(.status))]
    Attribute { path: AttributePath, status: u8 },
    #[error("timeout")]
    Timeout,
}

impl TransportError {
    /// Connection-level failures end the device session; everything else is
    /// scoped to the single request that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Connect(_) | TransportError::Disconnected(_)
        )
    }
}

fn status_text(status: &u8) -> &'static str {
    general_status_text(*status)
}

/// Text for a CIP general status code.
pub fn general_status_text(status: u8) -> &'static str {
    match status {
        0x00 => "success",
        0x01 => "connection failure",
        0x02 => "resource unavailable",
        0x03 => "invalid parameter value",
        0x04 => "path segment error",
        0x05 => "path destination unknown",
        0x06 => "partial transfer",
        0x07 => "connection lost",
        0x08 => "service not supported",
        0x09 => "invalid attribute value",
        0x0A => "attribute list error",
        0x0B => "already in requested mode/state",
        0x0C => "object state conflict",
        0x0D => "object already exists",
        0x0E => "attribute not settable",
        0x0F => "privilege violation",
        0x10 => "device state conflict",
        0x11 => "reply data too large",
        0x12 => "fragmentation of a primitive value",
        0x13 => "not enough data",
        0x14 => "attribute not supported",
        0x15 => "too much data",
        0x16 => "object does not exist",
        0x17 => "service fragmentation sequence not in progress",
        0x18 => "no stored attribute data",
        0x19 => "store operation failure",
        0x1A => "routing failure, request packet too large",
        0x1B => "routing failure, response packet too large",
        0x1C => "missing attribute list entry data",
        0x1D => "invalid attribute value list",
        0x1E => "embedded service error",
        0x1F => "vendor specific error",
        0x20 => "invalid parameter",
        0x21 => "write-once value or medium already written",
        0x22 => "invalid reply received",
        0x23 => "buffer overflow",
        0x24 => "invalid message format",
        0x25 => "key failure in path",
        0x26 => "path size invalid",
        0x27 => "unexpected attribute in list",
        0x28 => "invalid member ID",
        0x29 => "member not settable",
        0x2A => "group 2 only server general failure",
        0x2C => "attribute not gettable",
        _ => "unknown status",
    }
}
