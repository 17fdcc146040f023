use core::fmt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed part of the Identity Object reply, up to and including the
/// product-name length byte.
pub const IDENTITY_HEADER_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("malformed identity: {0}")]
    MalformedIdentity(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.major, self.minor)
    }
}

/// How a family renders the 32-bit serial number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum SerialFormat {
    #[default]
    Decimal,
    /// Eight hex digits of the serial bytes in reverse wire order.
    ReversedHex,
}

/// Decoded Identity Object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    pub revision: Revision,
    pub status: u16,
    pub serial_number: u32,
    pub product_name: String,
}

impl IdentityRecord {
    /// Wire layout of this record; inverse of [`resolve`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let name = self.product_name.as_bytes();
        let mut out = Vec::with_capacity(IDENTITY_HEADER_LEN + name.len());
        out.extend_from_slice(&self.vendor_id.to_le_bytes());
        out.extend_from_slice(&self.device_type.to_le_bytes());
        out.extend_from_slice(&self.product_code.to_le_bytes());
        out.push(self.revision.major);
        out.push(self.revision.minor);
        out.extend_from_slice(&self.status.to_le_bytes());
        out.extend_from_slice(&self.serial_number.to_le_bytes());
        out.push(name.len().min(usize::from(u8::MAX)) as u8);
        out.extend_from_slice(&name[..name.len().min(usize::from(u8::MAX))]);
        out
    }

    pub fn serial_display(&self, format: SerialFormat) -> String {
        match format {
            SerialFormat::Decimal => self.serial_number.to_string(),
            SerialFormat::ReversedHex => {
                let mut b = self.serial_number.to_le_bytes();
                b.reverse();
                crate::codec::to_hex(&b)
            }
        }
    }
}

/// Parse an Identity Object reply. Pure; no I/O.
pub fn resolve(bytes: &[u8]) -> Result<IdentityRecord, IdentityError> {
    if bytes.len() < IDENTITY_HEADER_LEN {
        return Err(IdentityError::MalformedIdentity(format!(
            "{} bytes, need at least {IDENTITY_HEADER_LEN}",
            bytes.len()
        )));
    }
    let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
    let name_len = usize::from(bytes[14]);
    let end = IDENTITY_HEADER_LEN + name_len;
    if bytes.len() < end {
        return Err(IdentityError::MalformedIdentity(format!(
            "product name length {name_len} exceeds reply ({} bytes)",
            bytes.len()
        )));
    }
    let name = &bytes[IDENTITY_HEADER_LEN..end];
    if !name.is_ascii() {
        return Err(IdentityError::MalformedIdentity(
            "product name is not ASCII".to_string(),
        ));
    }
    Ok(IdentityRecord {
        vendor_id: u16_at(0),
        device_type: u16_at(2),
        product_code: u16_at(4),
        revision: Revision {
            major: bytes[6],
            minor: bytes[7],
        },
        status: u16_at(8),
        serial_number: u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]),
        product_name: name.iter().map(|&b| char::from(b)).collect(),
    })
}
