//! Simulated device fleet, described in YAML and turned into mock sessions.

use anyhow::{anyhow, bail, Context, Result};
use cip_transport::{AttributePath, MockFault, MockTransport};
use device_registry::{parse_hex, IdentityRecord, Revision};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct Fleet {
    pub devices: Vec<SimDevice>,
}

#[derive(Debug, Deserialize)]
pub struct SimDevice {
    pub address: String,
    /// Identity fields; ignored when `identity_hex` is set.
    #[serde(default)]
    pub identity: Option<SimIdentity>,
    /// Raw Identity Object reply. Lets a fleet script malformed replies.
    #[serde(default)]
    pub identity_hex: Option<String>,
    #[serde(default)]
    pub parameters: Option<ParameterBlock>,
    #[serde(default)]
    pub attributes: Vec<SimAttribute>,
    #[serde(default)]
    pub faults: Vec<SimFault>,
}

#[derive(Debug, Deserialize)]
pub struct SimIdentity {
    #[serde(default = "default_vendor")]
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    #[serde(default)]
    pub revision_major: u8,
    #[serde(default)]
    pub revision_minor: u8,
    #[serde(default)]
    pub status: u16,
    pub serial_number: u32,
    #[serde(default)]
    pub product_name: String,
}

fn default_vendor() -> u16 {
    1
}

/// Shorthand for a parameter class: one hex value per instance, and the
/// class-level count attribute derived from the highest ordinal.
#[derive(Debug, Deserialize)]
pub struct ParameterBlock {
    #[serde(default = "default_class")]
    pub class: u16,
    #[serde(default = "default_value_attribute")]
    pub value_attribute: u16,
    /// Class attribute carrying the count (2 = Max Instance).
    #[serde(default = "default_count_attribute")]
    pub count_attribute: u16,
    /// Overrides the derived count.
    #[serde(default)]
    pub count: Option<u16>,
    pub values: BTreeMap<u32, String>,
}

fn default_class() -> u16 {
    0x0F
}

fn default_value_attribute() -> u16 {
    1
}

fn default_count_attribute() -> u16 {
    2
}

#[derive(Debug, Deserialize)]
pub struct SimAttribute {
    pub path: String,
    pub hex: String,
}

/// One scripted failure. Exactly one of `status`, `timeout` or `disconnect`.
#[derive(Debug, Deserialize)]
pub struct SimFault {
    pub path: String,
    #[serde(default)]
    pub status: Option<u8>,
    #[serde(default)]
    pub timeout: bool,
    #[serde(default)]
    pub disconnect: bool,
    /// Apply to writes instead of reads.
    #[serde(default)]
    pub on_write: bool,
}

impl Fleet {
    pub fn load(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading fleet: {path}"))?;
        serde_yaml::from_str(&raw).with_context(|| format!("parsing fleet yaml: {path}"))
    }

    /// Devices matching `addresses`, or all of them when empty.
    pub fn select(&self, addresses: &[String]) -> Result<Vec<&SimDevice>> {
        if addresses.is_empty() {
            return Ok(self.devices.iter().collect());
        }
        addresses.iter().map(|a| self.find(a)).collect()
    }

    pub fn find(&self, address: &str) -> Result<&SimDevice> {
        self.devices
            .iter()
            .find(|d| d.address == address.trim())
            .ok_or_else(|| anyhow!("device {address} not in fleet"))
    }
}

impl SimDevice {
    pub fn to_transport(&self) -> Result<MockTransport> {
        let mut t = MockTransport::new(self.address.as_str());
        if let Some(hex) = &self.identity_hex {
            let bytes = parse_hex(hex).ok_or_else(|| anyhow!("{}: bad identity_hex", self.address))?;
            t = t.with_identity(bytes);
        } else if let Some(id) = &self.identity {
            t = t.with_identity(id.to_record().to_bytes());
        }
        if let Some(block) = &self.parameters {
            let count = match block.count {
                Some(c) => c,
                None => {
                    let max = block.values.keys().next_back().copied().unwrap_or(0);
                    u16::try_from(max).with_context(|| format!("{}: ordinal {max} too large", self.address))?
                }
            };
            t = t.with_attribute(
                AttributePath::class_attribute(block.class, block.count_attribute),
                count.to_le_bytes().to_vec(),
            );
            for (ordinal, hex) in &block.values {
                let bytes = parse_hex(hex)
                    .ok_or_else(|| anyhow!("{}: bad hex for ordinal {ordinal}", self.address))?;
                t = t.with_attribute(
                    AttributePath::new(block.class, *ordinal, block.value_attribute),
                    bytes,
                );
            }
        }
        for a in &self.attributes {
            let bytes = parse_hex(&a.hex).ok_or_else(|| anyhow!("{}: bad hex at {}", self.address, a.path))?;
            t = t.with_attribute(parse_path(&a.path)?, bytes);
        }
        for f in &self.faults {
            let path = parse_path(&f.path)?;
            let fault = f.fault()?;
            t = if f.on_write {
                t.with_write_fault(path, fault)
            } else {
                t.with_read_fault(path, fault)
            };
        }
        Ok(t)
    }
}

impl SimIdentity {
    fn to_record(&self) -> IdentityRecord {
        IdentityRecord {
            vendor_id: self.vendor_id,
            device_type: self.device_type,
            product_code: self.product_code,
            revision: Revision {
                major: self.revision_major,
                minor: self.revision_minor,
            },
            status: self.status,
            serial_number: self.serial_number,
            product_name: self.product_name.clone(),
        }
    }
}

impl SimFault {
    fn fault(&self) -> Result<MockFault> {
        match (self.status, self.timeout, self.disconnect) {
            (Some(s), false, false) => Ok(MockFault::Status(s)),
            (None, true, false) => Ok(MockFault::Timeout),
            (None, false, true) => Ok(MockFault::Disconnect),
            _ => bail!("fault at {}: set exactly one of status, timeout, disconnect", self.path),
        }
    }
}

/// `class/instance/attribute`, class in decimal or `0x` hex.
pub fn parse_path(s: &str) -> Result<AttributePath> {
    let parts: Vec<&str> = s.trim().split('/').collect();
    let [class, instance, attribute] = parts.as_slice() else {
        bail!("attribute path {s:?}: expected class/instance/attribute");
    };
    let class = match class.strip_prefix("0x").or_else(|| class.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => class.parse::<u16>(),
    }
    .with_context(|| format!("attribute path {s:?}: bad class"))?;
    let instance = instance
        .parse::<u32>()
        .with_context(|| format!("attribute path {s:?}: bad instance"))?;
    let attribute = attribute
        .parse::<u16>()
        .with_context(|| format!("attribute path {s:?}: bad attribute"))?;
    Ok(AttributePath::new(class, instance, attribute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cip_transport::ExplicitMessaging;

    const FLEET: &str = r#"
devices:
  - address: 10.0.0.5
    identity: { device_type: 150, product_code: 9, serial_number: 7, product_name: "PF525" }
    parameters:
      values: { 1: "0100", 3: "3C00" }
    faults:
      - { path: "0x0F/2/1", status: 8 }
      - { path: "15/1/1", disconnect: true, on_write: true }
  - address: 10.0.0.6
"#;

    #[test]
    fn test_parse_path_forms() {
        assert_eq!(parse_path("0x93/0/2").unwrap(), AttributePath::new(0x93, 0, 2));
        assert_eq!(parse_path(" 15/4/1 ").unwrap(), AttributePath::new(15, 4, 1));
        assert!(parse_path("15/4").is_err());
        assert!(parse_path("0xZZ/1/1").is_err());
    }

    #[test]
    fn test_fleet_to_transport() {
        let fleet: Fleet = serde_yaml::from_str(FLEET).unwrap();
        assert_eq!(fleet.select(&[]).unwrap().len(), 2);
        assert!(fleet.find("10.0.0.99").is_err());

        let mut t = fleet.find("10.0.0.5").unwrap().to_transport().unwrap();
        let id = device_registry::resolve(&t.read_identity_object().unwrap()).unwrap();
        assert_eq!((id.device_type, id.product_code), (150, 9));
        assert_eq!(
            t.get_attribute_single(AttributePath::new(0x0F, 0, 2)).unwrap(),
            vec![3, 0]
        );
        assert!(t.get_attribute_single(AttributePath::new(0x0F, 2, 1)).is_err());
        let err = t
            .set_attribute_single(AttributePath::new(0x0F, 1, 1), &[0, 0])
            .unwrap_err();
        assert!(err.is_fatal());

        let mut silent = fleet.find("10.0.0.6").unwrap().to_transport().unwrap();
        assert!(silent.read_identity_object().is_err());
    }

    #[test]
    fn test_ambiguous_fault_rejected() {
        let f = SimFault {
            path: "15/1/1".into(),
            status: Some(8),
            timeout: true,
            disconnect: false,
            on_write: false,
        };
        assert!(f.fault().is_err());
    }
}
