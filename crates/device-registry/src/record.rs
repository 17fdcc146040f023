use crate::codec::Value;
use crate::engine::{ParameterValue, ReadStatus};
use crate::identity::{IdentityRecord, SerialFormat};
use crate::types::DeviceFamilyDescriptor;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

pub const RECORD_FORMAT: &str = "dbk";
pub const RECORD_VERSION: u32 = 1;

/// Identity fields as persisted alongside the parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySection {
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    pub revision: String,
    /// Identity Object status word at backup time.
    #[serde(default)]
    pub status: u16,
    pub serial_number: u32,
    /// Serial as the family renders it.
    pub serial: String,
    pub product_name: String,
}

impl IdentitySection {
    pub fn new(identity: &IdentityRecord, format: SerialFormat) -> Self {
        Self {
            vendor_id: identity.vendor_id,
            device_type: identity.device_type,
            product_code: identity.product_code,
            revision: identity.revision.to_string(),
            status: identity.status,
            serial_number: identity.serial_number,
            serial: identity.serial_display(format),
            product_name: identity.product_name.clone(),
        }
    }

    pub fn key(&self) -> (u16, u16) {
        (self.device_type, self.product_code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub ordinal: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `null` when the value was unavailable.
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub defaulted: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl RecordEntry {
    pub fn from_value(v: &ParameterValue) -> Self {
        Self {
            ordinal: v.ordinal,
            name: v.name.clone(),
            value: v.value.clone(),
            defaulted: matches!(v.status, ReadStatus::Defaulted { .. }),
        }
    }
}

/// One device's backup, serialized as pretty JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub format: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    pub address: String,
    /// Family name, absent for devices handled generically.
    #[serde(default)]
    pub family: Option<String>,
    pub identity: IdentitySection,
    pub parameters: Vec<RecordEntry>,
}

impl BackupRecord {
    /// Build a record from completed values; only recordable, non-skipped
    /// entries are emitted, in ordinal order.
    pub fn from_backup(
        address: &str,
        identity: &IdentityRecord,
        family: Option<&DeviceFamilyDescriptor>,
        values: &[ParameterValue],
    ) -> Self {
        let format = family.map(|f| f.serial_format).unwrap_or_default();
        let mut parameters: Vec<RecordEntry> = values
            .iter()
            .filter(|v| v.is_emitted())
            .map(RecordEntry::from_value)
            .collect();
        parameters.sort_by_key(|e| e.ordinal);
        Self {
            format: RECORD_FORMAT.to_string(),
            version: RECORD_VERSION,
            created: OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .ok(),
            address: address.to_string(),
            family: family.map(|f| f.name.clone()),
            identity: IdentitySection::new(identity, format),
            parameters,
        }
    }

    /// `<family-slug>_<serial>.json`, or `generic_<serial>.json`.
    pub fn file_name(&self) -> String {
        let slug = self
            .family
            .as_deref()
            .map(crate::types::slugify)
            .unwrap_or_else(|| "generic".to_string());
        format!("{slug}_{}.json", self.identity.serial)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize backup record")
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let rec: Self = serde_json::from_str(raw).context("parse backup record")?;
        if rec.format != RECORD_FORMAT {
            anyhow::bail!("not a backup record (format {:?})", rec.format);
        }
        if rec.version > RECORD_VERSION {
            anyhow::bail!("backup record version {} is newer than supported", rec.version);
        }
        Ok(rec)
    }

    /// Write into `dir` under [`Self::file_name`]; returns the full path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let path = dir.join(self.file_name());
        fs::write(&path, self.to_json()?).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("load {}", path.display()))
    }
}
