use crate::codec::{parse_hex, CodecError, TypeTag, Value};
use crate::decode::{decode_untyped, decode_value};
use crate::encode::encode_value;
use crate::identity::IdentityError;
use crate::record::RecordEntry;
use crate::types::{AttributeLayout, Catalog, ParameterDescriptor};
use cip_transport::{ExplicitMessaging, TransportError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Device-scoped failures. Never escalated past the device.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("connect: {0}")]
    Connect(TransportError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("max ordinal discovery failed: {0}")]
    DiscoverMax(TransportError),
    #[error("max ordinal reply undecodable: {0}")]
    DiscoverMaxDecode(CodecError),
    #[error("transport failed at ordinal {ordinal}: {source}")]
    Transport {
        ordinal: u32,
        source: TransportError,
    },
    #[error("cancelled before ordinal {ordinal}")]
    Cancelled { ordinal: u32 },
    #[error("backup is for (device type, product code) {expected:?} but device reports {found:?}")]
    IdentityMismatch {
        expected: (u16, u16),
        found: (u16, u16),
    },
}

/// Shared abort flag, observed before each transport call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BackupOptions {
    pub verbosity: Verbosity,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    pub verbosity: Verbosity,
    /// Write even when the backup's device type/product code differ.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadStatus {
    Read,
    /// Catalog default substituted.
    Defaulted { reason: String },
    /// Nothing to substitute (generic device or undecodable default).
    Unavailable { reason: String },
    /// Non-recordable catalog entry; no request issued.
    Skipped,
}

/// One ordinal's outcome in a backup pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterValue {
    pub ordinal: u32,
    pub name: Option<String>,
    pub raw: Vec<u8>,
    pub value: Option<Value>,
    pub recordable: bool,
    pub status: ReadStatus,
}

impl ParameterValue {
    /// Whether the entry belongs in the backup record.
    pub fn is_emitted(&self) -> bool {
        self.recordable && self.status != ReadStatus::Skipped
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackupSummary {
    pub read: usize,
    pub defaulted: usize,
    pub unavailable: usize,
    pub skipped: usize,
}

impl BackupSummary {
    pub fn from_values(values: &[ParameterValue]) -> Self {
        let mut s = Self::default();
        for v in values {
            match v.status {
                ReadStatus::Read => s.read += 1,
                ReadStatus::Defaulted { .. } => s.defaulted += 1,
                ReadStatus::Unavailable { .. } => s.unavailable += 1,
                ReadStatus::Skipped => s.skipped += 1,
            }
        }
        s
    }
}

/// Terminal state of a backup pass.
#[derive(Debug, Clone, PartialEq)]
pub enum BackupOutcome {
    Completed {
        max_ordinal: u32,
        values: Vec<ParameterValue>,
    },
    /// Partial results are discarded.
    Aborted { reason: EngineError },
}

impl BackupOutcome {
    pub fn values(&self) -> &[ParameterValue] {
        match self {
            BackupOutcome::Completed { values, .. } => values,
            BackupOutcome::Aborted { .. } => &[],
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, BackupOutcome::Completed { .. })
    }

    pub fn summary(&self) -> BackupSummary {
        BackupSummary::from_values(self.values())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSkip {
    /// The backup marked the value unavailable.
    NoValue,
    /// Entry in the backup with no recordable catalog counterpart.
    NotInCatalog,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    pub written: Vec<u32>,
    pub rejected: Vec<(u32, String)>,
    pub skipped: Vec<(u32, RestoreSkip)>,
    /// Recordable catalog entries the backup does not mention.
    pub not_in_backup: usize,
    pub aborted: Option<EngineError>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.aborted.is_none()
    }
}

/// Drives discovery, reads and writes for one device session.
///
/// `catalog` is `None` for unmapped devices (generic handler).
pub struct EnumerationEngine<'a> {
    layout: AttributeLayout,
    catalog: Option<&'a Catalog>,
    cancel: &'a CancelToken,
}

impl<'a> EnumerationEngine<'a> {
    pub fn new(layout: AttributeLayout, catalog: Option<&'a Catalog>, cancel: &'a CancelToken) -> Self {
        Self {
            layout,
            catalog,
            cancel,
        }
    }

    /// One read of the layout's max-ordinal attribute. No retry.
    pub fn discover_max<T: ExplicitMessaging + ?Sized>(
        &self,
        transport: &mut T,
    ) -> Result<u32, EngineError> {
        let raw = transport
            .get_attribute_single(self.layout.max_ordinal)
            .map_err(EngineError::DiscoverMax)?;
        let tag = self.layout.max_ordinal_tag;
        let v = decode_value(tag, &raw).map_err(EngineError::DiscoverMaxDecode)?;
        v.as_i64()
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| {
                EngineError::DiscoverMaxDecode(CodecError::FormatMismatch {
                    tag,
                    value: v.to_string(),
                })
            })
    }

    pub fn backup<T: ExplicitMessaging + ?Sized>(
        &self,
        transport: &mut T,
        options: &BackupOptions,
    ) -> BackupOutcome {
        if self.cancel.is_cancelled() {
            return BackupOutcome::Aborted {
                reason: EngineError::Cancelled { ordinal: 0 },
            };
        }
        let max_ordinal = match self.discover_max(transport) {
            Ok(m) => m,
            Err(reason) => {
                warn!(device = %transport.address(), error = %reason, "backup aborted");
                return BackupOutcome::Aborted { reason };
            }
        };
        info!(device = %transport.address(), max_ordinal, "parameter count discovered");

        let mut values = Vec::with_capacity(max_ordinal as usize);
        for ordinal in 1..=max_ordinal {
            let desc = self.catalog.and_then(|c| c.get(ordinal));
            if let Some(d) = desc.filter(|d| !d.recordable) {
                values.push(ParameterValue {
                    ordinal,
                    name: Some(d.name.clone()),
                    raw: Vec::new(),
                    value: None,
                    recordable: false,
                    status: ReadStatus::Skipped,
                });
                continue;
            }
            if self.cancel.is_cancelled() {
                warn!(device = %transport.address(), ordinal, "backup cancelled");
                return BackupOutcome::Aborted {
                    reason: EngineError::Cancelled { ordinal },
                };
            }
            let pv = match transport.get_attribute_single(self.layout.value_path(ordinal)) {
                Ok(raw) => decode_read(ordinal, desc, raw),
                Err(e) if e.is_fatal() => {
                    warn!(device = %transport.address(), ordinal, error = %e, "backup aborted");
                    return BackupOutcome::Aborted {
                        reason: EngineError::Transport {
                            ordinal,
                            source: e,
                        },
                    };
                }
                Err(e) => substitute(ordinal, desc, e.to_string(), Vec::new()),
            };
            log_read(&pv, options.verbosity);
            values.push(pv);
        }
        BackupOutcome::Completed {
            max_ordinal,
            values,
        }
    }

    /// Write back recorded values. Per-ordinal rejections are collected; a
    /// fatal transport error or cancellation stops the remaining writes.
    pub fn restore<T: ExplicitMessaging + ?Sized>(
        &self,
        transport: &mut T,
        entries: &[RecordEntry],
        options: &RestoreOptions,
    ) -> RestoreReport {
        let by_ordinal: BTreeMap<u32, &RecordEntry> =
            entries.iter().map(|e| (e.ordinal, e)).collect();
        let mut report = RestoreReport::default();

        let plan: Vec<(u32, Option<&ParameterDescriptor>)> = match self.catalog {
            Some(catalog) => {
                for e in entries {
                    if !catalog.get(e.ordinal).is_some_and(|d| d.recordable) {
                        report.skipped.push((e.ordinal, RestoreSkip::NotInCatalog));
                    }
                }
                catalog.recordable().map(|d| (d.ordinal, Some(d))).collect()
            }
            None => by_ordinal.keys().map(|&o| (o, None)).collect(),
        };

        for (ordinal, desc) in plan {
            let Some(entry) = by_ordinal.get(&ordinal) else {
                report.not_in_backup += 1;
                continue;
            };
            let Some(value) = entry.value.as_ref() else {
                report.skipped.push((ordinal, RestoreSkip::NoValue));
                continue;
            };
            let bytes = match encode_for(desc, value) {
                Ok(b) => b,
                Err(e) => {
                    warn!(device = %transport.address(), ordinal, error = %e, "value not encodable");
                    report.rejected.push((ordinal, e.to_string()));
                    continue;
                }
            };
            if self.cancel.is_cancelled() {
                warn!(device = %transport.address(), ordinal, "restore cancelled");
                report.aborted = Some(EngineError::Cancelled { ordinal });
                break;
            }
            match transport.set_attribute_single(self.layout.value_path(ordinal), &bytes) {
                Ok(()) => {
                    if options.verbosity == Verbosity::Verbose {
                        info!(ordinal, value = %value, "written");
                    } else {
                        debug!(ordinal, value = %value, "written");
                    }
                    report.written.push(ordinal);
                }
                Err(e) if e.is_fatal() => {
                    warn!(device = %transport.address(), ordinal, error = %e, "restore aborted");
                    report.aborted = Some(EngineError::Transport {
                        ordinal,
                        source: e,
                    });
                    break;
                }
                Err(e) => {
                    if options.verbosity != Verbosity::Quiet {
                        warn!(device = %transport.address(), ordinal, error = %e, "write rejected");
                    }
                    report.rejected.push((ordinal, e.to_string()));
                }
            }
        }
        report
    }
}

fn encode_for(desc: Option<&ParameterDescriptor>, value: &Value) -> Result<Vec<u8>, CodecError> {
    match desc {
        Some(d) => encode_value(d.tag()?, value),
        None => {
            // generic records carry opaque hex; its length is the width
            let width = match value {
                Value::Text(s) => parse_hex(s).map_or(0, |b| b.len()),
                _ => 0,
            };
            if width == 0 {
                return Err(CodecError::FormatMismatch {
                    tag: TypeTag::OpaqueBlob(0),
                    value: value.to_string(),
                });
            }
            encode_value(TypeTag::OpaqueBlob(width), value)
        }
    }
}

fn decode_read(ordinal: u32, desc: Option<&ParameterDescriptor>, raw: Vec<u8>) -> ParameterValue {
    let Some(d) = desc else {
        return ParameterValue {
            ordinal,
            name: None,
            value: Some(decode_untyped(&raw)),
            raw,
            recordable: true,
            status: ReadStatus::Read,
        };
    };
    match d.tag().and_then(|tag| decode_value(tag, &raw)) {
        Ok(v) => ParameterValue {
            ordinal,
            name: Some(d.name.clone()),
            raw,
            value: Some(v),
            recordable: true,
            status: ReadStatus::Read,
        },
        Err(e) => substitute(ordinal, desc, e.to_string(), raw),
    }
}

fn substitute(
    ordinal: u32,
    desc: Option<&ParameterDescriptor>,
    reason: String,
    raw: Vec<u8>,
) -> ParameterValue {
    let Some(d) = desc else {
        return ParameterValue {
            ordinal,
            name: None,
            raw,
            value: None,
            recordable: true,
            status: ReadStatus::Unavailable { reason },
        };
    };
    let (value, status) = match d.default_value() {
        Ok(v) => (Some(v), ReadStatus::Defaulted { reason }),
        Err(e) => (
            None,
            ReadStatus::Unavailable {
                reason: format!("{reason}; default: {e}"),
            },
        ),
    };
    ParameterValue {
        ordinal,
        name: Some(d.name.clone()),
        raw,
        value,
        recordable: true,
        status,
    }
}

fn log_read(pv: &ParameterValue, verbosity: Verbosity) {
    match (&pv.status, verbosity) {
        (ReadStatus::Defaulted { reason } | ReadStatus::Unavailable { reason }, Verbosity::Quiet) => {
            debug!(ordinal = pv.ordinal, reason = %reason, "parameter not read")
        }
        (ReadStatus::Defaulted { reason }, _) => {
            warn!(ordinal = pv.ordinal, reason = %reason, "parameter defaulted")
        }
        (ReadStatus::Unavailable { reason }, _) => {
            warn!(ordinal = pv.ordinal, reason = %reason, "parameter unavailable")
        }
        (_, Verbosity::Verbose) => info!(
            ordinal = pv.ordinal,
            name = pv.name.as_deref().unwrap_or("-"),
            value = ?pv.value,
            "parameter read"
        ),
        _ => debug!(ordinal = pv.ordinal, "parameter read"),
    }
}
