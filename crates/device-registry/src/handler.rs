//! Per-device session: identify, pick the family (or fall back to generic),
//! then drive the enumeration engine for backup or restore.

use crate::engine::{
    BackupOptions, BackupOutcome, BackupSummary, CancelToken, EngineError, EnumerationEngine,
    ParameterValue, RestoreOptions, RestoreReport,
};
use crate::identity::{resolve, IdentityRecord};
use crate::notify::IdentityNotifier;
use crate::record::BackupRecord;
use crate::registry::FamilyRegistry;
use crate::types::{AttributeLayout, BehaviorVariant, DeviceFamilyDescriptor};
use cip_transport::{DeviceAddress, ExplicitMessaging};
use tracing::{info, warn};

/// Result of a completed backup pass.
#[derive(Debug, Clone)]
pub struct DeviceBackup {
    pub max_ordinal: u32,
    pub values: Vec<ParameterValue>,
    pub summary: BackupSummary,
    pub record: BackupRecord,
}

pub struct DeviceHandle<T: ExplicitMessaging> {
    transport: T,
    identity: IdentityRecord,
    family: Option<DeviceFamilyDescriptor>,
    cancel: CancelToken,
}

impl<T: ExplicitMessaging> DeviceHandle<T> {
    /// Read and resolve the identity, then bind the matching family.
    ///
    /// An unreachable device or a truncated identity fails the session. An
    /// identity with no registered family is handled generically.
    pub fn connect(
        mut transport: T,
        registry: &FamilyRegistry,
        notifier: &dyn IdentityNotifier,
    ) -> Result<Self, EngineError> {
        let raw = transport
            .read_identity_object()
            .map_err(EngineError::Connect)?;
        let identity = resolve(&raw)?;
        let family = registry
            .lookup(identity.device_type, identity.product_code)
            .cloned();
        match &family {
            Some(f) => info!(
                device = %transport.address(),
                family = %f.name,
                variant = f.variant.label(),
                "family resolved"
            ),
            None => info!(
                device = %transport.address(),
                device_type = identity.device_type,
                product_code = identity.product_code,
                "no registered family, using generic handler"
            ),
        }
        notifier.on_new_device_identity(&identity, transport.address());
        Ok(Self {
            transport,
            identity,
            family,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn address(&self) -> &DeviceAddress {
        self.transport.address()
    }

    pub fn identity(&self) -> &IdentityRecord {
        &self.identity
    }

    /// `None` means the generic handler.
    pub fn family(&self) -> Option<&DeviceFamilyDescriptor> {
        self.family.as_ref()
    }

    pub fn is_generic(&self) -> bool {
        self.family.is_none()
    }

    pub fn layout(&self) -> AttributeLayout {
        self.family
            .as_ref()
            .map(|f| f.variant)
            .unwrap_or(BehaviorVariant::StandardCompliant)
            .layout()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn backup(&mut self, options: &BackupOptions) -> Result<DeviceBackup, EngineError> {
        let catalog = self.family.as_ref().map(|f| f.catalog.as_ref());
        let engine = EnumerationEngine::new(self.layout(), catalog, &self.cancel);
        match engine.backup(&mut self.transport, options) {
            BackupOutcome::Completed {
                max_ordinal,
                values,
            } => {
                let summary = BackupSummary::from_values(&values);
                let record = BackupRecord::from_backup(
                    self.transport.address().as_str(),
                    &self.identity,
                    self.family.as_ref(),
                    &values,
                );
                info!(
                    device = %self.transport.address(),
                    read = summary.read,
                    defaulted = summary.defaulted,
                    unavailable = summary.unavailable,
                    skipped = summary.skipped,
                    "backup completed"
                );
                Ok(DeviceBackup {
                    max_ordinal,
                    values,
                    summary,
                    record,
                })
            }
            BackupOutcome::Aborted { reason } => Err(reason),
        }
    }

    /// Write a backup back to this device. Refuses a record taken from a
    /// different model unless `force` is set.
    pub fn restore(
        &mut self,
        record: &BackupRecord,
        options: &RestoreOptions,
    ) -> Result<RestoreReport, EngineError> {
        let live = (self.identity.device_type, self.identity.product_code);
        if record.identity.key() != live {
            if !options.force {
                return Err(EngineError::IdentityMismatch {
                    expected: record.identity.key(),
                    found: live,
                });
            }
            warn!(
                device = %self.transport.address(),
                expected = ?record.identity.key(),
                found = ?live,
                "restoring across models (forced)"
            );
        }
        let catalog = self.family.as_ref().map(|f| f.catalog.as_ref());
        let engine = EnumerationEngine::new(self.layout(), catalog, &self.cancel);
        let report = engine.restore(&mut self.transport, &record.parameters, options);
        info!(
            device = %self.transport.address(),
            written = report.written.len(),
            rejected = report.rejected.len(),
            skipped = report.skipped.len(),
            not_in_backup = report.not_in_backup,
            "restore finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;
    use crate::identity::Revision;
    use crate::notify::{ChannelNotifier, LogNotifier};
    use cip_transport::{MockCall, MockFault, MockTransport, TransportError};
    use std::sync::mpsc;

    fn identity(device_type: u16, product_code: u16) -> IdentityRecord {
        IdentityRecord {
            vendor_id: 1,
            device_type,
            product_code,
            revision: Revision { major: 5, minor: 1 },
            status: 0,
            serial_number: 0x0102_0304,
            product_name: "Test Device".into(),
        }
    }

    fn registry() -> FamilyRegistry {
        FamilyRegistry::builtin().unwrap()
    }

    #[test]
    fn test_scenario_mapped_family_with_one_failure() {
        let layout = BehaviorVariant::StandardCompliant.layout();
        let t = MockTransport::new("192.168.1.20")
            .with_identity(identity(150, 9).to_bytes())
            .with_attribute(layout.max_ordinal, 3u16.to_le_bytes().to_vec())
            .with_attribute(layout.value_path(1), vec![0x02, 0x00])
            .with_read_fault(layout.value_path(2), MockFault::Status(0x08))
            .with_attribute(layout.value_path(3), vec![0x32, 0x00]);
        let (tx, rx) = mpsc::channel();
        let notifier = ChannelNotifier::new(tx);
        let mut dev = DeviceHandle::connect(t, &registry(), &notifier).unwrap();
        assert_eq!(dev.family().unwrap().name, "PowerFlex 525");
        assert_eq!(rx.try_recv().unwrap().1.device_type, 150);

        let backup = dev.backup(&BackupOptions::default()).unwrap();
        assert_eq!(backup.max_ordinal, 3);
        assert_eq!(backup.record.parameters.len(), 3);
        let p2 = &backup.record.parameters[1];
        assert_eq!(p2.name.as_deref(), Some("Motor NP Volts"));
        assert_eq!(p2.value, Some(Value::Int(460)));
        assert!(p2.defaulted);
        assert_eq!(backup.record.parameters[2].value, Some(Value::Int(50)));
        assert_eq!(backup.summary.read, 2);
        assert_eq!(backup.summary.defaulted, 1);
        assert_eq!(backup.record.identity.serial, "01020304");
    }

    #[test]
    fn test_scenario_unmapped_device_is_generic() {
        let layout = BehaviorVariant::StandardCompliant.layout();
        let t = MockTransport::new("192.168.1.30")
            .with_identity(identity(999, 999).to_bytes())
            .with_attribute(layout.max_ordinal, 2u16.to_le_bytes().to_vec())
            .with_attribute(layout.value_path(1), vec![0x34, 0x12])
            .with_attribute(layout.value_path(2), vec![0x01]);
        let mut dev = DeviceHandle::connect(t, &registry(), &LogNotifier).unwrap();
        assert!(dev.is_generic());
        let backup = dev.backup(&BackupOptions::default()).unwrap();
        assert!(backup.record.family.is_none());
        assert!(backup.record.parameters.iter().all(|e| e.name.is_none()));
        assert_eq!(backup.record.parameters[0].value, Some(Value::Text("3412".into())));
        assert_eq!(backup.record.parameters[1].value, Some(Value::Text("01".into())));
        assert_eq!(backup.record.file_name(), "generic_16909060.json");
    }

    #[test]
    fn test_connect_failures() {
        let unreachable = MockTransport::new("192.168.1.40");
        assert!(matches!(
            DeviceHandle::connect(unreachable, &registry(), &LogNotifier),
            Err(EngineError::Connect(TransportError::Connect(_)))
        ));
        let truncated = MockTransport::new("192.168.1.41").with_identity(vec![1, 0, 150]);
        assert!(matches!(
            DeviceHandle::connect(truncated, &registry(), &LogNotifier),
            Err(EngineError::Identity(_))
        ));
    }

    #[test]
    fn test_notifier_called_once() {
        let t = MockTransport::new("a").with_identity(identity(3, 651).to_bytes());
        let calls = std::cell::Cell::new(0);
        let notifier = |_: &IdentityRecord, _: &DeviceAddress| calls.set(calls.get() + 1);
        let dev = DeviceHandle::connect(t, &registry(), &notifier).unwrap();
        assert_eq!(calls.get(), 1);
        // E300 reads its count from Number of Instances
        assert_eq!(dev.layout().max_ordinal.attribute, 3);
    }

    #[test]
    fn test_backup_abort_is_error() {
        let t = MockTransport::new("a").with_identity(identity(150, 9).to_bytes());
        let mut dev = DeviceHandle::connect(t, &registry(), &LogNotifier).unwrap();
        assert!(matches!(
            dev.backup(&BackupOptions::default()),
            Err(EngineError::DiscoverMax(_))
        ));
    }

    #[test]
    fn test_restore_identity_guard() {
        let layout = BehaviorVariant::StandardCompliant.layout();
        let source = MockTransport::new("a")
            .with_identity(identity(150, 9).to_bytes())
            .with_attribute(layout.max_ordinal, 2u16.to_le_bytes().to_vec())
            .with_attribute(layout.value_path(1), vec![0x01, 0x00])
            .with_attribute(layout.value_path(2), vec![0xE0, 0x01]);
        let mut dev = DeviceHandle::connect(source, &registry(), &LogNotifier).unwrap();
        let record = dev.backup(&BackupOptions::default()).unwrap().record;

        let other = MockTransport::new("b").with_identity(identity(999, 999).to_bytes());
        let mut target = DeviceHandle::connect(other, &registry(), &LogNotifier).unwrap();
        assert!(matches!(
            target.restore(&record, &RestoreOptions::default()),
            Err(EngineError::IdentityMismatch { .. })
        ));
        assert_eq!(target.transport().attribute_calls(), 0);

        let same = MockTransport::new("c").with_identity(identity(150, 9).to_bytes());
        let mut target = DeviceHandle::connect(same, &registry(), &LogNotifier).unwrap();
        let report = target.restore(&record, &RestoreOptions::default()).unwrap();
        assert_eq!(report.written, vec![1, 2]);
        assert!(report.not_in_backup > 0);
        let t = target.into_transport();
        assert!(t
            .calls()
            .contains(&MockCall::Set(layout.value_path(2), vec![0xE0, 0x01])));
    }

    #[test]
    fn test_cancelled_session() {
        let t = MockTransport::new("a").with_identity(identity(150, 9).to_bytes());
        let cancel = CancelToken::new();
        let mut dev = DeviceHandle::connect(t, &registry(), &LogNotifier)
            .unwrap()
            .with_cancel(cancel.clone());
        cancel.cancel();
        assert!(matches!(
            dev.backup(&BackupOptions::default()),
            Err(EngineError::Cancelled { .. })
        ));
    }
}
