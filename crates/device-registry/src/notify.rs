use crate::identity::IdentityRecord;
use cip_transport::DeviceAddress;
use std::sync::mpsc::Sender;

/// Told once per session about a freshly identified device. Implementations
/// must return promptly and never fail the session.
pub trait IdentityNotifier {
    fn on_new_device_identity(&self, identity: &IdentityRecord, address: &DeviceAddress);
}

/// Emits an `info!` event per identified device.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl IdentityNotifier for LogNotifier {
    fn on_new_device_identity(&self, identity: &IdentityRecord, address: &DeviceAddress) {
        tracing::info!(
            device = %address,
            vendor = identity.vendor_id,
            device_type = identity.device_type,
            product_code = identity.product_code,
            revision = %identity.revision,
            name = %identity.product_name,
            "device identified"
        );
    }
}

/// Forwards identities over a channel; a closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: Sender<(DeviceAddress, IdentityRecord)>,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<(DeviceAddress, IdentityRecord)>) -> Self {
        Self { tx }
    }
}

impl IdentityNotifier for ChannelNotifier {
    fn on_new_device_identity(&self, identity: &IdentityRecord, address: &DeviceAddress) {
        let _ = self.tx.send((address.clone(), identity.clone()));
    }
}

impl<F> IdentityNotifier for F
where
    F: Fn(&IdentityRecord, &DeviceAddress),
{
    fn on_new_device_identity(&self, identity: &IdentityRecord, address: &DeviceAddress) {
        self(identity, address)
    }
}
