use crate::{AttributePath, DeviceAddress, Result};

/// A minimal blocking explicit-messaging session bound to one device.
///
/// Each call is one request/response round trip; implementations serialize
/// requests, so a session must not be shared between threads mid-exchange.
pub trait ExplicitMessaging {
    /// Address the session is bound to.
    fn address(&self) -> &DeviceAddress;

    /// Read the Identity Object (class 0x01, instance 1) in its
    /// Get Attributes All layout.
    fn read_identity_object(&mut self) -> Result<Vec<u8>>;

    /// Get Attribute Single.
    fn get_attribute_single(&mut self, path: AttributePath) -> Result<Vec<u8>>;

    /// Set Attribute Single.
    fn set_attribute_single(&mut self, path: AttributePath, data: &[u8]) -> Result<()>;
}

impl<T: ExplicitMessaging + ?Sized> ExplicitMessaging for &mut T {
    fn address(&self) -> &DeviceAddress {
        (**self).address()
    }

    fn read_identity_object(&mut self) -> Result<Vec<u8>> {
        (**self).read_identity_object()
    }

    fn get_attribute_single(&mut self, path: AttributePath) -> Result<Vec<u8>> {
        (**self).get_attribute_single(path)
    }

    fn set_attribute_single(&mut self, path: AttributePath, data: &[u8]) -> Result<()> {
        (**self).set_attribute_single(path, data)
    }
}
