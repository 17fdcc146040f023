use crate::{AttributePath, DeviceAddress, ExplicitMessaging, Result, TransportError};
use std::collections::HashMap;

/// Scripted failure for one attribute path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MockFault {
    /// Reply with a CIP general status.
    Status(u8),
    Timeout,
    /// Drop the session.
    Disconnect,
}

impl MockFault {
    fn into_error(self, path: AttributePath) -> TransportError {
        match self {
            MockFault::Status(status) => TransportError::Attribute { path, status },
            MockFault::Timeout => TransportError::Timeout,
            MockFault::Disconnect => TransportError::Disconnected(format!("mock drop at {path}")),
        }
    }
}

/// One request seen by the mock, in arrival order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MockCall {
    Identity,
    Get(AttributePath),
    Set(AttributePath, Vec<u8>),
}

/// A simple in-process device. Each instance is independent.
///
/// Unknown paths reply with status 0x16 (object does not exist). Writes to a
/// path without a scripted fault are stored and visible to later reads.
#[derive(Debug, Clone)]
pub struct MockTransport {
    address: DeviceAddress,
    identity: Option<Vec<u8>>,
    attributes: HashMap<AttributePath, Vec<u8>>,
    read_faults: HashMap<AttributePath, MockFault>,
    write_faults: HashMap<AttributePath, MockFault>,
    calls: Vec<MockCall>,
    dropped: bool,
}

impl MockTransport {
    pub fn new(address: impl Into<DeviceAddress>) -> Self {
        Self {
            address: address.into(),
            identity: None,
            attributes: HashMap::new(),
            read_faults: HashMap::new(),
            write_faults: HashMap::new(),
            calls: Vec::new(),
            dropped: false,
        }
    }

    /// Identity bytes returned by `read_identity_object`. Without them the
    /// device behaves as unreachable.
    pub fn with_identity(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.identity = Some(bytes.into());
        self
    }

    pub fn with_attribute(mut self, path: AttributePath, bytes: impl Into<Vec<u8>>) -> Self {
        self.attributes.insert(path, bytes.into());
        self
    }

    pub fn with_read_fault(mut self, path: AttributePath, fault: MockFault) -> Self {
        self.read_faults.insert(path, fault);
        self
    }

    pub fn with_write_fault(mut self, path: AttributePath, fault: MockFault) -> Self {
        self.write_faults.insert(path, fault);
        self
    }

    pub fn calls(&self) -> &[MockCall] {
        &self.calls
    }

    /// Number of Get/Set requests, ignoring the identity read.
    pub fn attribute_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| !matches!(c, MockCall::Identity))
            .count()
    }

    pub fn attribute(&self, path: AttributePath) -> Option<&[u8]> {
        self.attributes.get(&path).map(Vec::as_slice)
    }

    fn check_link(&self) -> Result<()> {
        if self.dropped {
            return Err(TransportError::Disconnected(format!(
                "mock session to {} closed",
                self.address
            )));
        }
        Ok(())
    }

    fn fault(&mut self, fault: MockFault, path: AttributePath) -> TransportError {
        if fault == MockFault::Disconnect {
            self.dropped = true;
        }
        fault.into_error(path)
    }
}

impl ExplicitMessaging for MockTransport {
    fn address(&self) -> &DeviceAddress {
        &self.address
    }

    fn read_identity_object(&mut self) -> Result<Vec<u8>> {
        self.calls.push(MockCall::Identity);
        self.check_link()?;
        self.identity
            .clone()
            .ok_or_else(|| TransportError::Connect(format!("no route to {}", self.address)))
    }

    fn get_attribute_single(&mut self, path: AttributePath) -> Result<Vec<u8>> {
        self.calls.push(MockCall::Get(path));
        self.check_link()?;
        if let Some(fault) = self.read_faults.get(&path).copied() {
            return Err(self.fault(fault, path));
        }
        self.attributes
            .get(&path)
            .cloned()
            .ok_or(TransportError::Attribute { path, status: 0x16 })
    }

    fn set_attribute_single(&mut self, path: AttributePath, data: &[u8]) -> Result<()> {
        self.calls.push(MockCall::Set(path, data.to_vec()));
        self.check_link()?;
        if let Some(fault) = self.write_faults.get(&path).copied() {
            return Err(self.fault(fault, path));
        }
        tracing::trace!(%path, len = data.len(), "mock write");
        self.attributes.insert(path, data.to_vec());
        Ok(())
    }
}
