//! cip-transport: explicit-messaging abstractions for CIP devices
//!
//! This crate defines the request/response primitive the backup engine sits on:
//! Get/Set Attribute Single against a class/instance/attribute path, plus the
//! Identity Object read used to classify a device. Session establishment,
//! encapsulation and retry policy belong to the backend. The default build
//! enables a `mock` backend so the engine and the CLI run without a network.

mod types;
pub use types::{AttributePath, DeviceAddress};

mod error;
pub use error::{general_status_text, Result, TransportError};

mod traits;
pub use traits::ExplicitMessaging;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockCall, MockFault, MockTransport};
