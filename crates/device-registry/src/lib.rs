//! device-registry: CIP device identification and parameter backup/restore
//!
//! Devices are classified by their Identity Object into a family (a YAML
//! parameter catalog plus an enumeration variant). A single enumeration
//! engine then discovers the parameter count, reads every recordable
//! ordinal through the type codec and assembles a backup record; restore
//! writes a record back. Unmapped devices are handled generically.

mod codec;
pub use codec::{parse_hex, to_hex, CodecError, TypeTag, Value};

mod decode;
pub use decode::{decode_default, decode_untyped, decode_value};

mod encode;
pub use encode::encode_value;

mod identity;
pub use identity::{resolve, IdentityError, IdentityRecord, Revision, SerialFormat, IDENTITY_HEADER_LEN};

mod types;
pub use types::*;

mod loader;
#[cfg(feature = "schema")]
pub use loader::catalog_schema;
pub use loader::{load_catalog_file, load_catalogs_dir, parse_catalog_str};

mod registry;
pub use registry::FamilyRegistry;

mod engine;
pub use engine::{
    BackupOptions, BackupOutcome, BackupSummary, CancelToken, EngineError, EnumerationEngine,
    ParameterValue, ReadStatus, RestoreOptions, RestoreReport, RestoreSkip, Verbosity,
};

mod notify;
pub use notify::{ChannelNotifier, IdentityNotifier, LogNotifier};

mod handler;
pub use handler::{DeviceBackup, DeviceHandle};

mod record;
pub use record::{BackupRecord, IdentitySection, RecordEntry, RECORD_FORMAT, RECORD_VERSION};

mod metrics;
pub use metrics::{BackupMetrics, MetricsHub};
