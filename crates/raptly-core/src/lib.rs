// raptly-core: Polling and discovery layer between raptly-api and hosts.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod snapshot;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_UPDATE_INTERVAL, MonitorConfig};
pub use coordinator::{Coordinator, DiscoveryCallback};
pub use error::CoreError;
pub use snapshot::DeviceSnapshot;

// Re-export the api data model so hosts depend on one crate.
pub use raptly_api::{DeviceCategory, DeviceInventory, DeviceRecord, RaptClient};
