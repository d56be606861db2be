// raptly-api: Async Rust client for the RAPT brewing telemetry cloud API

pub mod client;
pub mod error;
pub mod records;
pub mod transport;

pub use client::{
    API_BASE_URL, DEFAULT_TOKEN_TTL, MIN_REQUEST_GAP, OAUTH_CLIENT_ID, RaptClient, TOKEN_URL,
};
pub use error::Error;
pub use records::{DeviceCategory, DeviceInventory, DeviceRecord};
pub use transport::TransportConfig;
