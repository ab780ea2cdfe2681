//! Plugbridge Cloud Crate - eWeLink Cloud Connector
//!
//! This crate talks to the eWeLink (CoolKit) v2 cloud on behalf of the
//! plugbridge web backend.
//!
//! ## Features
//!
//! - **Signed Login** - Email/password login with automatic region redirect
//! - **OAuth** - Hosted login page redirect and authorization code exchange
//! - **Session** - One process-wide session with token refresh
//! - **Devices** - Listing normalized from every known response envelope
//! - **Toggle** - Switch commands shaped by a per-device override table
//!
//! ## Quick Start
//!
//! ```no_run
//! use plugbridge_cloud::{CloudClient, CloudConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CloudClient::new(CloudConfig::from_env())?;
//!
//!     client.login("me@example.com", "secret", None).await?;
//!     for device in client.list_devices(None).await? {
//!         println!("{} ({})", device.name, device.id);
//!     }
//!     client.toggle("1000abcdef", "on").await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod commands;
pub mod config;
pub mod devices;
pub mod error;
pub mod oauth;
pub mod region;
pub mod session;
pub mod signing;
pub mod types;

// Re-exports for convenience
pub use client::{CloudClient, HttpClient};
pub use commands::{
    CommandStrategy, DeviceOverride, OutletState, OverrideTable, SwitchValue, ToggleCommand,
};
pub use config::{CloudConfig, FamilyScope};
pub use devices::{Device, SwitchState};
pub use error::{CloudError, CloudResult};
pub use region::{Region, UnknownRegion};
pub use session::SessionInfo;
pub use signing::RequestSigner;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
