//! dfukeys: device key provisioning over DFU
//!
//! Generates device key pairs, installs them on devices attached in DFU
//! mode, registers public keys with the cloud and manages the server key
//! and transport protocol a device uses.

mod adapters;
pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use error::{DfuKeysError, DfuKeysResult};

// Re-export public API
pub use api::{DefaultSession, Operation, Session};
pub use config::Settings;
