//! Ports (traits) for provisioning operations
//!
//! These traits define the capabilities the use cases depend on. They
//! represent ports in hexagonal architecture - the core depends on these
//! abstractions, not on dfu-util, the file system or the cloud API.

mod cloud_registrar;
pub mod contract_tests;
mod dfu_transport;
mod key_store;

pub use cloud_registrar::CloudRegistrar;
pub use dfu_transport::{DeviceHandle, DfuTransport};
pub use key_store::{artifact_path, key_base, KeyStore, DEFAULT_KEY_BASE};
