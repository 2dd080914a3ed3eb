//! Adapters - concrete implementations of ports (traits)

mod dfu_util;
mod file_key_store;
mod http_cloud;

#[cfg(test)]
pub mod fake_cloud;
#[cfg(test)]
pub mod fake_dfu;

// Re-export for convenience
pub use dfu_util::{DfuUtil, DEFAULT_PROGRAM as DEFAULT_DFU_UTIL};
pub use file_key_store::FileKeyStore;
pub use http_cloud::{HttpCloudRegistrar, DEFAULT_API_URL};
