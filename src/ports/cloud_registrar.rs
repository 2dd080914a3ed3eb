//! CloudRegistrar trait - capability to register device keys with the cloud

use crate::error::DfuKeysResult;
use crate::model::{DeviceId, PublicKey};

/// Capability to tell the cloud which public key a device will present
///
/// Failures carry the cloud's own classification (`CloudError`) and are
/// never remapped by callers.
pub trait CloudRegistrar {
    /// Register `key` as the identity of `device_id`
    ///
    /// `product_id` scopes the registration to a product when the device
    /// belongs to one.
    fn register_device_key(
        &self,
        device_id: &DeviceId,
        key: &PublicKey,
        product_id: Option<&str>,
    ) -> DfuKeysResult<()>;
}
