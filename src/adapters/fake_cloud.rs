use std::cell::RefCell;

use crate::error::{CloudError, DfuKeysResult};
use crate::model::{DeviceId, PublicKey};
use crate::ports::CloudRegistrar;

/// Recorded registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub device_id: DeviceId,
    pub key: PublicKey,
    pub product_id: Option<String>,
}

/// In-memory cloud that accepts every key unless told to reject
#[derive(Debug, Default)]
pub struct FakeCloud {
    pub registrations: RefCell<Vec<Registration>>,
    pub reject_with: RefCell<Option<CloudError>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(err: CloudError) -> Self {
        Self {
            registrations: RefCell::new(Vec::new()),
            reject_with: RefCell::new(Some(err)),
        }
    }

    /// Key the cloud currently holds for `device_id`
    pub fn key_for(&self, device_id: &DeviceId) -> Option<PublicKey> {
        self.registrations
            .borrow()
            .iter()
            .rev()
            .find(|r| &r.device_id == device_id)
            .map(|r| r.key.clone())
    }
}

impl CloudRegistrar for FakeCloud {
    fn register_device_key(
        &self,
        device_id: &DeviceId,
        key: &PublicKey,
        product_id: Option<&str>,
    ) -> DfuKeysResult<()> {
        if let Some(err) = self.reject_with.borrow().clone() {
            return Err(err.into());
        }
        self.registrations.borrow_mut().push(Registration {
            device_id: device_id.clone(),
            key: key.clone(),
            product_id: product_id.map(str::to_string),
        });
        Ok(())
    }
}
