//! DfuTransport trait - byte-region I/O against a device in DFU mode

use std::fmt;

use tracing::debug;

use crate::error::{CodecError, DeviceError, DfuKeysResult};
use crate::logic::codec::ERASED;
use crate::logic::{layout, SlotRegion};
use crate::model::{DeviceType, Slot};

/// A device enumerated on the bus in DFU mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub vendor_id: u16,
    pub product_id: u16,
    /// `None` when the USB id is not a known device type
    pub device_type: Option<DeviceType>,
    pub serial: Option<String>,
    /// Bus path, used to address this device when several are attached
    pub path: String,
}

impl DeviceHandle {
    pub fn new(vendor_id: u16, product_id: u16, path: impl Into<String>) -> Self {
        Self {
            vendor_id,
            product_id,
            device_type: DeviceType::from_usb_id(vendor_id, product_id),
            serial: None,
            path: path.into(),
        }
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    pub fn usb_id(&self) -> String {
        format!("{:04x}:{:04x}", self.vendor_id, self.product_id)
    }

    /// Device type, or `UnsupportedDeviceType` for unknown hardware
    pub fn require_type(&self) -> Result<DeviceType, CodecError> {
        self.device_type
            .ok_or_else(|| CodecError::UnsupportedDeviceType {
                device: self.usb_id(),
            })
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device_type {
            Some(device_type) => write!(f, "{device_type} [{}] at {}", self.usb_id(), self.path),
            None => write!(f, "[{}] at {}", self.usb_id(), self.path),
        }
    }
}

/// Capability to move bytes to and from device flash over DFU
///
/// Implementors only provide raw region transfers. Slot resolution, length
/// checks and padding live in the provided methods so every transport
/// shares them.
///
/// Every call is bounded by the implementor's timeout; an absent device is
/// `DeviceError::NotFound` and an unresponsive one `DeviceError::Timeout`.
pub trait DfuTransport {
    /// Scan the bus for devices in DFU mode
    ///
    /// Each call re-scans, so the result reflects devices plugged in or
    /// reset since the previous call.
    fn list_dfu_devices(&self) -> DfuKeysResult<Vec<DeviceHandle>>;

    /// Read `region` from the device
    fn upload(&self, device: &DeviceHandle, region: SlotRegion) -> DfuKeysResult<Vec<u8>>;

    /// Write `data` at the start of `region`
    ///
    /// A returned error means the write may or may not have reached flash;
    /// callers that need certainty read the region back.
    fn download(&self, device: &DeviceHandle, region: SlotRegion, data: &[u8])
        -> DfuKeysResult<()>;

    /// Ask the device to leave DFU mode and boot its firmware
    fn leave(&self, device: &DeviceHandle) -> DfuKeysResult<()>;

    fn find_first(&self) -> DfuKeysResult<DeviceHandle> {
        let device = self
            .list_dfu_devices()?
            .into_iter()
            .next()
            .ok_or(DeviceError::NotFound)?;
        debug!(%device, "Using DFU device");
        Ok(device)
    }

    /// Read a whole slot
    fn read_slot(&self, device: &DeviceHandle, slot: Slot) -> DfuKeysResult<Vec<u8>> {
        let region = layout::region_for(device.require_type()?, slot)?;
        let bytes = self.upload(device, region)?;
        if bytes.len() != region.length {
            return Err(DeviceError::UnexpectedLength {
                slot: slot.to_string(),
                expected: region.length,
                actual: bytes.len(),
            }
            .into());
        }
        Ok(bytes)
    }

    /// Write a slot, filling the remainder with erased flash
    fn write_slot(&self, device: &DeviceHandle, slot: Slot, data: &[u8]) -> DfuKeysResult<()> {
        let region = layout::region_for(device.require_type()?, slot)?;
        if data.len() > region.length {
            return Err(DeviceError::SlotOverflow {
                slot: slot.to_string(),
                len: data.len(),
                capacity: region.length,
            }
            .into());
        }
        let mut image = vec![ERASED; region.length];
        image[..data.len()].copy_from_slice(data);
        debug!(%slot, alt = region.alt, offset = region.offset, "Writing slot");
        self.download(device, region, &image)
    }

    /// Reset a slot to erased flash
    fn erase_slot(&self, device: &DeviceHandle, slot: Slot) -> DfuKeysResult<()> {
        self.write_slot(device, slot, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_resolves_known_usb_id() {
        let handle = DeviceHandle::new(0x2b04, 0xd006, "1-1");
        assert_eq!(handle.device_type, Some(DeviceType::Photon));
        assert_eq!(handle.to_string(), "Photon [2b04:d006] at 1-1");
    }

    #[test]
    fn test_unknown_usb_id_is_unsupported() {
        let handle = DeviceHandle::new(0x0483, 0xdf11, "2-4");
        assert_eq!(
            handle.require_type().unwrap_err(),
            CodecError::UnsupportedDeviceType {
                device: "0483:df11".to_string()
            }
        );
    }
}
