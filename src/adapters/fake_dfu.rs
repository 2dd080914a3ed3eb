use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::error::{DeviceError, DfuKeysResult};
use crate::logic::codec::ERASED;
use crate::logic::SlotRegion;
use crate::model::{DeviceType, Slot};
use crate::ports::{DeviceHandle, DfuTransport};
use crate::use_cases::CancelFlag;

/// Size of each simulated alternate setting
const ALT_SIZE: usize = 0x4000;

/// Transfer recorded by the fake, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeOp {
    List,
    Upload(SlotRegion),
    Download(SlotRegion),
    Leave,
}

/// In-memory DFU transport with one optional attached device
///
/// Flash starts erased. Individual operations can be made to fail to
/// exercise partial-failure paths.
#[derive(Debug)]
pub struct FakeDfu {
    pub device: Option<DeviceHandle>,
    flash: RefCell<HashMap<u8, Vec<u8>>>,
    in_dfu: Cell<bool>,
    pub ops: RefCell<Vec<FakeOp>>,
    /// Fail every download after this many succeeded
    pub fail_download_after: Cell<Option<usize>>,
    /// Return this many bytes less than requested on upload
    pub short_upload: Cell<usize>,
    /// Corrupt the first byte of every download
    pub corrupt_writes: Cell<bool>,
    pub fail_leave: Cell<bool>,
    /// Uploads answer `Timeout` instead of data
    pub hang_uploads: Cell<bool>,
    /// Raised by the first download, like an interrupt arriving mid-transfer
    pub cancel_on_download: RefCell<Option<CancelFlag>>,
}

impl FakeDfu {
    pub fn with_device(device_type: DeviceType) -> Self {
        let (vendor_id, product_id) = device_type.usb_id();
        Self::new(Some(
            DeviceHandle::new(vendor_id, product_id, "1-1").with_serial("fake"),
        ))
    }

    pub fn empty() -> Self {
        Self::new(None)
    }

    fn new(device: Option<DeviceHandle>) -> Self {
        Self {
            device,
            flash: RefCell::new(HashMap::new()),
            in_dfu: Cell::new(true),
            ops: RefCell::new(Vec::new()),
            fail_download_after: Cell::new(None),
            short_upload: Cell::new(0),
            corrupt_writes: Cell::new(false),
            fail_leave: Cell::new(false),
            hang_uploads: Cell::new(false),
            cancel_on_download: RefCell::new(None),
        }
    }

    /// Whether the device is still in DFU mode
    pub fn in_dfu(&self) -> bool {
        self.in_dfu.get()
    }

    /// Raw flash contents of `slot`, bypassing the transport
    pub fn slot_bytes(&self, slot: Slot) -> Vec<u8> {
        let device = self.device.as_ref().and_then(|d| d.device_type);
        let region = match device.map(|d| crate::logic::layout::region_for(d, slot)) {
            Some(Ok(region)) => region,
            _ => return Vec::new(),
        };
        self.read_region(region)
    }

    /// Put bytes into flash directly, as if written by earlier firmware
    pub fn preload(&self, slot: Slot, data: &[u8]) {
        let device_type = self
            .device
            .as_ref()
            .and_then(|d| d.device_type)
            .expect("preload needs a known device");
        let region = crate::logic::layout::region_for(device_type, slot).expect("slot in layout");
        let mut image = vec![ERASED; region.length];
        image[..data.len()].copy_from_slice(data);
        self.write_region(region, &image);
    }

    pub fn downloads(&self) -> usize {
        self.ops
            .borrow()
            .iter()
            .filter(|op| matches!(op, FakeOp::Download(_)))
            .count()
    }

    fn attached(&self, device: &DeviceHandle) -> DfuKeysResult<()> {
        match &self.device {
            Some(attached) if attached == device && self.in_dfu.get() => Ok(()),
            _ => Err(DeviceError::NotFound.into()),
        }
    }

    fn read_region(&self, region: SlotRegion) -> Vec<u8> {
        let mut flash = self.flash.borrow_mut();
        let alt = flash.entry(region.alt).or_insert_with(|| vec![ERASED; ALT_SIZE]);
        let start = region.offset as usize;
        alt[start..start + region.length].to_vec()
    }

    fn write_region(&self, region: SlotRegion, data: &[u8]) {
        let mut flash = self.flash.borrow_mut();
        let alt = flash.entry(region.alt).or_insert_with(|| vec![ERASED; ALT_SIZE]);
        let start = region.offset as usize;
        alt[start..start + data.len()].copy_from_slice(data);
    }
}

impl DfuTransport for FakeDfu {
    fn list_dfu_devices(&self) -> DfuKeysResult<Vec<DeviceHandle>> {
        self.ops.borrow_mut().push(FakeOp::List);
        Ok(self
            .device
            .iter()
            .filter(|_| self.in_dfu.get())
            .cloned()
            .collect())
    }

    fn upload(&self, device: &DeviceHandle, region: SlotRegion) -> DfuKeysResult<Vec<u8>> {
        self.attached(device)?;
        self.ops.borrow_mut().push(FakeOp::Upload(region));
        if self.hang_uploads.get() {
            return Err(DeviceError::Timeout {
                operation: "upload".to_string(),
                seconds: 1,
            }
            .into());
        }
        let mut bytes = self.read_region(region);
        bytes.truncate(bytes.len().saturating_sub(self.short_upload.get()));
        Ok(bytes)
    }

    fn download(&self, device: &DeviceHandle, region: SlotRegion, data: &[u8]) -> DfuKeysResult<()> {
        self.attached(device)?;
        if let Some(cancel) = self.cancel_on_download.borrow().as_ref() {
            cancel.cancel();
        }
        if let Some(limit) = self.fail_download_after.get() {
            if self.downloads() >= limit {
                return Err(DeviceError::TransferFailed {
                    operation: "download".to_string(),
                    reason: "simulated failure".to_string(),
                }
                .into());
            }
        }
        self.ops.borrow_mut().push(FakeOp::Download(region));
        let mut data = data.to_vec();
        if self.corrupt_writes.get() {
            if let Some(first) = data.first_mut() {
                *first ^= 0xFF;
            }
        }
        self.write_region(region, &data);
        Ok(())
    }

    fn leave(&self, device: &DeviceHandle) -> DfuKeysResult<()> {
        self.attached(device)?;
        self.ops.borrow_mut().push(FakeOp::Leave);
        if self.fail_leave.get() {
            return Err(DeviceError::TransferFailed {
                operation: "leave".to_string(),
                reason: "simulated failure".to_string(),
            }
            .into());
        }
        self.in_dfu.set(false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract_tests_for;
    use crate::ports::contract_tests::dfu_contract;

    contract_tests_for!(
        fake_dfu_contract,
        make = || FakeDfu::with_device(DeviceType::Photon),
        tests = {
            test_find_first_device => dfu_contract::test_find_first_device,
            test_listing_is_restartable => dfu_contract::test_listing_is_restartable,
            test_write_then_read_slot => dfu_contract::test_write_then_read_slot,
            test_rewrite_is_idempotent => dfu_contract::test_rewrite_is_idempotent,
            test_erase_slot => dfu_contract::test_erase_slot,
            test_slot_overflow => dfu_contract::test_slot_overflow,
            test_writes_do_not_touch_neighbours => dfu_contract::test_writes_do_not_touch_neighbours,
            test_unsupported_slot_is_codec_error => dfu_contract::test_unsupported_slot_is_codec_error,
        }
    );

    #[test]
    fn test_no_device_is_not_found() {
        let fake = FakeDfu::empty();
        assert!(fake.find_first().unwrap_err().is_device_not_found());
    }

    #[test]
    fn test_leave_drops_device_from_listing() {
        let fake = FakeDfu::with_device(DeviceType::Electron);
        let device = fake.find_first().unwrap();
        fake.leave(&device).unwrap();

        assert!(!fake.in_dfu());
        assert!(fake.list_dfu_devices().unwrap().is_empty());
        assert!(fake.read_slot(&device, Slot::TransportProtocol).is_err());
    }

    #[test]
    fn test_short_upload_is_unexpected_length() {
        let fake = FakeDfu::with_device(DeviceType::Photon);
        fake.short_upload.set(1);
        let device = fake.find_first().unwrap();

        let err = fake.read_slot(&device, Slot::DevicePublicKey(crate::model::Protocol::Udp));
        assert!(matches!(
            err.unwrap_err(),
            crate::DfuKeysError::Device(DeviceError::UnexpectedLength {
                expected: 128,
                actual: 127,
                ..
            })
        ));
    }
}
