//! Device hardware variants and their USB identity in DFU mode

use std::fmt;

/// Hardware variant of a device
///
/// Each variant enumerates with a distinct USB vendor/product id while in
/// DFU mode, which is how attached devices are recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Core,
    Photon,
    P1,
    Electron,
    Argon,
    Boron,
    Xenon,
}

impl DeviceType {
    pub const ALL: [DeviceType; 7] = [
        DeviceType::Core,
        DeviceType::Photon,
        DeviceType::P1,
        DeviceType::Electron,
        DeviceType::Argon,
        DeviceType::Boron,
        DeviceType::Xenon,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DeviceType::Core => "Core",
            DeviceType::Photon => "Photon",
            DeviceType::P1 => "P1",
            DeviceType::Electron => "Electron",
            DeviceType::Argon => "Argon",
            DeviceType::Boron => "Boron",
            DeviceType::Xenon => "Xenon",
        }
    }

    /// USB (vendor, product) id while in DFU mode
    pub fn usb_id(self) -> (u16, u16) {
        match self {
            DeviceType::Core => (0x1d50, 0x607f),
            DeviceType::Photon => (0x2b04, 0xd006),
            DeviceType::P1 => (0x2b04, 0xd008),
            DeviceType::Electron => (0x2b04, 0xd00a),
            DeviceType::Argon => (0x2b04, 0xd00c),
            DeviceType::Boron => (0x2b04, 0xd00d),
            DeviceType::Xenon => (0x2b04, 0xd00e),
        }
    }

    pub fn from_usb_id(vendor_id: u16, product_id: u16) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|device_type| device_type.usb_id() == (vendor_id, product_id))
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_ids_are_unique() {
        for device_type in DeviceType::ALL {
            let (vid, pid) = device_type.usb_id();
            assert_eq!(DeviceType::from_usb_id(vid, pid), Some(device_type));
        }
    }

    #[test]
    fn test_unknown_usb_id() {
        assert_eq!(DeviceType::from_usb_id(0x0483, 0xdf11), None);
    }

    #[test]
    fn test_display_uses_product_name() {
        assert_eq!(DeviceType::P1.to_string(), "P1");
        assert_eq!(DeviceType::Electron.to_string(), "Electron");
    }
}
