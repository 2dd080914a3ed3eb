//! Flash layout tables
//!
//! Every device family maps each logical slot to a region of one DFU
//! alternate setting. Adding a device type means adding a table here;
//! nothing in the orchestration code knows about offsets.

use crate::error::CodecError;
use crate::model::{DeviceType, Protocol, Slot};

/// Byte region addressed through one DFU alternate setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRegion {
    pub alt: u8,
    pub offset: u32,
    pub length: usize,
}

/// Static description of one device family's flash
#[derive(Debug)]
pub struct DeviceLayout {
    pub device_types: &'static [DeviceType],
    pub default_protocol: Protocol,
    /// Default cloud host per protocol
    pub servers: &'static [(Protocol, &'static str)],
    pub slots: &'static [(Slot, SlotRegion)],
}

const fn region(alt: u8, offset: u32, length: usize) -> SlotRegion {
    SlotRegion {
        alt,
        offset,
        length,
    }
}

const TCP_SERVER: &str = "device.spark.io";
const UDP_SERVER: &str = "$id.udp.particle.io";
const MESH_SERVER: &str = "$id.udp-mesh.particle.io";

/// External flash of the first generation device
static CORE: DeviceLayout = DeviceLayout {
    device_types: &[DeviceType::Core],
    default_protocol: Protocol::Tcp,
    servers: &[(Protocol::Tcp, TCP_SERVER)],
    slots: &[
        (Slot::ServerPublicKey(Protocol::Tcp), region(1, 0x1000, 1024)),
        (Slot::DevicePrivateKey(Protocol::Tcp), region(1, 0x2000, 1024)),
        (Slot::DevicePublicKey(Protocol::Tcp), region(1, 0x2400, 512)),
    ],
};

/// Device configuration table (DCT) of second generation Wi-Fi devices
static PHOTON: DeviceLayout = DeviceLayout {
    device_types: &[DeviceType::Photon, DeviceType::P1],
    default_protocol: Protocol::Tcp,
    servers: &[(Protocol::Tcp, TCP_SERVER), (Protocol::Udp, UDP_SERVER)],
    slots: &[
        (Slot::DevicePrivateKey(Protocol::Tcp), region(1, 34, 1216)),
        (Slot::ServerPublicKey(Protocol::Tcp), region(1, 1250, 768)),
        (Slot::DevicePrivateKey(Protocol::Udp), region(1, 3106, 192)),
        (Slot::ServerPublicKey(Protocol::Udp), region(1, 3298, 320)),
        (Slot::DevicePublicKey(Protocol::Tcp), region(1, 3618, 512)),
        (Slot::DevicePublicKey(Protocol::Udp), region(1, 4130, 128)),
        (Slot::TransportProtocol, region(1, 4258, 1)),
    ],
};

static ELECTRON: DeviceLayout = DeviceLayout {
    device_types: &[DeviceType::Electron],
    default_protocol: Protocol::Udp,
    servers: &[(Protocol::Udp, UDP_SERVER)],
    slots: &[
        (Slot::DevicePrivateKey(Protocol::Udp), region(1, 3106, 192)),
        (Slot::ServerPublicKey(Protocol::Udp), region(1, 3298, 320)),
        (Slot::DevicePublicKey(Protocol::Udp), region(1, 4130, 128)),
    ],
};

static MESH: DeviceLayout = DeviceLayout {
    device_types: &[DeviceType::Argon, DeviceType::Boron, DeviceType::Xenon],
    default_protocol: Protocol::Udp,
    servers: &[(Protocol::Udp, MESH_SERVER)],
    slots: &[
        (Slot::DevicePrivateKey(Protocol::Udp), region(1, 3106, 192)),
        (Slot::ServerPublicKey(Protocol::Udp), region(1, 3298, 320)),
        (Slot::DevicePublicKey(Protocol::Udp), region(1, 4130, 128)),
    ],
};

static LAYOUTS: [&DeviceLayout; 4] = [&CORE, &PHOTON, &ELECTRON, &MESH];

/// Layout of a device type, or `UnsupportedDeviceType`
pub fn layout(device_type: DeviceType) -> Result<&'static DeviceLayout, CodecError> {
    LAYOUTS
        .iter()
        .copied()
        .find(|layout| layout.device_types.contains(&device_type))
        .ok_or_else(|| CodecError::UnsupportedDeviceType {
            device: device_type.to_string(),
        })
}

/// Region holding `slot` on `device_type`
pub fn region_for(device_type: DeviceType, slot: Slot) -> Result<SlotRegion, CodecError> {
    layout(device_type)?.region(device_type, slot)
}

impl DeviceLayout {
    pub fn region(&self, device_type: DeviceType, slot: Slot) -> Result<SlotRegion, CodecError> {
        self.slots
            .iter()
            .find(|(candidate, _)| *candidate == slot)
            .map(|(_, region)| *region)
            .ok_or_else(|| CodecError::UnsupportedProtocol {
                device: device_type.to_string(),
                feature: match slot.protocol() {
                    Some(protocol) => format!("the {protocol} protocol"),
                    None => "protocol switching".to_string(),
                },
            })
    }

    pub fn supports(&self, protocol: Protocol) -> bool {
        self.slots
            .iter()
            .any(|(slot, _)| *slot == Slot::DevicePrivateKey(protocol))
    }

    /// Whether the transport protocol can be changed on the device
    pub fn can_switch_protocol(&self) -> bool {
        self.slots
            .iter()
            .any(|(slot, _)| *slot == Slot::TransportProtocol)
    }

    pub fn default_server(&self, protocol: Protocol) -> Option<&'static str> {
        self.servers
            .iter()
            .find(|(candidate, _)| *candidate == protocol)
            .map(|(_, host)| *host)
    }
}
