//! Slot-level steps shared by the provisioning use cases

use tracing::debug;

use crate::error::{CodecError, DfuKeysError, DfuKeysResult};
use crate::logic::{codec, layout};
use crate::model::{DeviceType, KeyPair, Protocol, Slot};
use crate::ports::{DeviceHandle, DfuTransport};

/// Protocol the device currently uses to reach the cloud
///
/// Devices that cannot switch protocols always use their default.
pub fn active_protocol<T: DfuTransport>(
    transport: &T,
    device: &DeviceHandle,
) -> DfuKeysResult<Protocol> {
    let device_type = device.require_type()?;
    let device_layout = layout::layout(device_type)?;
    if !device_layout.can_switch_protocol() {
        return Ok(device_layout.default_protocol);
    }
    let flag = transport.read_slot(device, Slot::TransportProtocol)?;
    let protocol = codec::decode_transport_flag(&flag, device_type)?;
    debug!(%protocol, "Read transport protocol");
    Ok(protocol)
}

/// `requested` if given, else the active protocol; either must be supported
pub fn resolve_protocol<T: DfuTransport>(
    transport: &T,
    device: &DeviceHandle,
    requested: Option<Protocol>,
) -> DfuKeysResult<Protocol> {
    let protocol = match requested {
        Some(protocol) => protocol,
        None => active_protocol(transport, device)?,
    };
    ensure_supported(device.require_type()?, protocol)?;
    Ok(protocol)
}

pub fn ensure_supported(device_type: DeviceType, protocol: Protocol) -> Result<(), CodecError> {
    if layout::layout(device_type)?.supports(protocol) {
        Ok(())
    } else {
        Err(CodecError::UnsupportedProtocol {
            device: device_type.to_string(),
            feature: format!("the {protocol} protocol"),
        })
    }
}

/// Write both halves of `pair` and read them back
pub fn install_key_pair<T: DfuTransport>(
    transport: &T,
    device: &DeviceHandle,
    pair: &KeyPair,
) -> DfuKeysResult<()> {
    let device_type = device.require_type()?;
    let protocol = pair.protocol();
    let private = codec::encode_key_pair(pair, device_type)?;
    let public = codec::encode_public_key(pair.public(), device_type)?;

    transport.write_slot(device, Slot::DevicePrivateKey(protocol), &private)?;
    transport.write_slot(device, Slot::DevicePublicKey(protocol), &public)?;

    verify_key_pair(transport, device, pair)
}

/// Confirm the device holds exactly `pair`
pub fn verify_key_pair<T: DfuTransport>(
    transport: &T,
    device: &DeviceHandle,
    pair: &KeyPair,
) -> DfuKeysResult<()> {
    let device_type = device.require_type()?;
    let protocol = pair.protocol();
    verify_slot(
        transport,
        device,
        Slot::DevicePrivateKey(protocol),
        &codec::encode_key_pair(pair, device_type)?,
    )?;
    verify_slot(
        transport,
        device,
        Slot::DevicePublicKey(protocol),
        &codec::encode_public_key(pair.public(), device_type)?,
    )
}

/// Read `slot` back and compare it with the image that was written
pub fn verify_slot<T: DfuTransport>(
    transport: &T,
    device: &DeviceHandle,
    slot: Slot,
    expected: &[u8],
) -> DfuKeysResult<()> {
    let actual = transport.read_slot(device, slot)?;
    if actual != expected {
        return Err(DfuKeysError::VerificationFailed {
            slot: slot.to_string(),
        });
    }
    debug!(%slot, "Verified slot contents");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fake_dfu::FakeDfu;

    const EC_PEM: &str = include_str!("../../tests/fixtures/device_ec.pem");

    #[test]
    fn test_active_protocol_defaults_when_flag_erased() {
        let fake = FakeDfu::with_device(DeviceType::Photon);
        let device = fake.find_first().unwrap();
        assert_eq!(active_protocol(&fake, &device).unwrap(), Protocol::Tcp);

        fake.preload(Slot::TransportProtocol, &[0x01]);
        assert_eq!(active_protocol(&fake, &device).unwrap(), Protocol::Udp);
    }

    #[test]
    fn test_active_protocol_without_transport_slot() {
        let fake = FakeDfu::with_device(DeviceType::Boron);
        let device = fake.find_first().unwrap();
        assert_eq!(active_protocol(&fake, &device).unwrap(), Protocol::Udp);
        assert_eq!(fake.ops.borrow().len(), 1);
    }

    #[test]
    fn test_resolve_rejects_unsupported_protocol() {
        let fake = FakeDfu::with_device(DeviceType::Electron);
        let device = fake.find_first().unwrap();
        let err = resolve_protocol(&fake, &device, Some(Protocol::Tcp)).unwrap_err();
        assert!(matches!(
            err,
            DfuKeysError::Codec(CodecError::UnsupportedProtocol { .. })
        ));
    }

    #[test]
    fn test_install_detects_corrupted_write() {
        let fake = FakeDfu::with_device(DeviceType::Electron);
        fake.corrupt_writes.set(true);
        let device = fake.find_first().unwrap();
        let pair = KeyPair::from_pem(EC_PEM).unwrap();

        let err = install_key_pair(&fake, &device, &pair).unwrap_err();
        match err {
            DfuKeysError::VerificationFailed { slot } => {
                assert_eq!(slot, "udp device private key")
            }
            other => panic!("expected error: {other:?}"),
        }
    }
}
