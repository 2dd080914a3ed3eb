#[macro_export]
macro_rules! contract_tests_for {
      (
          $mod_name:ident,
          make = $make:expr,
          tests = {
            $( $test_name:ident => $tmpl:path ),+ $(,)?
        }
      ) => {
          mod $mod_name {
              use super::*;

              $(
                  #[test]
                  fn $test_name() {
                      let op = ($make)();
                      $tmpl(op);
                  }
              )+
          }
      };
  }

/// Behaviour every `DfuTransport` must share
///
/// Each template receives a transport with exactly one Photon attached.
#[cfg(test)]
pub mod dfu_contract {
    use crate::{
        error::{CodecError, DeviceError},
        logic::codec::ERASED,
        model::{DeviceType, Protocol, Slot},
        ports::DfuTransport,
        DfuKeysError,
    };

    pub(crate) fn test_find_first_device(transport: impl DfuTransport) {
        let device = transport.find_first().expect("device should be attached");
        assert_eq!(device.device_type, Some(DeviceType::Photon));
    }

    pub(crate) fn test_listing_is_restartable(transport: impl DfuTransport) {
        let first = transport.list_dfu_devices().unwrap();
        let second = transport.list_dfu_devices().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }

    pub(crate) fn test_write_then_read_slot(transport: impl DfuTransport) {
        let device = transport.find_first().unwrap();
        let slot = Slot::DevicePublicKey(Protocol::Udp);

        transport.write_slot(&device, slot, b"\x30\x01\x00").unwrap();
        let bytes = transport.read_slot(&device, slot).unwrap();

        assert_eq!(bytes.len(), 128);
        assert_eq!(&bytes[..3], b"\x30\x01\x00");
        assert!(bytes[3..].iter().all(|b| *b == ERASED));
    }

    pub(crate) fn test_rewrite_is_idempotent(transport: impl DfuTransport) {
        let device = transport.find_first().unwrap();
        let slot = Slot::TransportProtocol;

        transport.write_slot(&device, slot, &[0x01]).unwrap();
        let once = transport.read_slot(&device, slot).unwrap();
        transport.write_slot(&device, slot, &[0x01]).unwrap();
        let twice = transport.read_slot(&device, slot).unwrap();

        assert_eq!(once, twice);
    }

    pub(crate) fn test_erase_slot(transport: impl DfuTransport) {
        let device = transport.find_first().unwrap();
        let slot = Slot::DevicePrivateKey(Protocol::Udp);

        transport.write_slot(&device, slot, &[0x30; 16]).unwrap();
        transport.erase_slot(&device, slot).unwrap();

        let bytes = transport.read_slot(&device, slot).unwrap();
        assert!(bytes.iter().all(|b| *b == ERASED));
    }

    pub(crate) fn test_slot_overflow(transport: impl DfuTransport) {
        let device = transport.find_first().unwrap();
        let result = transport.write_slot(&device, Slot::TransportProtocol, &[0x00, 0x01]);

        match result.unwrap_err() {
            DfuKeysError::Device(DeviceError::SlotOverflow { capacity: 1, .. }) => { /* ok */ }
            other => panic!("expected error: {other:?}"),
        }
    }

    pub(crate) fn test_writes_do_not_touch_neighbours(transport: impl DfuTransport) {
        let device = transport.find_first().unwrap();
        let before = transport
            .read_slot(&device, Slot::ServerPublicKey(Protocol::Udp))
            .unwrap();

        transport
            .write_slot(&device, Slot::DevicePrivateKey(Protocol::Udp), &[0x30; 192])
            .unwrap();

        let after = transport
            .read_slot(&device, Slot::ServerPublicKey(Protocol::Udp))
            .unwrap();
        assert_eq!(before, after);
    }

    pub(crate) fn test_unsupported_slot_is_codec_error(transport: impl DfuTransport) {
        let mut device = transport.find_first().unwrap();
        device.device_type = None;

        match transport.read_slot(&device, Slot::TransportProtocol).unwrap_err() {
            DfuKeysError::Codec(CodecError::UnsupportedDeviceType { .. }) => { /* ok */ }
            other => panic!("expected error: {other:?}"),
        }
    }
}
