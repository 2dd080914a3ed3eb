//! Install or format the server public key record
//!
//! With a device type the record is only formatted into a local file for
//! that device type; otherwise it is written to the attached device.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use super::flash::{resolve_protocol, verify_slot};
use crate::error::{CodecError, DfuKeysError, DfuKeysResult};
use crate::logic::{codec, layout};
use crate::model::{DeviceType, Protocol, PublicKey, ServerAddress, ServerKeyRecord, Slot};
use crate::ports::{key_base, DfuTransport, KeyStore};

const TCP_SERVER_KEY: &str = include_str!("../../assets/tcp_server_public.pem");
const UDP_SERVER_KEY: &str = include_str!("../../assets/udp_server_public.pem");

/// Message shown when format mode is requested without an input file
pub const FILENAME_REQUIRED: &str = "`filename` parameter is required when `--deviceType` is set";

/// Cloud public keys used when no key file is given
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeys {
    pub tcp: PublicKey,
    pub udp: PublicKey,
}

impl ServerKeys {
    /// Keys bundled with the binary
    pub fn builtin() -> Result<Self, CodecError> {
        let parse = |pem: &str| {
            PublicKey::from_pem(pem).map_err(|err| CodecError::MalformedKeyData {
                reason: format!("bundled server key: {err}"),
            })
        };
        Ok(Self {
            tcp: parse(TCP_SERVER_KEY)?,
            udp: parse(UDP_SERVER_KEY)?,
        })
    }

    pub fn for_protocol(&self, protocol: Protocol) -> &PublicKey {
        match protocol {
            Protocol::Tcp => &self.tcp,
            Protocol::Udp => &self.udp,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerKeyOptions {
    /// Server public key file; the bundled key is used when absent
    pub filename: Option<String>,
    /// Output of format mode, default `<base>-<devicetype>.der`
    pub output_filename: Option<String>,
    /// Selects format mode
    pub device_type: Option<DeviceType>,
    pub host: Option<ServerAddress>,
    pub port: Option<u16>,
    pub protocol: Option<Protocol>,
    pub force: bool,
}

/// Run the server key operation in the mode `options` select
pub fn server_key<T, S>(
    transport: &T,
    store: &S,
    defaults: &ServerKeys,
    options: &ServerKeyOptions,
    out: &mut impl Write,
) -> DfuKeysResult<ServerKeyRecord>
where
    T: DfuTransport,
    S: KeyStore,
{
    match options.device_type {
        Some(device_type) => {
            let filename = options
                .filename
                .as_deref()
                .ok_or_else(|| DfuKeysError::Usage(FILENAME_REQUIRED.to_string()))?;
            let (record, _) = format_server_key(store, device_type, filename, options)?;
            writeln!(
                out,
                "Okay!  Formatted server key file generated for this type of device."
            )?;
            Ok(record)
        }
        None => {
            let record = write_server_key(transport, store, defaults, options)?;
            writeln!(out, "Okay!  New keys in place, your device will not restart.")?;
            Ok(record)
        }
    }
}

/// Build the record for `device_type` and write it to a local file only
pub fn format_server_key<S: KeyStore>(
    store: &S,
    device_type: DeviceType,
    filename: &str,
    options: &ServerKeyOptions,
) -> DfuKeysResult<(ServerKeyRecord, PathBuf)> {
    let key = store.read_public_key(Path::new(filename))?;
    let record = build_record(device_type, key, options)?;
    let image = codec::encode_server_key_record(&record, device_type)?;

    let output = match &options.output_filename {
        Some(output) => PathBuf::from(output),
        None => {
            let mut name = key_base(Some(filename)).into_os_string();
            name.push(format!("-{}.der", device_type.name().to_ascii_lowercase()));
            PathBuf::from(name)
        }
    };
    let written = store.write_image(&image, &output, options.force)?;
    info!(path = %written.display(), %device_type, "Formatted server key");
    Ok((record, written))
}

fn write_server_key<T, S>(
    transport: &T,
    store: &S,
    defaults: &ServerKeys,
    options: &ServerKeyOptions,
) -> DfuKeysResult<ServerKeyRecord>
where
    T: DfuTransport,
    S: KeyStore,
{
    let device = transport.find_first()?;
    let device_type = device.require_type()?;

    let key = match &options.filename {
        Some(filename) => store.read_public_key(Path::new(filename))?,
        None => {
            let protocol = resolve_protocol(transport, &device, options.protocol)?;
            defaults.for_protocol(protocol).clone()
        }
    };
    let record = build_record(device_type, key, options)?;
    let image = codec::encode_server_key_record(&record, device_type)?;

    let slot = Slot::ServerPublicKey(record.protocol);
    transport.write_slot(&device, slot, &image)?;
    verify_slot(transport, &device, slot, &image)?;
    info!(%device, url = %record.url(), "Installed server key");
    Ok(record)
}

/// Record for `key` with the requested or the device type's default address
fn build_record(
    device_type: DeviceType,
    key: PublicKey,
    options: &ServerKeyOptions,
) -> Result<ServerKeyRecord, CodecError> {
    let key_protocol = Protocol::for_algorithm(key.algorithm());
    let protocol = options.protocol.unwrap_or(key_protocol);
    if protocol != key_protocol {
        return Err(CodecError::AlgorithmMismatch {
            algorithm: key.algorithm().to_string(),
            protocol: protocol.to_string(),
        });
    }

    let address = match &options.host {
        Some(host) => host.clone(),
        None => {
            let host = layout::layout(device_type)?
                .default_server(protocol)
                .ok_or_else(|| CodecError::UnsupportedProtocol {
                    device: device_type.to_string(),
                    feature: format!("the {protocol} protocol"),
                })?;
            ServerAddress::Domain(host.to_string())
        }
    };

    Ok(ServerKeyRecord {
        server_public_key: key,
        address,
        port: options.port,
        protocol,
        device_type: Some(device_type),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fake_dfu::FakeDfu;
    use crate::adapters::FileKeyStore;
    use crate::model::KeyPair;

    const EC_FIXTURE: &str = "tests/fixtures/device_ec.pem";

    fn defaults() -> ServerKeys {
        ServerKeys::builtin().unwrap()
    }

    #[test]
    fn test_builtin_keys_match_protocols() {
        let keys = defaults();
        assert_eq!(Protocol::for_algorithm(keys.tcp.algorithm()), Protocol::Tcp);
        assert_eq!(Protocol::for_algorithm(keys.udp.algorithm()), Protocol::Udp);
    }

    #[test]
    fn test_device_mode_writes_default_record() {
        let fake = FakeDfu::with_device(DeviceType::Electron);
        let mut out = Vec::new();

        let record = server_key(
            &fake,
            &FileKeyStore,
            &defaults(),
            &ServerKeyOptions::default(),
            &mut out,
        )
        .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Okay!  New keys in place, your device will not restart.\n"
        );
        assert_eq!(record.url(), "udp://$id.udp.particle.io:5684");
        let stored = codec::decode_server_key_record(
            &fake.slot_bytes(Slot::ServerPublicKey(Protocol::Udp)),
            DeviceType::Electron,
        )
        .unwrap();
        assert_eq!(stored, record);
    }

    #[test]
    fn test_device_mode_with_custom_address() {
        let fake = FakeDfu::with_device(DeviceType::Photon);
        let options = ServerKeyOptions {
            host: Some("10.1.2.3".parse().unwrap()),
            port: Some(5700),
            ..ServerKeyOptions::default()
        };

        let record = server_key(&fake, &FileKeyStore, &defaults(), &options, &mut Vec::new()).unwrap();

        assert_eq!(record.url(), "tcp://10.1.2.3:5700");
        assert_eq!(fake.downloads(), 1);
    }

    #[test]
    fn test_device_mode_without_device() {
        let err = server_key(
            &FakeDfu::empty(),
            &FileKeyStore,
            &defaults(),
            &ServerKeyOptions::default(),
            &mut Vec::new(),
        )
        .unwrap_err();
        assert!(err.is_device_not_found());
    }

    #[test]
    fn test_format_mode_requires_filename() {
        let fake = FakeDfu::with_device(DeviceType::Electron);
        let options = ServerKeyOptions {
            device_type: Some(DeviceType::Electron),
            ..ServerKeyOptions::default()
        };

        let err = server_key(&fake, &FileKeyStore, &defaults(), &options, &mut Vec::new()).unwrap_err();

        assert!(matches!(err, DfuKeysError::Usage(ref m) if m == FILENAME_REQUIRED));
        assert!(fake.ops.borrow().is_empty());
    }

    #[test]
    fn test_format_mode_writes_file_without_device_io() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("server.pem");
        std::fs::copy(EC_FIXTURE, &input).unwrap();
        let fake = FakeDfu::empty();
        let options = ServerKeyOptions {
            filename: Some(input.display().to_string()),
            device_type: Some(DeviceType::Argon),
            ..ServerKeyOptions::default()
        };
        let mut out = Vec::new();

        let record = server_key(&fake, &FileKeyStore, &defaults(), &options, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Okay!  Formatted server key file generated for this type of device.\n"
        );
        assert!(fake.ops.borrow().is_empty());

        let written = std::fs::read(dir.path().join("server-argon.der")).unwrap();
        assert_eq!(written.len(), 320);
        let decoded = codec::decode_server_key_record(&written, DeviceType::Argon).unwrap();
        assert_eq!(decoded, record);
        let expected = KeyPair::from_pem(include_str!("../../tests/fixtures/device_ec.pem")).unwrap();
        assert_eq!(decoded.server_public_key, *expected.public());
    }

    #[test]
    fn test_protocol_must_match_key() {
        let dir = tempfile::tempdir().unwrap();
        let options = ServerKeyOptions {
            filename: Some(EC_FIXTURE.to_string()),
            output_filename: Some(dir.path().join("out.der").display().to_string()),
            device_type: Some(DeviceType::Photon),
            protocol: Some(Protocol::Tcp),
            ..ServerKeyOptions::default()
        };

        let err = format_server_key(&FileKeyStore, DeviceType::Photon, EC_FIXTURE, &options)
            .unwrap_err();
        assert!(matches!(
            err,
            DfuKeysError::Codec(CodecError::AlgorithmMismatch { .. })
        ));
    }
}
