//! Save the device public key to local files

use std::io::Write;
use std::path::PathBuf;

use tracing::info;

use super::flash::resolve_protocol;
use crate::error::DfuKeysResult;
use crate::logic::codec;
use crate::model::{Protocol, PublicKey, Slot};
use crate::ports::{key_base, DeviceHandle, DfuTransport, KeyStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveKeysOptions {
    pub filename: String,
    pub protocol: Option<Protocol>,
    pub force: bool,
}

/// Read the device public key and write `<base>.pub.pem` and `<base>.der`
pub fn save_keys<T, S>(
    transport: &T,
    store: &S,
    options: &SaveKeysOptions,
    out: &mut impl Write,
) -> DfuKeysResult<Vec<PathBuf>>
where
    T: DfuTransport,
    S: KeyStore,
{
    let device = transport.find_first()?;
    let protocol = resolve_protocol(transport, &device, options.protocol)?;
    let key = read_device_public_key(transport, &device, protocol)?;

    let written = store.write_public_key(&key, &key_base(Some(&options.filename)), options.force)?;
    info!(%device, files = written.len(), "Saved device public key");

    writeln!(out, "Saved!")?;
    Ok(written)
}

pub fn read_device_public_key<T: DfuTransport>(
    transport: &T,
    device: &DeviceHandle,
    protocol: Protocol,
) -> DfuKeysResult<PublicKey> {
    let bytes = transport.read_slot(device, Slot::DevicePublicKey(protocol))?;
    Ok(codec::decode_public_key(&bytes, protocol, device.require_type()?)?)
}
