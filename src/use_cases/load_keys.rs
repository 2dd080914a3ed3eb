//! Load a key pair from a file onto the device

use std::io::Write;
use std::path::Path;

use tracing::info;

use super::flash::{ensure_supported, install_key_pair};
use crate::error::DfuKeysResult;
use crate::model::KeyPair;
use crate::ports::{DfuTransport, KeyStore};

/// Install the key pair stored at `filename` on the first DFU device
///
/// The key's algorithm decides the protocol slots it is written to.
pub fn load_keys<T, S>(
    transport: &T,
    store: &S,
    filename: &Path,
    out: &mut impl Write,
) -> DfuKeysResult<KeyPair>
where
    T: DfuTransport,
    S: KeyStore,
{
    let pair = store.read_key_pair(filename)?;
    let device = transport.find_first()?;
    ensure_supported(device.require_type()?, pair.protocol())?;

    install_key_pair(transport, &device, &pair)?;
    info!(%device, protocol = %pair.protocol(), "Loaded device keys");

    writeln!(out, "Saved!")?;
    Ok(pair)
}
