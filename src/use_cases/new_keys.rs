//! Generate new device keys use case
//!
//! Generates a fresh key pair, writes the key files and installs the pair
//! on the attached device, verifying the result by reading it back.

use std::io::Write;

use tracing::info;

use super::flash::{install_key_pair, resolve_protocol};
use crate::error::DfuKeysResult;
use crate::logic::generate_key_pair;
use crate::model::{KeyPair, Protocol};
use crate::ports::{key_base, DfuTransport, KeyStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewKeysOptions {
    /// Key file name; `.pem`/`.der` is stripped to get the artifact base
    pub filename: Option<String>,
    /// Defaults to the protocol the device currently uses
    pub protocol: Option<Protocol>,
    pub force: bool,
}

/// Generate a key pair and install it on the first DFU device
///
/// The device is located before anything is generated, so a missing device
/// leaves no key files behind.
pub fn new_keys<T, S>(
    transport: &T,
    store: &S,
    options: &NewKeysOptions,
    out: &mut impl Write,
) -> DfuKeysResult<KeyPair>
where
    T: DfuTransport,
    S: KeyStore,
{
    let device = transport.find_first()?;
    let protocol = resolve_protocol(transport, &device, options.protocol)?;

    let pair = generate_key_pair(protocol)?;
    let base = key_base(options.filename.as_deref());
    store.write_key_pair(&pair, &base, options.force)?;

    install_key_pair(transport, &device, &pair)?;
    info!(%device, %protocol, "Installed new device keys");

    writeln!(out, "New Key Created!")?;
    Ok(pair)
}
