//! Register a public key file with the cloud

use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::error::DfuKeysResult;
use crate::model::{DeviceId, PublicKey};
use crate::ports::{CloudRegistrar, KeyStore};

/// Send the public key found at `filename` as the identity of `device_id`
///
/// A private key file is accepted too; its public half is sent.
pub fn send_key<C, S>(
    cloud: &C,
    store: &S,
    device_id: &DeviceId,
    filename: &Path,
    product_id: Option<&str>,
    out: &mut impl Write,
) -> DfuKeysResult<PublicKey>
where
    C: CloudRegistrar,
    S: KeyStore,
{
    let key = store.read_public_key(filename)?;
    register_with_cloud(cloud, device_id, &key, product_id, out)?;
    Ok(key)
}

/// Register `key` for `device_id`, reporting progress on `out`
pub fn register_with_cloud<C: CloudRegistrar>(
    cloud: &C,
    device_id: &DeviceId,
    key: &PublicKey,
    product_id: Option<&str>,
    out: &mut impl Write,
) -> DfuKeysResult<()> {
    writeln!(out, "attempting to add a new public key for device {device_id}")?;
    cloud.register_device_key(device_id, key, product_id)?;
    info!(%device_id, algorithm = %key.algorithm(), "Public key registered");
    writeln!(out, "submitting public key succeeded!")?;
    Ok(())
}
