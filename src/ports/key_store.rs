//! KeyStore trait - capability to persist key material locally

use std::path::{Path, PathBuf};

use crate::error::DfuKeysResult;
use crate::model::{KeyPair, PublicKey};

/// Extensions stripped from a filename argument to get the artifact base
const KEY_EXTENSIONS: [&str; 2] = ["pem", "der"];

/// Default artifact base when no filename is given
pub const DEFAULT_KEY_BASE: &str = "device";

/// Capability to read and write key files
///
/// Writes cover every companion artifact of a key or none of them.
pub trait KeyStore {
    /// Write `<base>.pem`, `<base>.pub.pem` and `<base>.der`
    ///
    /// Fails with `FileExists` if any of them exists and `force` is unset.
    fn write_key_pair(&self, pair: &KeyPair, base: &Path, force: bool)
        -> DfuKeysResult<Vec<PathBuf>>;

    /// Write `<base>.pub.pem` and `<base>.der`
    fn write_public_key(&self, key: &PublicKey, base: &Path, force: bool)
        -> DfuKeysResult<Vec<PathBuf>>;

    /// Write a formatted flash image such as a server key record
    fn write_image(&self, bytes: &[u8], path: &Path, force: bool) -> DfuKeysResult<PathBuf>;

    /// Read a private key file (PEM or DER)
    fn read_key_pair(&self, path: &Path) -> DfuKeysResult<KeyPair>;

    /// Read a public key, deriving it when `path` holds a private key
    fn read_public_key(&self, path: &Path) -> DfuKeysResult<PublicKey>;
}

/// Artifact base for a filename argument: `keys/dev.pem` becomes `keys/dev`
pub fn key_base(filename: Option<&str>) -> PathBuf {
    let filename = filename.unwrap_or(DEFAULT_KEY_BASE);
    let path = Path::new(filename);
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if KEY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) => {
            path.with_extension("")
        }
        _ => path.to_path_buf(),
    }
}

/// `<base><suffix>`, keeping any dots already in the base name
pub fn artifact_path(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
