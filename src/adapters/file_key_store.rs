//! Key files on local disk
//!
//! A key is stored as up to three companion artifacts sharing one base
//! name: the private key PEM, the public key PEM and the public key DER.
//! Artifacts are staged as temporary files next to their destination and
//! only then persisted, so a failed write never leaves half a set behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{DfuKeysResult, KeyStoreError};
use crate::model::{pem_label, KeyPair, PublicKey};
use crate::ports::{artifact_path, KeyStore};

pub const PRIVATE_PEM_SUFFIX: &str = ".pem";
pub const PUBLIC_PEM_SUFFIX: &str = ".pub.pem";
pub const PUBLIC_DER_SUFFIX: &str = ".der";

/// File system key store rooted at the paths it is given
#[derive(Debug, Clone, Copy, Default)]
pub struct FileKeyStore;

impl FileKeyStore {
    pub fn new() -> Self {
        Self
    }

    fn write_artifacts(
        &self,
        artifacts: Vec<(PathBuf, Vec<u8>)>,
        force: bool,
    ) -> DfuKeysResult<Vec<PathBuf>> {
        if !force {
            if let Some((path, _)) = artifacts.iter().find(|(path, _)| path.exists()) {
                return Err(KeyStoreError::FileExists { path: path.clone() }.into());
            }
        }

        let mut staged = Vec::with_capacity(artifacts.len());
        for (path, contents) in artifacts {
            let file = stage(&path, &contents).map_err(|err| KeyStoreError::WriteFailed {
                path: path.clone(),
                reason: err.to_string(),
            })?;
            staged.push((path, file));
        }

        let mut persisted: Vec<PathBuf> = Vec::with_capacity(staged.len());
        for (path, file) in staged {
            let result = if force {
                file.persist(&path).map(|_| ())
            } else {
                file.persist_noclobber(&path).map(|_| ())
            };

            if let Err(err) = result {
                for done in &persisted {
                    if let Err(remove_err) = fs::remove_file(done) {
                        warn!(path = %done.display(), error = %remove_err, "Failed to remove partial key file");
                    }
                }
                let err = if err.error.kind() == io::ErrorKind::AlreadyExists {
                    KeyStoreError::FileExists { path }
                } else {
                    KeyStoreError::WriteFailed {
                        path,
                        reason: err.error.to_string(),
                    }
                };
                return Err(err.into());
            }
            debug!(path = %path.display(), "Wrote key file");
            persisted.push(path);
        }

        info!(files = persisted.len(), "Key files written");
        Ok(persisted)
    }
}

impl KeyStore for FileKeyStore {
    fn write_key_pair(
        &self,
        pair: &KeyPair,
        base: &Path,
        force: bool,
    ) -> DfuKeysResult<Vec<PathBuf>> {
        let private_pem = pair
            .private_pem()
            .map_err(|err| invalid(artifact_path(base, PRIVATE_PEM_SUFFIX), err))?;
        let public_pem = pair
            .public()
            .to_pem()
            .map_err(|err| invalid(artifact_path(base, PUBLIC_PEM_SUFFIX), err))?;

        self.write_artifacts(
            vec![
                (artifact_path(base, PRIVATE_PEM_SUFFIX), private_pem.into_bytes()),
                (artifact_path(base, PUBLIC_PEM_SUFFIX), public_pem.into_bytes()),
                (
                    artifact_path(base, PUBLIC_DER_SUFFIX),
                    pair.public().as_der().to_vec(),
                ),
            ],
            force,
        )
    }

    fn write_public_key(
        &self,
        key: &PublicKey,
        base: &Path,
        force: bool,
    ) -> DfuKeysResult<Vec<PathBuf>> {
        let public_pem = key
            .to_pem()
            .map_err(|err| invalid(artifact_path(base, PUBLIC_PEM_SUFFIX), err))?;

        self.write_artifacts(
            vec![
                (artifact_path(base, PUBLIC_PEM_SUFFIX), public_pem.into_bytes()),
                (artifact_path(base, PUBLIC_DER_SUFFIX), key.as_der().to_vec()),
            ],
            force,
        )
    }

    fn write_image(&self, bytes: &[u8], path: &Path, force: bool) -> DfuKeysResult<PathBuf> {
        self.write_artifacts(vec![(path.to_path_buf(), bytes.to_vec())], force)?;
        Ok(path.to_path_buf())
    }

    fn read_key_pair(&self, path: &Path) -> DfuKeysResult<KeyPair> {
        let path = resolve(path, &[PRIVATE_PEM_SUFFIX]);
        let bytes = read(&path)?;
        let pair = match std::str::from_utf8(&bytes).ok().filter(|text| pem_label(text).is_some()) {
            Some(text) => KeyPair::from_pem(text),
            None => KeyPair::from_der(&bytes),
        };
        pair.map_err(|err| invalid(path, err).into())
    }

    fn read_public_key(&self, path: &Path) -> DfuKeysResult<PublicKey> {
        let path = resolve(
            path,
            &[PUBLIC_PEM_SUFFIX, PRIVATE_PEM_SUFFIX, PUBLIC_DER_SUFFIX],
        );
        let bytes = read(&path)?;
        let key = match std::str::from_utf8(&bytes).ok().filter(|text| pem_label(text).is_some()) {
            Some(text) if pem_label(text).is_some_and(|label| label.contains("PRIVATE KEY")) => {
                KeyPair::from_pem(text).map(|pair| pair.public().clone())
            }
            Some(text) => PublicKey::from_pem(text),
            None => PublicKey::from_der(&bytes)
                .or_else(|_| KeyPair::from_der(&bytes).map(|pair| pair.public().clone())),
        };
        key.map_err(|err| invalid(path, err).into())
    }
}

fn stage(path: &Path, contents: &[u8]) -> io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    Ok(file)
}

/// `path` itself if it exists, else the first existing `<path><suffix>`
fn resolve(path: &Path, suffixes: &[&str]) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }
    suffixes
        .iter()
        .map(|suffix| artifact_path(path, suffix))
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

fn read(path: &Path) -> DfuKeysResult<Vec<u8>> {
    fs::read(path).map_err(|err| {
        KeyStoreError::ReadFailed {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
        .into()
    })
}

fn invalid(path: PathBuf, err: impl std::fmt::Display) -> KeyStoreError {
    KeyStoreError::InvalidKeyFile {
        path,
        reason: err.to_string(),
    }
}
