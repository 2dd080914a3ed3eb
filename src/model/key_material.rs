//! Device and server key material
//!
//! Keys are held in their canonical DER encoding: PKCS#1 for RSA private
//! keys, SEC1 for EC private keys and SubjectPublicKeyInfo for public keys.
//! These are the encodings devices keep in flash, so two key pairs compare
//! equal exactly when their flash images would.

use std::fmt;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use thiserror::Error;

use super::{KeyAlgorithm, Protocol};

#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    algorithm: KeyAlgorithm,
    der: Vec<u8>,
}

impl PublicKey {
    pub fn from_rsa(key: &RsaPublicKey) -> Result<Self, KeyMaterialError> {
        let der = key.to_public_key_der().map_err(encoding)?;
        Ok(Self {
            algorithm: KeyAlgorithm::Rsa,
            der: der.as_bytes().to_vec(),
        })
    }

    pub fn from_ec(key: &p256::PublicKey) -> Result<Self, KeyMaterialError> {
        let der = key.to_public_key_der().map_err(encoding)?;
        Ok(Self {
            algorithm: KeyAlgorithm::Ec,
            der: der.as_bytes().to_vec(),
        })
    }

    /// Parse a SubjectPublicKeyInfo DER public key of either algorithm
    pub fn from_der(der: &[u8]) -> Result<Self, KeyMaterialError> {
        if let Ok(key) = RsaPublicKey::from_public_key_der(der) {
            return Self::from_rsa(&key);
        }
        if let Ok(key) = p256::PublicKey::from_public_key_der(der) {
            return Self::from_ec(&key);
        }
        if let Ok(key) = RsaPublicKey::from_pkcs1_der(der) {
            return Self::from_rsa(&key);
        }
        Err(KeyMaterialError::Unrecognized {
            what: "public key",
        })
    }

    pub fn from_pem(pem: &str) -> Result<Self, KeyMaterialError> {
        match pem_label(pem) {
            Some("PUBLIC KEY") => {
                if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
                    return Self::from_rsa(&key);
                }
                let key = p256::PublicKey::from_public_key_pem(pem).map_err(decoding)?;
                Self::from_ec(&key)
            }
            Some("RSA PUBLIC KEY") => {
                let key = RsaPublicKey::from_pkcs1_pem(pem).map_err(decoding)?;
                Self::from_rsa(&key)
            }
            _ => Err(KeyMaterialError::Unrecognized {
                what: "public key",
            }),
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_pem(&self) -> Result<String, KeyMaterialError> {
        match self.algorithm {
            KeyAlgorithm::Rsa => RsaPublicKey::from_public_key_der(&self.der)
                .map_err(decoding)?
                .to_public_key_pem(LineEnding::LF)
                .map_err(encoding),
            KeyAlgorithm::Ec => p256::PublicKey::from_public_key_der(&self.der)
                .map_err(decoding)?
                .to_public_key_pem(LineEnding::LF)
                .map_err(encoding),
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tail = &self.der[self.der.len().saturating_sub(8)..];
        write!(f, "PublicKey({}, ..{})", self.algorithm, hex::encode(tail))
    }
}

/// A device key pair
///
/// Immutable once built; the protocol hint follows from the algorithm and
/// selects which flash layout the pair is written to.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    algorithm: KeyAlgorithm,
    protocol: Protocol,
    private_der: Vec<u8>,
    public: PublicKey,
}

impl KeyPair {
    pub fn from_rsa(key: &RsaPrivateKey) -> Result<Self, KeyMaterialError> {
        let der = key.to_pkcs1_der().map_err(encoding)?;
        Ok(Self {
            algorithm: KeyAlgorithm::Rsa,
            protocol: Protocol::Tcp,
            private_der: der.as_bytes().to_vec(),
            public: PublicKey::from_rsa(&RsaPublicKey::from(key))?,
        })
    }

    pub fn from_ec(key: &p256::SecretKey) -> Result<Self, KeyMaterialError> {
        let der = key.to_sec1_der().map_err(encoding)?;
        Ok(Self {
            algorithm: KeyAlgorithm::Ec,
            protocol: Protocol::Udp,
            private_der: der.to_vec(),
            public: PublicKey::from_ec(&key.public_key())?,
        })
    }

    /// Parse a private key of a known algorithm (PKCS#1/SEC1 or PKCS#8 DER)
    pub fn from_private_der(algorithm: KeyAlgorithm, der: &[u8]) -> Result<Self, KeyMaterialError> {
        match algorithm {
            KeyAlgorithm::Rsa => {
                let key = RsaPrivateKey::from_pkcs1_der(der)
                    .or_else(|_| RsaPrivateKey::from_pkcs8_der(der))
                    .map_err(decoding)?;
                Self::from_rsa(&key)
            }
            KeyAlgorithm::Ec => {
                let key = p256::SecretKey::from_sec1_der(der)
                    .or_else(|_| p256::SecretKey::from_pkcs8_der(der))
                    .map_err(decoding)?;
                Self::from_ec(&key)
            }
        }
    }

    /// Parse a private key DER of either algorithm
    pub fn from_der(der: &[u8]) -> Result<Self, KeyMaterialError> {
        Self::from_private_der(KeyAlgorithm::Rsa, der)
            .or_else(|_| Self::from_private_der(KeyAlgorithm::Ec, der))
            .map_err(|_| KeyMaterialError::Unrecognized {
                what: "private key",
            })
    }

    pub fn from_pem(pem: &str) -> Result<Self, KeyMaterialError> {
        match pem_label(pem) {
            Some("RSA PRIVATE KEY") => {
                let key = RsaPrivateKey::from_pkcs1_pem(pem).map_err(decoding)?;
                Self::from_rsa(&key)
            }
            Some("EC PRIVATE KEY") => {
                let key = p256::SecretKey::from_sec1_pem(pem).map_err(decoding)?;
                Self::from_ec(&key)
            }
            Some("PRIVATE KEY") => {
                if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
                    return Self::from_rsa(&key);
                }
                let key = p256::SecretKey::from_pkcs8_pem(pem).map_err(decoding)?;
                Self::from_ec(&key)
            }
            _ => Err(KeyMaterialError::Unrecognized {
                what: "private key",
            }),
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn private_der(&self) -> &[u8] {
        &self.private_der
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Traditional PEM ("RSA PRIVATE KEY" / "EC PRIVATE KEY")
    pub fn private_pem(&self) -> Result<String, KeyMaterialError> {
        match self.algorithm {
            KeyAlgorithm::Rsa => Ok(RsaPrivateKey::from_pkcs1_der(&self.private_der)
                .map_err(decoding)?
                .to_pkcs1_pem(LineEnding::LF)
                .map_err(encoding)?
                .to_string()),
            KeyAlgorithm::Ec => Ok(p256::SecretKey::from_sec1_der(&self.private_der)
                .map_err(decoding)?
                .to_sec1_pem(LineEnding::LF)
                .map_err(encoding)?
                .to_string()),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KeyPair {{ algorithm: {}, private: [REDACTED], public: {:?} }}",
            self.algorithm, self.public
        )
    }
}

/// Label of the first PEM block, if the text is PEM
pub fn pem_label(text: &str) -> Option<&str> {
    let start = text.find("-----BEGIN ")? + "-----BEGIN ".len();
    let len = text[start..].find("-----")?;
    Some(&text[start..start + len])
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterialError {
    #[error("Not a supported {what}")]
    Unrecognized { what: &'static str },

    #[error("Failed to decode key: {reason}")]
    Decoding { reason: String },

    #[error("Failed to encode key: {reason}")]
    Encoding { reason: String },
}

fn decoding(err: impl fmt::Display) -> KeyMaterialError {
    KeyMaterialError::Decoding {
        reason: err.to_string(),
    }
}

fn encoding(err: impl fmt::Display) -> KeyMaterialError {
    KeyMaterialError::Encoding {
        reason: err.to_string(),
    }
}
