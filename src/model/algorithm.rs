//! Key algorithm used for device and server keys

use std::fmt;

/// Asymmetric algorithm of a key pair
///
/// The algorithm is dictated by the transport protocol: TCP devices use
/// RSA keys, UDP devices use EC keys on the P-256 curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// RSA, 1024-bit for device keys
    Rsa,
    /// ECDSA on NIST P-256 (prime256v1)
    Ec,
}

impl KeyAlgorithm {
    /// Size of newly generated RSA device keys
    pub const RSA_DEVICE_KEY_BITS: usize = 1024;

    pub fn as_str(self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa => "rsa",
            KeyAlgorithm::Ec => "ec",
        }
    }

    /// Algorithm name expected by the cloud provisioning endpoint
    pub fn cloud_name(self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa => "rsa",
            KeyAlgorithm::Ec => "ecc",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
