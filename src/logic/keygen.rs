use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use tracing::debug;

use crate::error::CodecError;
use crate::model::{KeyAlgorithm, KeyPair, Protocol};

/// Generate a fresh device key pair for `protocol`
///
/// TCP devices use RSA-1024, UDP devices use NIST P-256.
pub fn generate_key_pair(protocol: Protocol) -> Result<KeyPair, CodecError> {
    let algorithm = protocol.algorithm();
    debug!(%algorithm, "Generating device key pair");

    let pair = match algorithm {
        KeyAlgorithm::Rsa => {
            let key = RsaPrivateKey::new(&mut OsRng, KeyAlgorithm::RSA_DEVICE_KEY_BITS)
                .map_err(|err| CodecError::KeyGeneration {
                    reason: err.to_string(),
                })?;
            KeyPair::from_rsa(&key)
        }
        KeyAlgorithm::Ec => KeyPair::from_ec(&p256::SecretKey::random(&mut OsRng)),
    };

    pair.map_err(|err| CodecError::KeyGeneration {
        reason: err.to_string(),
    })
}
