use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Cloud identifier of a device
///
/// Device ids are 12 bytes rendered as 24 lowercase hex characters.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub const LENGTH: usize = 24;

    pub fn new(id: &str) -> Result<Self, DeviceIdError> {
        let id = id.trim();
        if id.len() != Self::LENGTH {
            return Err(DeviceIdError::InvalidLength {
                expected: Self::LENGTH,
                actual: id.len(),
            });
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DeviceIdError::NotHex);
        }
        Ok(Self(id.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceId {
    type Err = DeviceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceIdError {
    #[error("Device id must be {expected} characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Device id must be hexadecimal")]
    NotHex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_valid() {
        let id = DeviceId::new("0123456789ABCDEF01234567").unwrap();
        assert_eq!(id.as_str(), "0123456789abcdef01234567");
    }

    #[test]
    fn test_device_id_too_short() {
        assert_eq!(
            DeviceId::new("0123").unwrap_err(),
            DeviceIdError::InvalidLength {
                expected: 24,
                actual: 4
            }
        );
    }

    #[test]
    fn test_device_id_not_hex() {
        assert_eq!(
            DeviceId::new("0123456789abcdef0123456z").unwrap_err(),
            DeviceIdError::NotHex
        );
    }
}
