//! Error types for dfukeys
//!
//! This module defines the error hierarchy for all provisioning operations.
//! Errors are organized by the component that raises them and use thiserror
//! for implementation. Nothing is retried or remapped on the way up: a DFU
//! timeout stays a timeout and a cloud conflict stays a conflict.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::DoctorStep;

/// Result type alias for dfukeys operations
pub type DfuKeysResult<T> = Result<T, DfuKeysError>;

/// Instructions shown whenever no device in DFU mode could be reached
pub const DFU_INSTRUCTIONS: &str = "\
!!! I was unable to detect any devices in DFU mode...
> Your device will blink yellow when in DFU mode.
> If your device is not blinking yellow, please:
1) Press and hold both the RESET/RST and MODE/SETUP buttons simultaneously.
2) Release only the RESET/RST button while continuing to hold the MODE/SETUP button.
3) Release the MODE/SETUP button once the device begins to blink yellow.";

/// Top-level error type for all dfukeys operations
#[derive(Error, Debug)]
pub enum DfuKeysError {
    /// DFU transport errors
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Binary layout errors
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Local key file errors
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    /// Cloud registration errors, surfaced as classified by the cloud
    #[error(transparent)]
    Cloud(#[from] CloudError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Post-write read-back did not match what was written
    #[error("Verification failed: {slot} on the device does not match what was written")]
    VerificationFailed { slot: String },

    /// Invalid combination of arguments
    #[error("{0}")]
    Usage(String),

    /// A doctor step failed; the steps in `completed` keep their effects
    #[error("Step '{step}' failed: {source}")]
    Transaction {
        step: DoctorStep,
        completed: Vec<DoctorStep>,
        #[source]
        source: Box<DfuKeysError>,
    },

    /// The doctor transaction was interrupted between two steps
    #[error(
        "Interrupted before '{next}'; the device was left as '{}' completed",
        last_step(.completed)
    )]
    Interrupted {
        next: DoctorStep,
        completed: Vec<DoctorStep>,
    },

    /// Writing progress output failed
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl DfuKeysError {
    /// Whether the operator can fix this by (re-)entering DFU mode
    pub fn is_device_not_found(&self) -> bool {
        match self {
            DfuKeysError::Device(DeviceError::NotFound | DeviceError::Timeout { .. }) => true,
            DfuKeysError::Transaction { source, .. } => source.is_device_not_found(),
            _ => false,
        }
    }

    /// Actionable text to show the operator alongside the error
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            _ if self.is_device_not_found() => Some(DFU_INSTRUCTIONS),
            DfuKeysError::KeyStore(KeyStoreError::FileExists { .. }) => {
                Some("Use --force to overwrite existing key files.")
            }
            DfuKeysError::Cloud(CloudError::Unauthorized { .. }) => {
                Some("Set an access token with --access-token or DFUKEYS_ACCESS_TOKEN.")
            }
            DfuKeysError::Transaction { source, .. } => source.remediation(),
            _ => None,
        }
    }
}

fn last_step(completed: &[DoctorStep]) -> String {
    completed
        .last()
        .map(|step| step.to_string())
        .unwrap_or_else(|| "nothing".to_string())
}

/// DFU transport errors
#[derive(Error, Debug)]
pub enum DeviceError {
    /// No device in DFU mode is attached
    #[error("No DFU device found")]
    NotFound,

    /// The transport did not answer within its time budget
    #[error("DFU {operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// The DFU utility could not be launched
    #[error("DFU utility `{program}` could not be started: {reason}")]
    ToolUnavailable { program: String, reason: String },

    /// The DFU utility reported a failure
    #[error("DFU {operation} failed: {reason}")]
    TransferFailed { operation: String, reason: String },

    /// The device returned fewer or more bytes than the slot holds
    #[error("Read {actual} bytes from {slot}, expected {expected}")]
    UnexpectedLength {
        slot: String,
        expected: usize,
        actual: usize,
    },

    /// Data larger than the slot
    #[error("{len} bytes do not fit in {slot} ({capacity} bytes)")]
    SlotOverflow {
        slot: String,
        len: usize,
        capacity: usize,
    },
}

/// Binary layout errors raised by the key codec
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Bytes do not match any known layout
    #[error("Malformed key data: {reason}")]
    MalformedKeyData { reason: String },

    /// No flash layout is known for the device
    #[error("Unsupported device type: {device}")]
    UnsupportedDeviceType { device: String },

    /// The device has no layout for the requested protocol
    #[error("{device} does not support {feature}")]
    UnsupportedProtocol { device: String, feature: String },

    /// The key algorithm does not match the protocol's layout
    #[error("A {algorithm} key cannot be used with the {protocol} protocol")]
    AlgorithmMismatch { algorithm: String, protocol: String },

    /// Key pair generation failed
    #[error("Failed to generate key: {reason}")]
    KeyGeneration { reason: String },

    /// Server address cannot be stored in a server key record
    #[error("Invalid server address: {reason}")]
    InvalidAddress { reason: String },
}

/// Local key file errors
#[derive(Error, Debug)]
pub enum KeyStoreError {
    /// Overwrite guard
    #[error("{} already exists", .path.display())]
    FileExists { path: PathBuf },

    #[error("Failed to read {}: {reason}", .path.display())]
    ReadFailed { path: PathBuf, reason: String },

    #[error("Failed to write {}: {reason}", .path.display())]
    WriteFailed { path: PathBuf, reason: String },

    #[error("{} does not contain a supported key: {reason}", .path.display())]
    InvalidKeyFile { path: PathBuf, reason: String },
}

/// Cloud registration failures, one variant per cloud classification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// The key or device is already claimed
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    /// The request was refused for any other reason, e.g. a malformed key
    #[error("Rejected: {message}")]
    Rejected { message: String },

    #[error("Cloud unavailable: {message}")]
    Unavailable { message: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {reason}", .path.display())]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse config {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_not_found_display() {
        let err = DfuKeysError::Device(DeviceError::NotFound);
        assert_eq!(err.to_string(), "No DFU device found");
    }

    #[test]
    fn test_timeout_counts_as_device_absence() {
        let err = DfuKeysError::Device(DeviceError::Timeout {
            operation: "upload".to_string(),
            seconds: 30,
        });
        assert!(err.is_device_not_found());
        assert_eq!(err.remediation(), Some(DFU_INSTRUCTIONS));
    }

    #[test]
    fn test_file_exists_remediation() {
        let err = DfuKeysError::KeyStore(KeyStoreError::FileExists {
            path: PathBuf::from("device.pem"),
        });
        assert!(!err.is_device_not_found());
        assert!(err.remediation().unwrap().contains("--force"));
    }

    #[test]
    fn test_transaction_keeps_cause() {
        let err = DfuKeysError::Transaction {
            step: DoctorStep::RegisterKey,
            completed: vec![DoctorStep::FindDevice, DoctorStep::CreateKeys],
            source: Box::new(DfuKeysError::Cloud(CloudError::Conflict {
                message: "key already claimed".to_string(),
            })),
        };
        let text = err.to_string();
        assert!(text.contains("registering"), "{text}");
        assert!(text.contains("Conflict: key already claimed"), "{text}");
    }

    #[test]
    fn test_interrupted_names_last_completed_step() {
        let err = DfuKeysError::Interrupted {
            next: DoctorStep::RegisterKey,
            completed: vec![DoctorStep::FindDevice, DoctorStep::LoadNewKeys],
        };
        assert!(err.to_string().contains("loading new keys"));
    }

    #[test]
    fn test_result_type_alias() {
        let result: DfuKeysResult<i32> = Ok(42);
        assert_eq!(result.unwrap(), 42);

        let result: DfuKeysResult<i32> = Err(DfuKeysError::Device(DeviceError::NotFound));
        assert!(result.is_err());
    }
}
