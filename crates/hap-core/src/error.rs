//! Error types for the HAP accessory server.

use crate::status::HapStatus;
use thiserror::Error;

/// Primary error type for all accessory server operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Accessory error: {0}")]
    Accessory(#[from] AccessoryError),

    #[error("Characteristic error: {0}")]
    Characteristic(#[from] CharacteristicError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Operation timed out")]
    Timeout,
}

/// Errors raised by the pair-setup, pair-verify and pairings state machines.
///
/// Every variant maps onto one of the TLV `Error` codes sent back to the
/// controller (see [`PairingError::tlv_code`]).
#[derive(Error, Debug)]
pub enum PairingError {
    #[error("Authentication failed")]
    AuthFailure,

    #[error("Accessory is already paired")]
    Unavailable,

    #[error("Another pairing attempt is in progress")]
    Busy,

    #[error("Too many failed pairing attempts")]
    MaxTries,

    #[error("No room for additional pairings")]
    MaxPeers,

    #[error("Pairing state mismatch: expected {expected}, got {actual}")]
    StateMismatch { expected: u8, actual: u8 },

    #[error("TLV parsing error: {0}")]
    TlvParse(String),

    #[error("Missing required TLV type: {0}")]
    MissingTlv(u8),

    #[error("Unsupported pairing method: {0}")]
    UnsupportedMethod(u8),

    #[error("Unknown controller: {0}")]
    UnknownController(String),

    #[error("Controller is not an admin")]
    NotAdmin,

    #[error("Invalid setup code: {0}")]
    InvalidSetupCode(&'static str),

    #[error("Failed to persist pairing: {0}")]
    Persist(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl PairingError {
    /// TLV error code (`kTLVError_*`) reported to the controller.
    pub fn tlv_code(&self) -> u8 {
        match self {
            PairingError::AuthFailure
            | PairingError::UnknownController(_)
            | PairingError::NotAdmin => 0x02,
            PairingError::MaxPeers => 0x04,
            PairingError::MaxTries => 0x05,
            PairingError::Unavailable => 0x06,
            PairingError::Busy => 0x07,
            _ => 0x01,
        }
    }
}

/// Errors while reading or writing HTTP messages on a controller connection.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("Request body too large: {0} bytes")]
    BodyTooLarge(usize),

    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),
}

/// Errors while building the accessory object graph.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AccessoryError {
    #[error("Characteristic {0} already present in service")]
    DuplicateCharacteristic(String),

    #[error("Accessory id {0} is already in use")]
    DuplicateAid(u64),

    #[error("Accessory id 1 is reserved for the primary accessory")]
    ReservedAid,

    #[error("Standalone accessory must use accessory id 1, got {0}")]
    StandaloneAid(u64),

    #[error("Bridge already holds the maximum of {0} accessories")]
    TooManyAccessories(usize),

    #[error("Unknown characteristic type: {0}")]
    UnknownCharacteristic(String),

    #[error("Unknown service type: {0}")]
    UnknownService(String),

    #[error("No service with instance id {0}")]
    ServiceNotFound(u64),

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),
}

/// Which kind of access a characteristic refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Notify,
}

/// Per-item characteristic failure. Reported inline in batch responses.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CharacteristicError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Not authorized: {0:?} not permitted")]
    NotAuthorized(Access),

    #[error("Resource not found: {aid}.{iid}")]
    ResourceNotFound { aid: u64, iid: u64 },

    #[error("Write rejected by accessory: {0}")]
    Rejected(String),

    #[error("Resource busy")]
    Busy,
}

impl CharacteristicError {
    /// HAP status code reported for this failure.
    pub fn status(&self) -> HapStatus {
        match self {
            CharacteristicError::InvalidValue(_) => HapStatus::InvalidValueInRequest,
            CharacteristicError::NotAuthorized(Access::Write) => HapStatus::ReadOnlyCharacteristic,
            CharacteristicError::NotAuthorized(Access::Read) => HapStatus::WriteOnlyCharacteristic,
            CharacteristicError::NotAuthorized(Access::Notify) => {
                HapStatus::NotificationNotSupported
            }
            CharacteristicError::ResourceNotFound { .. } => HapStatus::ResourceDoesNotExist,
            CharacteristicError::Rejected(_) => HapStatus::ServiceCommunicationFailure,
            CharacteristicError::Busy => HapStatus::ResourceBusy,
        }
    }
}

/// Errors from the persisted pairing store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt store: {0}")]
    Corrupt(String),
}

/// Cryptographic operation errors.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("SRP proof mismatch")]
    ProofMismatch,

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}

/// Parsing errors for various formats.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid hex value: {0}")]
    InvalidHex(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        let pairing_err = Error::Pairing(PairingError::AuthFailure);
        assert!(pairing_err.to_string().contains("Pairing error"));
        assert!(pairing_err.to_string().contains("Authentication failed"));

        let closed = Error::SessionClosed;
        assert!(closed.to_string().contains("Session closed"));

        let dup = Error::Accessory(AccessoryError::DuplicateCharacteristic(
            "TargetTemperature".to_string(),
        ));
        assert!(dup.to_string().contains("TargetTemperature"));

        let missing = CharacteristicError::ResourceNotFound { aid: 2, iid: 9 };
        assert_eq!(missing.to_string(), "Resource not found: 2.9");
    }

    #[test]
    fn error_source_chain() {
        use std::error::Error as StdError;

        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "test");
        let conn_err = Error::Connection(io_err);
        assert!(conn_err.source().is_some());

        let storage = StorageError::Io {
            path: "/tmp/state.json".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(storage.source().is_some());
        let err = Error::Storage(storage);
        assert!(err.source().is_some());
    }

    #[test]
    fn error_conversions() {
        let err: Error = PairingError::Busy.into();
        assert!(matches!(err, Error::Pairing(_)));

        let err: Error = HttpError::MissingHeader("Content-Length").into();
        assert!(matches!(err, Error::Http(_)));

        let err: Error = CryptoError::SignatureInvalid.into();
        assert!(matches!(err, Error::Crypto(_)));

        let err: Error = ParseError::InvalidHex("zz".to_string()).into();
        assert!(matches!(err, Error::Parse(_)));

        let err: Error = AccessoryError::ReservedAid.into();
        assert!(matches!(err, Error::Accessory(_)));

        let err: Error = CharacteristicError::Busy.into();
        assert!(matches!(err, Error::Characteristic(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn pairing_errors_map_to_tlv_codes() {
        assert_eq!(PairingError::AuthFailure.tlv_code(), 0x02);
        assert_eq!(PairingError::NotAdmin.tlv_code(), 0x02);
        assert_eq!(PairingError::MaxPeers.tlv_code(), 0x04);
        assert_eq!(PairingError::MaxTries.tlv_code(), 0x05);
        assert_eq!(PairingError::Unavailable.tlv_code(), 0x06);
        assert_eq!(PairingError::Busy.tlv_code(), 0x07);
        assert_eq!(PairingError::Persist("disk full".into()).tlv_code(), 0x01);
    }

    #[test]
    fn characteristic_errors_map_to_status() {
        assert_eq!(
            CharacteristicError::InvalidValue("999".into()).status(),
            HapStatus::InvalidValueInRequest
        );
        assert_eq!(
            CharacteristicError::NotAuthorized(Access::Write).status(),
            HapStatus::ReadOnlyCharacteristic
        );
        assert_eq!(
            CharacteristicError::NotAuthorized(Access::Read).status(),
            HapStatus::WriteOnlyCharacteristic
        );
        assert_eq!(
            CharacteristicError::NotAuthorized(Access::Notify).status(),
            HapStatus::NotificationNotSupported
        );
        assert_eq!(
            CharacteristicError::ResourceNotFound { aid: 1, iid: 1 }.status(),
            HapStatus::ResourceDoesNotExist
        );
    }
}
