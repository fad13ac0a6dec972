//! HAP status codes carried in JSON responses.

use serde::{Serialize, Serializer};

/// Status code attached to each item of a characteristic response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HapStatus {
    Success,
    InsufficientPrivileges,
    ServiceCommunicationFailure,
    ResourceBusy,
    ReadOnlyCharacteristic,
    WriteOnlyCharacteristic,
    NotificationNotSupported,
    OutOfResources,
    OperationTimedOut,
    ResourceDoesNotExist,
    InvalidValueInRequest,
    InsufficientAuthorization,
}

impl HapStatus {
    /// Numeric code as sent on the wire.
    pub fn code(self) -> i32 {
        match self {
            HapStatus::Success => 0,
            HapStatus::InsufficientPrivileges => -70401,
            HapStatus::ServiceCommunicationFailure => -70402,
            HapStatus::ResourceBusy => -70403,
            HapStatus::ReadOnlyCharacteristic => -70404,
            HapStatus::WriteOnlyCharacteristic => -70405,
            HapStatus::NotificationNotSupported => -70406,
            HapStatus::OutOfResources => -70407,
            HapStatus::OperationTimedOut => -70408,
            HapStatus::ResourceDoesNotExist => -70409,
            HapStatus::InvalidValueInRequest => -70410,
            HapStatus::InsufficientAuthorization => -70411,
        }
    }

    /// Parse a wire code.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => HapStatus::Success,
            -70401 => HapStatus::InsufficientPrivileges,
            -70402 => HapStatus::ServiceCommunicationFailure,
            -70403 => HapStatus::ResourceBusy,
            -70404 => HapStatus::ReadOnlyCharacteristic,
            -70405 => HapStatus::WriteOnlyCharacteristic,
            -70406 => HapStatus::NotificationNotSupported,
            -70407 => HapStatus::OutOfResources,
            -70408 => HapStatus::OperationTimedOut,
            -70409 => HapStatus::ResourceDoesNotExist,
            -70410 => HapStatus::InvalidValueInRequest,
            -70411 => HapStatus::InsufficientAuthorization,
            _ => return None,
        })
    }

    pub fn is_success(self) -> bool {
        self == HapStatus::Success
    }
}

impl Serialize for HapStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for code in [0, -70401, -70402, -70403, -70404, -70405, -70406, -70407, -70408, -70409, -70410, -70411] {
            let status = HapStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(HapStatus::from_code(-1), None);
        assert_eq!(HapStatus::from_code(-70412), None);
    }

    #[test]
    fn serializes_as_integer() {
        let json = serde_json::to_string(&HapStatus::InvalidValueInRequest).unwrap();
        assert_eq!(json, "-70410");
    }
}
