//! Identifier types for the retouch ledger.
//!
//! Device identifiers are opaque client-generated strings; possession of the string
//! is the only identity check this service performs. Generation identifiers are
//! ULIDs so stored generations sort by creation time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Maximum accepted length of a device identifier, in bytes.
pub const MAX_DEVICE_ID_LEN: usize = 256;

/// A client-generated device identifier.
///
/// The value is kept verbatim. Empty and whitespace-only strings are rejected, as are
/// strings longer than [`MAX_DEVICE_ID_LEN`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Parse a device identifier.
    ///
    /// # Errors
    ///
    /// Returns `IdError::EmptyDeviceId` for blank input and `IdError::DeviceIdTooLong`
    /// when the input exceeds [`MAX_DEVICE_ID_LEN`].
    pub fn parse(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(IdError::EmptyDeviceId);
        }
        if value.len() > MAX_DEVICE_ID_LEN {
            return Err(IdError::DeviceIdTooLong(value.len()));
        }
        Ok(Self(value))
    }

    /// Parse an optional identifier, treating `None` as empty.
    ///
    /// # Errors
    ///
    /// Same as [`DeviceId::parse`].
    pub fn parse_opt(value: Option<&str>) -> Result<Self, IdError> {
        Self::parse(value.unwrap_or_default())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the identifier bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl FromStr for DeviceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl AsRef<[u8]> for DeviceId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// A generation identifier using ULID for time-ordering.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GenerationId(Ulid);

impl GenerationId {
    /// Generate a new `GenerationId` with the current timestamp.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Return the bytes of the ULID (16 bytes).
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 16] {
        self.0.to_bytes()
    }

    /// Create a `GenerationId` from bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Ulid::from_bytes(bytes))
    }
}

impl FromStr for GenerationId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = Ulid::from_string(s).map_err(|_| IdError::InvalidUlid)?;
        Ok(Self(ulid))
    }
}

impl fmt::Debug for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenerationId({})", self.0)
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for GenerationId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GenerationId> for String {
    fn from(id: GenerationId) -> Self {
        id.0.to_string()
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The device identifier is empty or blank.
    #[error("device identifier is required")]
    EmptyDeviceId,

    /// The device identifier exceeds the maximum length.
    #[error("device identifier too long: {0} bytes")]
    DeviceIdTooLong(usize),

    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,
}
