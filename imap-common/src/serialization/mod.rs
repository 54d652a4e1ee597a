//! Serialization helpers for Plonky2 data structures embedded in serde
//! derived types.

use plonky2::util::serialization::IoError;
use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

/// Implement serialization for Plonky2 circuits-related data structures
pub mod circuit_data_serialization;
/// Implement serialization for common Plonky2 targets
pub mod targets_serialization;

/// Provides API to serialize a data structure into a sequence of bytes
pub trait ToBytes {
    /// Convert `self` to a sequence of bytes
    fn to_bytes(&self) -> Vec<u8>;
}

/// Provides API to construct a data structure from a sequence of bytes
pub trait FromBytes: Sized {
    /// Construct an instance of `Self` from a sequence of bytes
    fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError>;
}

/// Error type for serialization methods implemented in this module
#[derive(Debug)]
pub struct SerializationError(String);

impl From<IoError> for SerializationError {
    fn from(value: IoError) -> Self {
        Self(format!("{}", value))
    }
}

impl SerializationError {
    /// Convert `SerializationError` to serde deserialization error
    pub fn to_de_error<T: Error>(self) -> T {
        T::custom(self.0)
    }
}

impl std::fmt::Display for SerializationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SerializationError {}

/// Serde field serializer for types implementing `ToBytes`; meant to be
/// employed as `#[serde(serialize_with = "serialize")]`.
pub fn serialize<T: ToBytes, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    value.to_bytes().serialize(serializer)
}

/// Serde field deserializer for types implementing `FromBytes`; meant to
/// be employed as `#[serde(deserialize_with = "deserialize")]`.
pub fn deserialize<'de, T: FromBytes, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<T, D::Error> {
    let bytes = Vec::<u8>::deserialize(deserializer)?;
    T::from_bytes(&bytes).map_err(SerializationError::to_de_error)
}
