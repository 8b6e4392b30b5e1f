//! JSON helpers and serde adaptors for stored-value records.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ValueError;

/// Serialize to a compact JSON string.
///
/// # Errors
///
/// Returns [`ValueError::Malformed`] if serialization fails.
pub fn to_compact<T: Serialize>(value: &T) -> Result<String, ValueError> {
    Ok(serde_json::to_string(value)?)
}

/// Serialize to an indented JSON string.
///
/// # Errors
///
/// Returns [`ValueError::Malformed`] if serialization fails.
pub fn to_pretty<T: Serialize>(value: &T) -> Result<String, ValueError> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Parse a JSON string into `T`.
///
/// # Errors
///
/// Returns [`ValueError::Malformed`] if the text is not valid JSON for `T`.
pub fn from_str<T: DeserializeOwned>(text: &str) -> Result<T, ValueError> {
    Ok(serde_json::from_str(text)?)
}

/// Convert an already-parsed JSON value into `T`.
///
/// # Errors
///
/// Returns [`ValueError::Malformed`] if the value does not match `T`.
pub fn from_value<T: DeserializeOwned>(value: &serde_json::Value) -> Result<T, ValueError> {
    Ok(serde_json::from_value(value.clone())?)
}

/// Convert `T` into a JSON value.
///
/// # Errors
///
/// Returns [`ValueError::Malformed`] if serialization fails.
pub fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value, ValueError> {
    Ok(serde_json::to_value(value)?)
}

/// Serde adaptor: `Vec<u8>` as a standard base64 string.
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&crate::util::base64_encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        crate::util::base64_decode(&text).map_err(serde::de::Error::custom)
    }
}

/// Serde adaptor: `Vec<Vec<u8>>` as a list of standard base64 strings.
pub mod base64_list {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&crate::util::base64_encode(item))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let texts = Vec::<String>::deserialize(deserializer)?;
        texts
            .iter()
            .map(|t| crate::util::base64_decode(t).map_err(serde::de::Error::custom))
            .collect()
    }
}
