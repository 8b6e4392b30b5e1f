//! Tagged encoding of secret strings inside the configuration document.
//!
//! Every persisted secret carries a prefix naming the [`EncodingMode`] that
//! produced it, so the reader never needs to know the mode out-of-band:
//!
//! | mode        | prefix(es)            | payload |
//! |-------------|-----------------------|---------|
//! | `Plain`     | `PLAIN:`              | the raw value |
//! | `Stripped`  | `STRIPPED:`           | a redaction marker; the value is discarded |
//! | `ConfigPw`  | `CONFIG-PW:`          | base64 AES-256-GCM ciphertext of the value |
//! | `Encoded`   | `ENC-PW:`, `ENCODED:` | base64 AES-256-GCM ciphertext of a salted JSON envelope |
//!
//! Un-prefixed input is treated as written by the caller's hint mode, which
//! is how values from older documents are read.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::{self, SecurityKey};
use crate::error::EncoderError;
use crate::util;

/// Placeholder rendered in place of secrets in debug output and stripped exports.
pub const REDACTED: &str = "************";

/// The secrecy treatment applied to a string when it is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncodingMode {
    Plain,
    Stripped,
    ConfigPw,
    Encoded,
}

impl EncodingMode {
    /// All modes in prefix-scan order.
    pub const ALL: [Self; 4] = [Self::Plain, Self::Stripped, Self::ConfigPw, Self::Encoded];

    /// Prefixes recognized for this mode; the first is written on encode.
    #[must_use]
    pub fn prefixes(self) -> &'static [&'static str] {
        match self {
            Self::Plain => &["PLAIN:"],
            Self::Stripped => &["STRIPPED:"],
            Self::ConfigPw => &["CONFIG-PW:"],
            Self::Encoded => &["ENC-PW:", "ENCODED:"],
        }
    }

    /// The prefix written by [`encode`].
    #[must_use]
    pub fn canonical_prefix(self) -> &'static str {
        self.prefixes()[0]
    }

    /// Parse a mode from its CLI/config spelling (`plain`, `config-pw`, ...).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('_', "-").as_str() {
            "plain" => Some(Self::Plain),
            "stripped" => Some(Self::Stripped),
            "config-pw" => Some(Self::ConfigPw),
            "encoded" => Some(Self::Encoded),
            _ => None,
        }
    }

    /// Find the mode whose prefix starts `input`, with the prefix removed.
    #[must_use]
    pub fn detect(input: &str) -> Option<(Self, &str)> {
        Self::ALL.iter().find_map(|mode| {
            mode.prefixes()
                .iter()
                .find_map(|p| input.strip_prefix(p))
                .map(|rest| (*mode, rest))
        })
    }
}

impl fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Plain => "PLAIN",
            Self::Stripped => "STRIPPED",
            Self::ConfigPw => "CONFIG_PW",
            Self::Encoded => "ENCODED",
        };
        f.write_str(name)
    }
}

/// Salted envelope encrypted by [`EncodingMode::Encoded`].
#[derive(Serialize, Deserialize)]
struct SaltedEnvelope {
    salt: String,
    value: String,
}

/// Encode `value` for persistence using `mode`.
///
/// `Encoded` leaves input that already carries one of its prefixes untouched,
/// so re-saving a document never double-encrypts.
///
/// # Errors
///
/// Returns [`EncoderError::Crypto`] if encryption fails, or
/// [`EncoderError::ConfigFormat`] if the envelope cannot be serialized.
pub fn encode(value: &str, mode: EncodingMode, key: &SecurityKey) -> Result<String, EncoderError> {
    let prefix = mode.canonical_prefix();
    match mode {
        EncodingMode::Plain => Ok(format!("{prefix}{value}")),
        EncodingMode::Stripped => Ok(format!("{prefix}{REDACTED}")),
        EncodingMode::ConfigPw => {
            let ciphertext = crypto::encrypt(key, value.as_bytes())?;
            Ok(format!("{prefix}{}", util::base64_encode(&ciphertext)))
        }
        EncodingMode::Encoded => {
            if mode.prefixes().iter().any(|p| value.starts_with(p)) {
                debug!("value already carries an encoded prefix; leaving as is");
                return Ok(value.to_owned());
            }
            let envelope = SaltedEnvelope {
                salt: util::random_token(),
                value: value.to_owned(),
            };
            let json = serde_json::to_vec(&envelope).map_err(|e| EncoderError::ConfigFormat {
                reason: format!("unable to build salted envelope: {e}"),
            })?;
            let ciphertext = crypto::encrypt(key, &json)?;
            Ok(format!("{prefix}{}", util::base64_encode(&ciphertext)))
        }
    }
}

/// Decode a persisted string back into its plaintext.
///
/// The prefix decides the mode; `mode_hint` only applies to un-prefixed
/// (legacy) input. Blank input decodes to an empty string.
///
/// # Errors
///
/// Returns [`EncoderError::ConfigFormat`] when the payload is not valid
/// base64, fails authenticated decryption, or the envelope is malformed.
pub fn decode(input: &str, mode_hint: EncodingMode, key: &SecurityKey) -> Result<String, EncoderError> {
    if util::is_blank(input) {
        return Ok(String::new());
    }

    let (mode, payload) = EncodingMode::detect(input).unwrap_or((mode_hint, input));
    match mode {
        EncodingMode::Plain => Ok(payload.to_owned()),
        EncodingMode::Stripped => Ok(REDACTED.to_owned()),
        EncodingMode::ConfigPw => {
            let plaintext = decrypt_payload(payload, key)?;
            into_utf8(plaintext)
        }
        EncodingMode::Encoded => {
            let json = decrypt_payload(payload, key)?;
            let envelope: SaltedEnvelope =
                serde_json::from_slice(&json).map_err(|e| EncoderError::ConfigFormat {
                    reason: format!("malformed salted envelope: {e}"),
                })?;
            Ok(envelope.value)
        }
    }
}

fn decrypt_payload(payload: &str, key: &SecurityKey) -> Result<Vec<u8>, EncoderError> {
    let ciphertext = util::base64_decode(payload).map_err(|e| EncoderError::ConfigFormat {
        reason: format!("encoded value is not base64: {e}"),
    })?;
    crypto::decrypt(key, &ciphertext).map_err(|e| EncoderError::ConfigFormat {
        reason: format!("unable to decrypt stored value: {e}"),
    })
}

fn into_utf8(bytes: Vec<u8>) -> Result<String, EncoderError> {
    String::from_utf8(bytes).map_err(|e| EncoderError::ConfigFormat {
        reason: format!("decrypted value is not utf-8: {e}"),
    })
}
