//! Error types for `selfpass-core`, one enum per layer.
//!
//! Nothing here ever formats key bytes or the plaintext of a secret.

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("unable to seal secret: {reason}")]
    Encryption { reason: String },

    /// Wrong key, or the sealed bytes were altered.
    #[error("unable to open sealed secret: {reason}")]
    Decryption { reason: String },

    #[error("cannot derive {context} key: {reason}")]
    KeyDerivation { context: String, reason: String },

    /// Shorter than a nonce plus an authentication tag.
    #[error("sealed secret is {len} bytes, at least {min} required")]
    Truncated { len: usize, min: usize },
}

/// Errors from the XML tree layer.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    /// The input is not well-formed XML.
    #[error("xml parse error at byte {position}: {reason}")]
    Parse { position: u64, reason: String },

    /// The document has no root element.
    #[error("xml document has no root element")]
    MissingRoot,

    /// Serializing the tree failed.
    #[error("xml write error: {reason}")]
    Write { reason: String },

    /// The xpath expression uses syntax outside the supported subset.
    #[error("unsupported xpath expression '{expr}': {reason}")]
    XPath { expr: String, reason: String },
}

/// Errors from the stored-value encoder.
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    /// The stored string could not be turned back into a secret.
    #[error("config format error: {reason}")]
    ConfigFormat { reason: String },

    /// A cryptographic operation failed while encoding or decoding.
    #[error("encoder crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Errors from stored values, the value factory, and the type converter.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// A persisted value could not be parsed for the given setting.
    #[error("config format error for setting '{setting}': {reason}")]
    ConfigFormat { setting: String, reason: String },

    /// The persisted value is malformed (used before a setting key is known).
    #[error("malformed value: {reason}")]
    Malformed { reason: String },

    /// A caller asked for a native type that does not match the value's syntax.
    #[error("value type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// A secret field failed to encode or decode.
    #[error("value encoder error: {0}")]
    Encoder(#[from] EncoderError),

    /// The XML layer failed.
    #[error("value xml error: {0}")]
    Xml(#[from] XmlError),
}

impl ValueError {
    /// Shorthand for [`ValueError::Malformed`].
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ValueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed {
            reason: format!("json: {err}"),
        }
    }
}

/// Errors from the stored configuration document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document is not a configuration document.
    #[error("invalid configuration document: {reason}")]
    InvalidDocument { reason: String },

    /// A setting key in the document is not known to the catalog.
    #[error("unknown setting: {key}")]
    UnknownSetting { key: String },

    /// A value failed validation and was not written.
    #[error("invalid value for setting '{key}': {}", .errors.join("; "))]
    InvalidValue { key: String, errors: Vec<String> },

    /// The configuration is locked against edits.
    #[error("configuration is locked")]
    Locked,

    /// A value could not be parsed or serialized.
    #[error("configuration value error: {0}")]
    Value(#[from] ValueError),

    /// The XML layer failed.
    #[error("configuration xml error: {0}")]
    Xml(#[from] XmlError),
}
