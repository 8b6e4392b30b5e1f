//! Core library for `selfpass`.
//!
//! Contains the XML tree, the secret encoder and its cryptographic
//! primitives, the setting catalog, the typed stored values with their
//! factory and converter, and the stored configuration document. This
//! crate performs no I/O; the server and CLI read and write the document
//! through `selfpass-storage` or the filesystem.

pub mod converter;
pub mod crypto;
pub mod encoder;
pub mod error;
pub mod factory;
pub mod json;
pub mod setting;
pub mod stored_config;
pub mod time;
pub mod util;
pub mod value;
pub mod xml;

pub use crypto::SecurityKey;
pub use encoder::EncodingMode;
pub use error::{ConfigError, CryptoError, EncoderError, ValueError, XmlError};
pub use setting::{Setting, SettingKey, SettingSyntax};
pub use stored_config::StoredConfiguration;
pub use value::StoredValue;
