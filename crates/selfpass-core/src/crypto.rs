//! Secret sealing and hashing for configuration documents.
//!
//! A [`SecurityKey`] seals values with AES-256-GCM. Sealed bytes are laid
//! out as `nonce || ciphertext || tag`, with a random 96-bit nonce per call.
//! Keys come from a passphrase through HKDF-SHA256 and are wiped on drop.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Changing either constant makes every sealed value in existing documents unreadable.
const PASSPHRASE_SALT: &[u8] = b"selfpass-security-key-v1";
const PASSPHRASE_INFO: &[u8] = b"selfpass-config-secrets";

const PASSWORD_HASH_SCHEME: &str = "SHA512";

/// Key for the secrets stored inside a configuration document.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecurityKey([u8; KEY_LEN]);

impl SecurityKey {
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// A random key; documents sealed with it cannot be reopened after restart.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(Aes256Gcm::generate_key(OsRng).as_slice());
        Self(bytes)
    }

    /// Derive the key for a configured passphrase. Deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyDerivation`] if HKDF expansion fails.
    pub fn from_passphrase(passphrase: &str) -> Result<Self, CryptoError> {
        let mut okm = [0u8; KEY_LEN];
        Hkdf::<Sha256>::new(Some(PASSPHRASE_SALT), passphrase.as_bytes())
            .expand(PASSPHRASE_INFO, &mut okm)
            .map_err(|e| CryptoError::KeyDerivation {
                context: "passphrase".to_owned(),
                reason: e.to_string(),
            })?;
        Ok(Self(okm))
    }

    /// Raw key bytes. Never log or persist them.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(&self.0).map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })
    }

    /// Seal `plaintext` under this key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher()?
            .encrypt(&nonce, plaintext)
            .map_err(|e| CryptoError::Encryption {
                reason: e.to_string(),
            })?;
        Ok([nonce.as_slice(), sealed.as_slice()].concat())
    }

    /// Open bytes produced by [`SecurityKey::seal`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Truncated`] for input too short to hold a nonce
    /// and tag, and [`CryptoError::Decryption`] when authentication fails.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let min = NONCE_LEN + TAG_LEN;
        if sealed.len() < min {
            return Err(CryptoError::Truncated {
                len: sealed.len(),
                min,
            });
        }
        let (nonce, body) = sealed.split_at(NONCE_LEN);
        self.cipher()?
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|e| CryptoError::Decryption {
                reason: e.to_string(),
            })
    }
}

impl fmt::Debug for SecurityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecurityKey(..)")
    }
}

/// Shorthand for [`SecurityKey::seal`].
///
/// # Errors
///
/// See [`SecurityKey::seal`].
pub fn encrypt(key: &SecurityKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    key.seal(plaintext)
}

/// Shorthand for [`SecurityKey::open`].
///
/// # Errors
///
/// See [`SecurityKey::open`].
pub fn decrypt(key: &SecurityKey, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    key.open(sealed)
}

/// Lowercase hex SHA-512 digest.
#[must_use]
pub fn sha512_hex(data: &[u8]) -> String {
    hex::encode(Sha512::digest(data))
}

/// Salted hash of a password: `SHA512:<salt hex>:<hex of sha512(salt || password)>`.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4();
    salted_hash(salt.as_bytes(), password)
}

fn salted_hash(salt: &[u8], password: &str) -> String {
    let digest = Sha512::new()
        .chain_update(salt)
        .chain_update(password.as_bytes())
        .finalize();
    format!("{PASSWORD_HASH_SCHEME}:{}:{}", hex::encode(salt), hex::encode(digest))
}

/// Check `password` against a [`hash_password`] result in constant time.
/// Malformed hashes never verify.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, ':');
    let (Some(PASSWORD_HASH_SCHEME), Some(salt_hex), Some(_)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    salted_hash(&salt, password)
        .as_bytes()
        .ct_eq(stored.as_bytes())
        .into()
}
