//! At-rest encryption of serialized state.
//!
//! A [`Cipher`] turns plaintext into an envelope text and back. The envelope
//! is a small JSON object carrying the per-call IV next to the ciphertext:
//!
//! ```text
//! {"iv": "<hex>", "data": "<base64>"}
//! ```
//!
//! [`AesGcmCipher`] fills it with AES-256-GCM: `iv` is the 12-byte nonce in
//! hex and `data` is the ciphertext with its 16-byte tag appended, in standard
//! base64. The envelope carries no algorithm marker. Records written by an
//! AES-CBC cipher have the same shape with a 16-byte IV; they are rejected
//! with [`CipherError::Envelope`] instead of being decrypted.

mod aes;

pub use aes::{AesGcmCipher, SecretKey};

use crate::error::CipherError;
use serde::{Deserialize, Serialize};

/// Symmetric encryption layer applied between the codec and the storage adapter.
pub trait Cipher: Send + Sync {
    /// Encrypt `plaintext` under a freshly generated IV and return the envelope text.
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;

    /// Decrypt an envelope produced by [`Cipher::encrypt`].
    fn decrypt(&self, envelope: &str) -> Result<String, CipherError>;
}

/// Persisted representation of an encrypted value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Hex-encoded IV, unique per encryption.
    pub iv: String,
    /// Encoded ciphertext.
    pub data: String,
}

impl Envelope {
    pub fn to_text(&self) -> Result<String, CipherError> {
        serde_json::to_string(self).map_err(|e| CipherError::Envelope(e.to_string()))
    }

    pub fn from_text(text: &str) -> Result<Self, CipherError> {
        serde_json::from_str(text).map_err(|e| CipherError::Envelope(e.to_string()))
    }
}
