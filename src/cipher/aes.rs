use super::{Cipher, Envelope};
use crate::error::CipherError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
// IV length of the AES-CBC records this cipher refuses.
const CBC_IV_LEN: usize = 16;

/// AES-256 key material. Cleared from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a key from 64 hex characters.
    pub fn from_hex(text: &str) -> Result<Self, CipherError> {
        let mut decoded = hex::decode(text.trim()).map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        if decoded.len() != KEY_LEN {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CipherError::InvalidKey(format!(
                "expected {KEY_LEN} bytes, got {len}"
            )));
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self(bytes))
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// AES-256-GCM envelope cipher.
///
/// Every call to [`encrypt`](Cipher::encrypt) draws a new random 96-bit nonce,
/// stored hex-encoded in the envelope's `iv` field. The ciphertext (with its
/// authentication tag) is base64-encoded into `data`, so a wrong key or a
/// tampered record is rejected on decrypt.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub fn new(key: &SecretKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.as_bytes().into()),
        }
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut iv = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        Envelope {
            iv: hex::encode(iv),
            data: STANDARD.encode(ciphertext),
        }
        .to_text()
    }

    fn decrypt(&self, envelope: &str) -> Result<String, CipherError> {
        let envelope = Envelope::from_text(envelope)?;

        let iv = hex::decode(&envelope.iv).map_err(|e| CipherError::Envelope(e.to_string()))?;
        match iv.len() {
            NONCE_LEN => {}
            CBC_IV_LEN => {
                return Err(CipherError::Envelope(format!(
                    "{CBC_IV_LEN}-byte iv looks like an AES-CBC record, expected AES-256-GCM"
                )))
            }
            len => {
                return Err(CipherError::Envelope(format!(
                    "expected {NONCE_LEN}-byte iv, got {len}"
                )))
            }
        }
        let ciphertext = STANDARD
            .decode(&envelope.data)
            .map_err(|e| CipherError::Envelope(e.to_string()))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
            .map_err(|_| CipherError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::Decrypt)
    }
}
