//! Error types for every layer of the store.

use thiserror::Error;

/// Failure to turn a state value into text or back.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to encode state: {0}")]
    Encode(String),
    #[error("failed to decode state: {0}")]
    Decode(String),
}

/// Failure inside the at-rest encryption layer.
#[derive(Error, Debug)]
pub enum CipherError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("malformed envelope: {0}")]
    Envelope(String),
    #[error("encryption failed")]
    Encrypt,
    /// Wrong key or tampered ciphertext.
    #[error("decryption failed")]
    Decrypt,
}

/// Failure reported by a storage adapter.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Failure loading persistence configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("environment variable {0} is not set")]
    MissingEnv(String),
    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Errors returned by [`Store`](crate::Store) operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A middleware step rejected the update.
    #[error("update aborted by middleware: {0}")]
    Aborted(String),
    /// Hydration panicked or was cancelled before it finished.
    #[error("hydration did not finish")]
    HydrationInterrupted,
}

/// A specialized Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
