//! # Bolsa
//!
//! A reactive state store for Rust with middleware and encrypted persistence.
//!
//! A [`Store`] owns one value of your state type. Updates go through three
//! stages:
//!
//! ## Middleware
//!
//! Every `set` walks an ordered [`Pipeline`] of steps. A step can pass the
//! candidate on, transform it, or stop it with [`Flow::Halt`] /
//! [`Flow::Abort`]. Steps added later always run after earlier ones.
//!
//! ## Subscribers
//!
//! Committed values are pushed to subscribers synchronously. A new subscriber
//! is called once immediately with the current state, so it never has to wait
//! for the next change.
//!
//! ## Persistence
//!
//! With a storage key, each commit is encoded ([`Codec`]), optionally
//! encrypted ([`Cipher`]) and saved through a [`StorageAdapter`]. On startup
//! the store loads the record back; [`Store::ready`] reports the outcome.
//! Storage failures never undo a commit.

pub mod cipher;
pub mod codec;
pub mod config;
pub mod error;
pub mod middleware;
pub mod storage;
pub mod store;

// Re-export main types for convenience
pub use cipher::{AesGcmCipher, Cipher, Envelope, SecretKey};
pub use codec::{Codec, JsonCodec};
pub use config::PersistConfig;
pub use error::{CipherError, CodecError, ConfigError, Result, StorageError, StoreError};
pub use middleware::{Flow, Middleware, Pipeline};
pub use storage::{FileStorage, MemoryStorage, StorageAdapter};
pub use store::{create_store, Hydration, Store, StoreBuilder, Subscription, Update};
