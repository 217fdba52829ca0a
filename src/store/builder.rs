use super::persistence::Persistence;
use super::Store;
use crate::cipher::{AesGcmCipher, Cipher};
use crate::codec::{Codec, JsonCodec};
use crate::config::PersistConfig;
use crate::error::ConfigError;
use crate::middleware::{Middleware, Pipeline};
use crate::storage::{FileStorage, StorageAdapter};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::warn;

struct Target<T> {
    key: String,
    adapter: Arc<dyn StorageAdapter>,
    codec: Arc<dyn Codec<T>>,
}

/// Configures a [`Store`] before it starts accepting updates.
///
/// ```
/// use bolsa::{middleware, MemoryStorage, Store};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let store = Store::builder(0u32)
///     .middleware(middleware::filter(|n: &u32| *n <= 100))
///     .persist("counter", MemoryStorage::new())
///     .build_hydrated()
///     .await;
///
/// store.set(7).await.unwrap();
/// # });
/// ```
pub struct StoreBuilder<T: Send + 'static> {
    initial: T,
    pipeline: Pipeline<T>,
    target: Option<Target<T>>,
    cipher: Option<Arc<dyn Cipher>>,
}

impl<T> StoreBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        Self {
            initial,
            pipeline: Pipeline::new(),
            target: None,
            cipher: None,
        }
    }

    /// Register a middleware step. Steps run in the order they are added.
    pub fn middleware<M>(mut self, step: M) -> Self
    where
        M: Middleware<T> + 'static,
    {
        self.pipeline.push(step);
        self
    }

    /// Persist under `key` using a custom codec.
    pub fn persist_with<A, C>(self, key: impl Into<String>, adapter: A, codec: C) -> Self
    where
        A: StorageAdapter + 'static,
        C: Codec<T> + 'static,
    {
        self.persist_shared_with(key, Arc::new(adapter), Arc::new(codec))
    }

    fn persist_shared_with(
        mut self,
        key: impl Into<String>,
        adapter: Arc<dyn StorageAdapter>,
        codec: Arc<dyn Codec<T>>,
    ) -> Self {
        self.target = Some(Target {
            key: key.into(),
            adapter,
            codec,
        });
        self
    }

    /// Encrypt records before they reach storage.
    pub fn encrypt<C>(mut self, cipher: C) -> Self
    where
        C: Cipher + 'static,
    {
        self.cipher = Some(Arc::new(cipher));
        self
    }

    fn assemble(self) -> Store<T> {
        let persistence = match self.target {
            Some(target) => Some(Persistence::new(
                target.key,
                target.adapter,
                target.codec,
                self.cipher,
            )),
            None => {
                if self.cipher.is_some() {
                    warn!("cipher configured without a storage key; it will not be used");
                }
                None
            }
        };
        Store::from_parts(self.initial, self.pipeline, persistence)
    }

    /// Build the store and start hydrating it in the background.
    ///
    /// Must be called from within a Tokio runtime when a storage key is set;
    /// otherwise hydration is reported as failed and the initial value stays.
    /// Use [`Store::ready`] to wait for hydration.
    pub fn build(self) -> Store<T> {
        let has_target = self.target.is_some();
        let store = self.assemble();
        if has_target {
            store.spawn_hydration();
        }
        store
    }

    /// Build the store and wait for hydration before returning it.
    pub async fn build_hydrated(self) -> Store<T> {
        let store = self.assemble();
        store.hydrate().await;
        store
    }
}

impl<T> StoreBuilder<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Persist under `key` as JSON.
    pub fn persist<A>(self, key: impl Into<String>, adapter: A) -> Self
    where
        A: StorageAdapter + 'static,
    {
        self.persist_with(key, adapter, JsonCodec)
    }

    /// Persist under `key` as JSON through an adapter shared with other owners.
    pub fn persist_shared(self, key: impl Into<String>, adapter: Arc<dyn StorageAdapter>) -> Self {
        self.persist_shared_with(key, adapter, Arc::new(JsonCodec))
    }

    /// Configure file-backed persistence, and encryption if the config asks
    /// for it, from a [`PersistConfig`].
    pub fn from_config(initial: T, config: &PersistConfig) -> Result<Self, ConfigError> {
        let builder =
            Self::new(initial).persist(config.key.clone(), FileStorage::new(config.dir.clone()));

        match config.secret_key()? {
            Some(key) => Ok(builder.encrypt(AesGcmCipher::new(&key))),
            None => Ok(builder),
        }
    }
}
