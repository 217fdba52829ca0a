use crate::cipher::Cipher;
use crate::codec::Codec;
use crate::error::Result;
use crate::storage::StorageAdapter;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Everything a store needs to write its state through to a storage adapter.
pub(crate) struct Persistence<T> {
    pub(crate) key: String,
    adapter: Arc<dyn StorageAdapter>,
    codec: Arc<dyn Codec<T>>,
    cipher: Option<Arc<dyn Cipher>>,
    // Sequence number of the newest commit that reached the adapter.
    written: Mutex<u64>,
}

impl<T> Persistence<T> {
    pub(crate) fn new(
        key: String,
        adapter: Arc<dyn StorageAdapter>,
        codec: Arc<dyn Codec<T>>,
        cipher: Option<Arc<dyn Cipher>>,
    ) -> Self {
        Self {
            key,
            adapter,
            codec,
            cipher,
            written: Mutex::new(0),
        }
    }

    pub(crate) fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encode and, if configured, encrypt a state value into its record text.
    pub(crate) fn seal(&self, state: &T) -> Result<String> {
        let text = self.codec.encode(state)?;
        match &self.cipher {
            Some(cipher) => Ok(cipher.encrypt(&text)?),
            None => Ok(text),
        }
    }

    /// Inverse of [`seal`](Self::seal).
    pub(crate) fn open(&self, record: &str) -> Result<T> {
        let text = match &self.cipher {
            Some(cipher) => cipher.decrypt(record)?,
            None => record.to_string(),
        };
        Ok(self.codec.decode(&text)?)
    }

    /// Save the record for commit `seq`, unless a newer commit already landed.
    pub(crate) async fn write(&self, seq: u64, record: &str) -> Result<()> {
        let mut written = self.written.lock().await;
        if seq < *written {
            debug!(key = %self.key, seq, newest = *written, "skipping stale write");
            return Ok(());
        }
        self.adapter.save(&self.key, record).await?;
        *written = seq;
        debug!(key = %self.key, seq, "state persisted");
        Ok(())
    }

    /// Load and open the stored record, if there is one.
    pub(crate) async fn read(&self) -> Result<Option<T>> {
        match self.adapter.load(&self.key).await? {
            Some(record) => Ok(Some(self.open(&record)?)),
            None => Ok(None),
        }
    }
}
