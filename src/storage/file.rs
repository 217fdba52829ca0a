use super::StorageAdapter;
use crate::error::StorageError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Directory-backed storage, one file per key.
///
/// File names are the hex encoding of the key, so any key string is safe to
/// use. Each write goes to its own temp file and is renamed into place, so
/// concurrent writers to one key leave exactly one complete record.
#[derive(Clone, Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.state", hex::encode(key)))
    }

    // Unique per save, so concurrent writers never share a temp file.
    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{:016x}.tmp", hex::encode(key), rand::random::<u64>()))
    }
}

#[async_trait]
impl StorageAdapter for FileStorage {
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.record_path(key);
        let temp_path = self.temp_path(key);

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(value.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(path = %temp_path.display(), error = %cleanup, "failed to remove temp file");
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.record_path(key)).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
