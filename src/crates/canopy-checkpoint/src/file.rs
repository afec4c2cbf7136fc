//! Atomic single-file progress storage
//!
//! The checkpoint file holds exactly one serialized [`RunCheckpoint`].
//! Updates are atomic: the new record is written to a `.tmp` sibling and
//! renamed over the original, so a crash at any point leaves either the old
//! record or the new one. On a failed write the temp file is removed and the
//! original is left intact.

use crate::error::Result;
use crate::record::RunCheckpoint;
use crate::serializer::{BincodeSerializer, SerializerProtocol};
use crate::traits::ProgressStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// [`ProgressStore`] backed by one file, updated via write-then-rename.
#[derive(Debug)]
pub struct FileProgressStore {
    path: PathBuf,
    serializer: BincodeSerializer,
}

impl FileProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileProgressStore {
            path: path.into(),
            serializer: BincodeSerializer::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl<R> ProgressStore<R> for FileProgressStore
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn save(&self, record: &RunCheckpoint<R>) -> Result<()> {
        let bytes = self.serializer.dumps(record)?;
        let temp = self.temp_path();
        let write_and_commit = async {
            tokio::fs::write(&temp, &bytes).await?;
            tokio::fs::rename(&temp, &self.path).await?;
            Ok::<(), std::io::Error>(())
        };
        match write_and_commit.await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Keep the previous record; the temp file must not linger.
                let _ = tokio::fs::remove_file(&temp).await;
                Err(err.into())
            }
        }
    }

    async fn load(&self) -> Result<Option<RunCheckpoint<R>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(self.serializer.loads(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::{Checkpoint, Progress};
    use num_rational::Ratio;

    fn sample(result: u64) -> RunCheckpoint<u64> {
        RunCheckpoint::new(
            Progress::new(
                Checkpoint::choice(Checkpoint::Explored, Checkpoint::Unexplored),
                result,
            ),
            Ratio::new(5, 4),
        )
    }

    #[test]
    fn test_temp_path_is_a_sibling() {
        let store = FileProgressStore::new("/tmp/run.checkpoint");
        assert_eq!(store.temp_path(), PathBuf::from("/tmp/run.checkpoint.tmp"));
    }

    #[tokio::test]
    async fn test_save_load_clear_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::new(dir.path().join("run.checkpoint"));

        let loaded: Option<RunCheckpoint<u64>> = store.load().await.unwrap();
        assert!(loaded.is_none());

        store.save(&sample(3)).await.unwrap();
        let loaded: RunCheckpoint<u64> = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, sample_eq_witness(&loaded, 3));

        ProgressStore::<u64>::clear(&store).await.unwrap();
        let loaded: Option<RunCheckpoint<u64>> = store.load().await.unwrap();
        assert!(loaded.is_none());
        // Clearing twice is fine.
        ProgressStore::<u64>::clear(&store).await.unwrap();
    }

    // `saved_at` is stamped at construction, so rebuild the expectation from
    // the loaded record's own timestamp.
    fn sample_eq_witness(loaded: &RunCheckpoint<u64>, result: u64) -> RunCheckpoint<u64> {
        let mut expected = sample(result);
        expected.saved_at = loaded.saved_at;
        expected
    }

    #[tokio::test]
    async fn test_save_replaces_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::new(dir.path().join("run.checkpoint"));
        store.save(&sample(1)).await.unwrap();
        store.save(&sample(2)).await.unwrap();
        let loaded: RunCheckpoint<u64> = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.progress.result, 2);
        // No temp file left behind.
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_original_and_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.checkpoint");
        let store = FileProgressStore::new(&path);
        store.save(&sample(1)).await.unwrap();

        // Turn the target path into a directory so the rename fails.
        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::create_dir(&path).await.unwrap();
        let result = store.save(&sample(2)).await;
        assert!(result.is_err());
        assert!(!store.temp_path().exists());
    }
}
