//! In-memory progress storage for development and testing
//!
//! Stores the serialized record in a slot behind a `tokio::sync::RwLock`.
//! Serialization goes through the same codec as the file store, so tests
//! exercise the full round-trip without touching a filesystem.

use crate::error::Result;
use crate::record::RunCheckpoint;
use crate::serializer::{BincodeSerializer, SerializerProtocol};
use crate::traits::ProgressStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Reference [`ProgressStore`] keeping the record in memory.
#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    slot: RwLock<Option<Vec<u8>>>,
    serializer: BincodeSerializer,
    save_count: AtomicUsize,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saves performed; handy for asserting checkpoint cadence in
    /// tests.
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<R> ProgressStore<R> for InMemoryProgressStore
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn save(&self, record: &RunCheckpoint<R>) -> Result<()> {
        let bytes = self.serializer.dumps(record)?;
        *self.slot.write().await = Some(bytes);
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Option<RunCheckpoint<R>>> {
        match self.slot.read().await.as_deref() {
            Some(bytes) => Ok(Some(self.serializer.loads(bytes)?)),
            None => Ok(None),
        }
    }

    async fn clear(&self) -> Result<()> {
        *self.slot.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::{Checkpoint, Progress};
    use num_rational::Ratio;

    #[tokio::test]
    async fn test_round_trip() {
        let store = InMemoryProgressStore::new();
        let record = RunCheckpoint::new(
            Progress::new(Checkpoint::Unexplored, 7u64),
            Ratio::new(1, 2),
        );
        store.save(&record).await.unwrap();
        let loaded: RunCheckpoint<u64> =
            ProgressStore::load(&store).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_load_of_empty_store() {
        let store = InMemoryProgressStore::new();
        let loaded: Option<RunCheckpoint<u64>> = store.load().await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_record() {
        let store = InMemoryProgressStore::new();
        let record = RunCheckpoint::new(
            Progress::new(Checkpoint::Explored, 1u64),
            Ratio::new(0, 1),
        );
        store.save(&record).await.unwrap();
        ProgressStore::<u64>::clear(&store).await.unwrap();
        let loaded: Option<RunCheckpoint<u64>> = store.load().await.unwrap();
        assert!(loaded.is_none());
    }
}
