//! Serialization protocol for persisted progress

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Protocol for serializing and deserializing persisted records
///
/// Implementations can provide custom codecs; the contract that matters is
/// that user-supplied cache byte strings round-trip bit-exactly.
pub trait SerializerProtocol: Send + Sync {
    /// Serialize a value to bytes
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from bytes
    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T>;
}

/// Binary serializer using bincode (default for checkpoint files)
#[derive(Debug, Clone, Default)]
pub struct BincodeSerializer;

impl BincodeSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for BincodeSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(data)?)
    }
}

/// JSON serializer, handy for inspecting checkpoint files by hand
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for JsonSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::{Checkpoint, Progress};

    #[test]
    fn test_bincode_round_trip() {
        let serializer = BincodeSerializer::new();
        let progress = Progress::new(
            Checkpoint::choice(Checkpoint::Explored, Checkpoint::Unexplored),
            42u64,
        );
        let bytes = serializer.dumps(&progress).unwrap();
        let restored: Progress<u64> = serializer.loads(&bytes).unwrap();
        assert_eq!(progress, restored);
    }

    #[test]
    fn test_json_round_trip() {
        let serializer = JsonSerializer::new();
        let progress = Progress::new(
            Checkpoint::cache(vec![0, 1, 255], Checkpoint::Unexplored),
            vec![1u64, 2, 3],
        );
        let bytes = serializer.dumps(&progress).unwrap();
        let restored: Progress<Vec<u64>> = serializer.loads(&bytes).unwrap();
        assert_eq!(progress, restored);
    }

    #[test]
    fn test_cache_bytes_round_trip_bit_exactly() {
        let serializer = BincodeSerializer::new();
        let bytes: Vec<u8> = (0..=255).collect();
        let cp = Checkpoint::cache(bytes.clone(), Checkpoint::Unexplored);
        let restored: Checkpoint = serializer.loads(&serializer.dumps(&cp).unwrap()).unwrap();
        match restored {
            Checkpoint::Cache { bytes: stored, .. } => assert_eq!(stored, bytes),
            other => panic!("unexpected checkpoint shape: {other:?}"),
        }
    }
}
