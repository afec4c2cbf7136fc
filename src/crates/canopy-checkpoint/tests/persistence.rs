//! Persistence across "process restarts": a fresh store instance on the same
//! path must see exactly what the previous one wrote.

use canopy_checkpoint::{
    ratio_from_duration, FileProgressStore, JsonSerializer, ProgressStore, RunCheckpoint,
    SerializerProtocol,
};
use canopy_core::{Checkpoint, Progress};
use num_rational::Ratio;
use std::time::Duration;

fn partial_record() -> RunCheckpoint<u64> {
    RunCheckpoint::new(
        Progress::new(
            Checkpoint::choice(
                Checkpoint::Explored,
                Checkpoint::cache(vec![1, 2, 3], Checkpoint::Unexplored),
            ),
            41,
        ),
        Ratio::new(7, 2),
    )
}

#[tokio::test]
async fn record_survives_a_store_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.checkpoint");

    let first = FileProgressStore::new(&path);
    first.save(&partial_record()).await.unwrap();
    drop(first);

    // A new process opens the same path.
    let second = FileProgressStore::new(&path);
    let loaded: RunCheckpoint<u64> = second.load().await.unwrap().unwrap();
    assert_eq!(loaded.progress, partial_record().progress);
    assert_eq!(loaded.cpu_time, Ratio::new(7, 2));
}

#[tokio::test]
async fn compute_time_accumulates_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.checkpoint");

    let store = FileProgressStore::new(&path);
    store.save(&partial_record()).await.unwrap();

    let mut resumed: RunCheckpoint<u64> = store.load().await.unwrap().unwrap();
    resumed.cpu_time += ratio_from_duration(Duration::from_millis(250));
    store.save(&resumed).await.unwrap();

    let reread: RunCheckpoint<u64> = store.load().await.unwrap().unwrap();
    assert_eq!(reread.cpu_time, Ratio::new(7, 2) + Ratio::new(1, 4));
}

#[test]
fn records_are_inspectable_as_json() {
    let serializer = JsonSerializer::new();
    let bytes = serializer.dumps(&partial_record()).unwrap();
    let text = String::from_utf8(bytes.clone()).unwrap();
    assert!(text.contains("progress"));
    assert!(text.contains("cpu_time"));
    let restored: RunCheckpoint<u64> = serializer.loads(&bytes).unwrap();
    assert_eq!(restored.progress.result, 41);
}
