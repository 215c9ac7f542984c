use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use profile_ingest_rs::counter::{CounterError, CounterStore, MemoryCounterStore};
use profile_ingest_rs::table::PartitionedTable;
use profile_ingest_rs::types::UserRecord;
use profile_ingest_rs::writer::{BatchOutcome, BatchWriter, CommitError};

fn record(country: &str, state: &str, city: &str) -> UserRecord {
    UserRecord {
        id: Some(uuid::Uuid::new_v4().to_string()),
        firstname: Some("Test".to_string()),
        lastname: Some("User".to_string()),
        email: None,
        phone: None,
        dob: None,
        address: None,
        zipcode: None,
        city: city.to_string(),
        state: state.to_string(),
        country: country.to_string(),
        ingestion_time: Utc::now(),
    }
}

fn writer_at(base: &Path, shards: usize) -> (BatchWriter, Arc<MemoryCounterStore>) {
    let table = Arc::new(PartitionedTable::new(base, HashMap::new()));
    let counter = Arc::new(MemoryCounterStore::default());
    let writer = BatchWriter::new(table, counter.clone(), shards);
    (writer, counter)
}

/// All data files under the base path, keyed by path, with their contents.
fn data_files(base: &Path) -> HashMap<PathBuf, String> {
    let mut files = HashMap::new();
    let mut stack = vec![base.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let contents = fs::read_to_string(&path).unwrap();
                files.insert(path, contents);
            }
        }
    }
    files
}

#[tokio::test]
async fn empty_batch_is_skipped_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let (writer, counter) = writer_at(dir.path(), 2);

    let outcome = writer.commit(0, Vec::new()).await.unwrap();

    assert!(matches!(outcome, BatchOutcome::Skipped));
    assert_eq!(counter.load(), 0);
    assert!(data_files(dir.path()).is_empty());
}

#[tokio::test]
async fn commit_reports_count_partitions_and_total() {
    let dir = tempfile::tempdir().unwrap();
    let (writer, counter) = writer_at(dir.path(), 2);

    let batch = vec![
        record("India", "unknown", "Delhi_"),
        record("unknown", "unknown", "unknown"),
        record("USA", "CA", "Los_Angeles"),
    ];

    let outcome = writer.commit(0, batch).await.unwrap();
    match outcome {
        BatchOutcome::Committed {
            count,
            partitions_written,
            total_records,
        } => {
            assert_eq!(count, 3);
            assert_eq!(partitions_written, 3);
            assert_eq!(total_records, 3);
        }
        other => panic!("expected a committed batch, got {other:?}"),
    }
    assert_eq!(counter.load(), 3);
}

#[tokio::test]
async fn counter_accumulates_only_successful_batches() {
    let dir = tempfile::tempdir().unwrap();
    let (writer, counter) = writer_at(dir.path(), 2);

    writer
        .commit(0, vec![record("India", "Delhi", "Delhi"); 3])
        .await
        .unwrap();
    writer
        .commit(1, vec![record("USA", "CA", "San_Francisco"); 2])
        .await
        .unwrap();
    assert_eq!(counter.load(), 5);

    // A table whose base path is a plain file cannot accept appends
    let broken_base = dir.path().join("not_a_directory");
    fs::write(&broken_base, "occupied").unwrap();
    let broken_table = Arc::new(PartitionedTable::new(&broken_base, HashMap::new()));
    let broken_writer = BatchWriter::new(broken_table, counter.clone(), 2);

    let err = broken_writer
        .commit(2, vec![record("India", "Delhi", "Delhi"); 4])
        .await
        .unwrap_err();
    assert!(matches!(err, CommitError::Append(_)));

    // The failed batch contributed nothing
    assert_eq!(counter.load(), 5);
}

#[tokio::test]
async fn committed_files_are_never_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let (writer, _counter) = writer_at(dir.path(), 2);

    writer
        .commit(0, vec![record("India", "Delhi", "Delhi"); 3])
        .await
        .unwrap();
    let before = data_files(dir.path());
    assert!(!before.is_empty());

    writer
        .commit(1, vec![record("India", "Delhi", "Delhi"); 2])
        .await
        .unwrap();
    let after = data_files(dir.path());

    // Everything written by batch 0 is still present, byte for byte
    for (path, contents) in &before {
        assert_eq!(after.get(path), Some(contents), "{path:?} was modified");
    }
    assert!(after.len() > before.len());
}

#[tokio::test]
async fn shard_fanout_bounds_files_per_partition() {
    let dir = tempfile::tempdir().unwrap();
    let (writer, _counter) = writer_at(dir.path(), 2);

    writer
        .commit(7, vec![record("USA", "TX", "Houston"); 8])
        .await
        .unwrap();

    let files = data_files(dir.path());
    // One partition, two shards: exactly two data files
    assert_eq!(files.len(), 2);

    // Between them, all eight records are present
    let total_lines: usize = files.values().map(|c| c.lines().count()).sum();
    assert_eq!(total_lines, 8);

    for contents in files.values() {
        for line in contents.lines() {
            let parsed: UserRecord = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.city, "Houston");
        }
    }
}

struct FailingCounterStore;

impl CounterStore for FailingCounterStore {
    fn load(&self) -> u64 {
        0
    }

    fn increment(&self, _by: u64) -> Result<u64, CounterError> {
        Err(CounterError::Persist {
            path: PathBuf::from("/unwritable/total.txt"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        })
    }
}

#[tokio::test]
async fn counter_persistence_failure_fails_the_commit() {
    let dir = tempfile::tempdir().unwrap();
    let table = Arc::new(PartitionedTable::new(dir.path(), HashMap::new()));
    let writer = BatchWriter::new(table, Arc::new(FailingCounterStore), 2);

    let err = writer
        .commit(0, vec![record("India", "Delhi", "Delhi"); 3])
        .await
        .unwrap_err();

    // The append happened, but the commit still fails so the caller
    // withholds the checkpoint and replays the batch.
    assert!(matches!(err, CommitError::Counter(_)));
    assert!(!data_files(dir.path()).is_empty());
}
