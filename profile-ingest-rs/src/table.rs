use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::types::UserRecord;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to create partition directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode record for {path:?}: {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write data file {path:?}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Append-only table store on the filesystem, partitioned by
/// `(country, state, city)`. Every append creates new data files under
/// the partition directories; existing files are never opened for write
/// again, so anything durably written stays as it was.
pub struct PartitionedTable {
    base_path: PathBuf,
    options: HashMap<String, String>,
    sync_on_write: bool,
}

impl PartitionedTable {
    /// `options` is the store's own configuration map, forwarded verbatim
    /// from config. Recognized keys are applied, the rest are retained for
    /// inspection.
    pub fn new(base_path: impl Into<PathBuf>, options: HashMap<String, String>) -> Self {
        let sync_on_write = options
            .get("sync_on_write")
            .map(|v| v == "true")
            .unwrap_or(false);
        Self {
            base_path: base_path.into(),
            options,
            sync_on_write,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn options(&self) -> &HashMap<String, String> {
        &self.options
    }

    /// Append one shard's records, grouped by partition key, one new
    /// uniquely-named data file per partition touched. Returns the number
    /// of files created.
    pub async fn append(
        &self,
        batch_id: u64,
        shard: usize,
        records: &[UserRecord],
    ) -> Result<usize, TableError> {
        let mut by_partition: HashMap<_, Vec<&UserRecord>> = HashMap::new();
        for record in records {
            by_partition
                .entry(record.partition_key())
                .or_default()
                .push(record);
        }

        let mut files_created = 0;
        for (key, partition_records) in by_partition {
            let dir = self.base_path.join(key.relative_path());
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|source| TableError::CreateDir {
                    path: dir.clone(),
                    source,
                })?;

            let path = dir.join(format!("{:016}-{}-{}.jsonl", batch_id, shard, Uuid::new_v4()));

            let mut buf = Vec::new();
            for record in &partition_records {
                serde_json::to_writer(&mut buf, record).map_err(|source| TableError::Encode {
                    path: path.clone(),
                    source,
                })?;
                buf.push(b'\n');
            }

            // create_new guards the append-only invariant: a name collision
            // fails the write instead of clobbering an existing file.
            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
                .map_err(|source| TableError::WriteFile {
                    path: path.clone(),
                    source,
                })?;
            file.write_all(&buf)
                .await
                .map_err(|source| TableError::WriteFile {
                    path: path.clone(),
                    source,
                })?;
            if self.sync_on_write {
                file.sync_all()
                    .await
                    .map_err(|source| TableError::WriteFile {
                        path: path.clone(),
                        source,
                    })?;
            }

            debug!(
                "Wrote {} records to partition {} ({})",
                partition_records.len(),
                key,
                path.display()
            );
            files_created += 1;
        }

        Ok(files_created)
    }
}
