use common_kafka::kafka_consumer::{Offset, OffsetErr};
use tracing::debug;

use crate::writer::{BatchOutcome, CommitError};

/// One source position, markable as fully processed. Storing a token
/// hands the position to the transport's periodic commit; dropping it
/// unstored leaves the durable checkpoint where it was.
pub trait CheckpointToken {
    type Err: std::error::Error + Send + Sync + 'static;

    fn store(self) -> Result<(), Self::Err>;
}

impl CheckpointToken for Offset {
    type Err = OffsetErr;

    fn store(self) -> Result<(), OffsetErr> {
        Offset::store(self)
    }
}

/// The positions consumed into one batch, held unstored until the
/// batch's fate is known.
pub struct Checkpoint<T: CheckpointToken> {
    tokens: Vec<T>,
}

impl<T: CheckpointToken> Default for Checkpoint<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CheckpointToken> Checkpoint<T> {
    pub fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    pub fn push(&mut self, token: T) {
        self.tokens.push(token);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn advance(self) -> Result<(), T::Err> {
        for token in self.tokens {
            token.store()?;
        }
        Ok(())
    }

    fn withhold(self) {
        if !self.tokens.is_empty() {
            debug!(
                "Withholding {} source positions for replay",
                self.tokens.len()
            );
        }
    }
}

/// Settle a batch's checkpoint from its commit result: advanced only
/// when the batch committed (or was skipped empty), withheld on any
/// failure so the next subscription replays the batch. A withheld
/// checkpoint only holds if nothing later advances past it, so the
/// scheduler must not store further positions in the same run.
pub fn settle<T: CheckpointToken>(
    result: &Result<BatchOutcome, CommitError>,
    checkpoint: Checkpoint<T>,
) -> Result<(), T::Err> {
    match result {
        Ok(_) => checkpoint.advance(),
        Err(_) => {
            checkpoint.withhold();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::CounterError;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, thiserror::Error)]
    #[error("position store refused")]
    struct StoreRefused;

    struct MemoryToken {
        stored: Arc<AtomicUsize>,
        fail: bool,
    }

    impl MemoryToken {
        fn tracking(stored: &Arc<AtomicUsize>) -> Self {
            Self {
                stored: stored.clone(),
                fail: false,
            }
        }

        fn failing(stored: &Arc<AtomicUsize>) -> Self {
            Self {
                stored: stored.clone(),
                fail: true,
            }
        }
    }

    impl CheckpointToken for MemoryToken {
        type Err = StoreRefused;

        fn store(self) -> Result<(), StoreRefused> {
            if self.fail {
                return Err(StoreRefused);
            }
            self.stored.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn commit_failure() -> CommitError {
        CounterError::Persist {
            path: PathBuf::from("/unwritable/total.txt"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
        .into()
    }

    fn committed(count: usize) -> BatchOutcome {
        BatchOutcome::Committed {
            count,
            partitions_written: 1,
            total_records: count as u64,
        }
    }

    #[test]
    fn committed_batch_advances_every_position() {
        let stored = Arc::new(AtomicUsize::new(0));
        let mut checkpoint = Checkpoint::new();
        for _ in 0..3 {
            checkpoint.push(MemoryToken::tracking(&stored));
        }

        settle(&Ok(committed(3)), checkpoint).unwrap();
        assert_eq!(stored.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_batch_withholds_every_position() {
        let stored = Arc::new(AtomicUsize::new(0));
        let mut checkpoint = Checkpoint::new();
        for _ in 0..3 {
            checkpoint.push(MemoryToken::tracking(&stored));
        }

        // No position from the failed batch reaches the store; replay
        // starts from before the batch on the next subscription.
        settle(&Err(commit_failure()), checkpoint).unwrap();
        assert_eq!(stored.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn skipped_batch_settles_cleanly() {
        let checkpoint: Checkpoint<MemoryToken> = Checkpoint::new();
        assert!(checkpoint.is_empty());
        settle(&Ok(BatchOutcome::Skipped), checkpoint).unwrap();
    }

    #[test]
    fn store_failure_surfaces() {
        let stored = Arc::new(AtomicUsize::new(0));
        let mut checkpoint = Checkpoint::new();
        checkpoint.push(MemoryToken::tracking(&stored));
        checkpoint.push(MemoryToken::failing(&stored));

        settle(&Ok(committed(2)), checkpoint).unwrap_err();
        assert_eq!(stored.load(Ordering::SeqCst), 1);
    }
}
