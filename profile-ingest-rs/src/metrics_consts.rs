pub const EVENTS_RECEIVED: &str = "profile_ingest_events_received";
pub const EMPTY_PAYLOADS: &str = "profile_ingest_empty_payloads";
pub const MALFORMED_PAYLOADS: &str = "profile_ingest_malformed_payloads";
pub const BATCHES_COMMITTED: &str = "profile_ingest_batches_committed";
pub const BATCHES_SKIPPED: &str = "profile_ingest_batches_skipped";
pub const BATCHES_FAILED: &str = "profile_ingest_batches_failed";
pub const RECORDS_WRITTEN: &str = "profile_ingest_records_written";
pub const PARTITIONS_PER_BATCH: &str = "profile_ingest_partitions_per_batch";
pub const CUMULATIVE_TOTAL: &str = "profile_ingest_cumulative_total";
pub const BATCH_SIZE: &str = "profile_ingest_batch_size";
pub const BATCH_ACQUIRE_TIME: &str = "profile_ingest_batch_acquire_time_ms";
pub const BATCH_COMMIT_TIME: &str = "profile_ingest_batch_commit_time_ms";
pub const OFFSET_STORE_FAILED: &str = "profile_ingest_offset_store_failed";
