use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use health::{HealthHandle, HealthRegistry};
use tracing::{info, warn};

use crate::config::Config;
use crate::counter::{CounterStore, FileCounterStore};
use crate::table::PartitionedTable;
use crate::writer::BatchWriter;

const KNOWN_TABLE_OPTIONS: [&str; 1] = ["sync_on_write"];

pub struct AppContext {
    pub writer: BatchWriter,
    pub liveness: HealthRegistry,
    pub worker_liveness: HealthHandle,
    running: AtomicBool,
}

impl AppContext {
    pub fn new(config: &Config) -> Result<Self, anyhow::Error> {
        let options = config
            .parsed_table_options()
            .context("TABLE_OPTIONS must be a JSON object of string keys and values")?;
        for key in options.keys() {
            if !KNOWN_TABLE_OPTIONS.contains(&key.as_str()) {
                warn!("Unrecognized table option {key:?}, retained but unused");
            }
        }

        std::fs::create_dir_all(&config.table_base_path).with_context(|| {
            format!("failed to create table base path {}", config.table_base_path)
        })?;
        let table = Arc::new(PartitionedTable::new(&config.table_base_path, options));

        let counter = FileCounterStore::new(&config.counter_file_path);
        if config.reset_counter_on_start {
            warn!("Resetting cumulative counter to zero, cross-restart total is lost");
            counter.reset()?;
        }
        info!("Cumulative counter starting at {}", counter.load());
        let counter: Arc<dyn CounterStore> = Arc::new(counter);

        let liveness = HealthRegistry::new("liveness");
        // Deadline comfortably above the trigger interval: the scheduler
        // reports once per recv-or-trigger iteration, but a batch commit
        // can legitimately take a while.
        let worker_liveness = liveness.register(
            "scheduler".to_string(),
            Duration::from_secs(config.trigger_interval_secs * 6),
        );

        Ok(Self {
            writer: BatchWriter::new(table, counter, config.write_shards),
            liveness,
            worker_liveness,
            running: AtomicBool::new(true),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Flip the running flag on SIGINT/SIGTERM. The run loop only checks
    /// it at batch boundaries, so an in-flight commit always finishes
    /// before the process halts.
    pub fn spawn_shutdown_listener(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = sigterm.recv() => {},
            }
            info!("Shutdown signal received, finishing in-flight batch");
            self.stop();
        });
    }
}
