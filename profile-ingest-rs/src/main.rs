use std::{sync::Arc, time::Duration};

use axum::{routing::get, Router};
use chrono::Utc;
use common_kafka::kafka_consumer::{DecodeOutcome, SingleTopicConsumer};
use common_metrics::{serve, setup_metrics_routes};
use profile_ingest_rs::{
    app_context::AppContext,
    checkpoint::{settle, Checkpoint},
    config::Config,
    metrics_consts::{
        BATCHES_COMMITTED, BATCHES_FAILED, BATCHES_SKIPPED, BATCH_ACQUIRE_TIME, BATCH_COMMIT_TIME,
        BATCH_SIZE, CUMULATIVE_TOTAL, EMPTY_PAYLOADS, EVENTS_RECEIVED, MALFORMED_PAYLOADS,
        OFFSET_STORE_FAILED, PARTITIONS_PER_BATCH, RECORDS_WRITTEN,
    },
    types::{RawEvent, UserRecord},
    writer::BatchOutcome,
};
use std::future::ready;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer: tracing_subscriber::filter::Filtered<
        tracing_subscriber::fmt::Layer<tracing_subscriber::Registry>,
        EnvFilter,
        tracing_subscriber::Registry,
    > = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

pub async fn index() -> &'static str {
    "user profile ingestion service"
}

fn start_health_liveness_server(config: &Config, context: Arc<AppContext>) -> JoinHandle<()> {
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route(
            "/_liveness",
            get(move || ready(context.liveness.get_status())),
        );
    let router = setup_metrics_routes(router);
    let bind = format!("{}:{}", config.host, config.port);
    tokio::task::spawn(async move {
        serve(router, &bind)
            .await
            .expect("failed to start serving metrics");
    })
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_with_defaults()?;

    let consumer = SingleTopicConsumer::new(config.kafka.clone(), config.consumer.clone())?;

    let context = Arc::new(AppContext::new(&config)?);

    context.clone().spawn_shutdown_listener();

    info!(
        "Subscribed to topic: {}",
        config.consumer.kafka_consumer_topic
    );

    start_health_liveness_server(&config, context.clone());

    let trigger_interval = Duration::from_secs(config.trigger_interval_secs);
    let mut batch_id: u64 = 0;

    while context.is_running() {
        let deadline = tokio::time::Instant::now() + trigger_interval;
        let mut batch: Vec<UserRecord> = Vec::new();
        let mut checkpoint = Checkpoint::new();

        // Drain the source until the trigger fires. Everything received in
        // the window is the current batch, however much or little that is.
        let acquire_time = common_metrics::timing_guard(BATCH_ACQUIRE_TIME);
        loop {
            context.worker_liveness.report_healthy();

            tokio::select! {
                received = consumer.json_recv_lenient::<RawEvent>() => {
                    let (event, outcome, offset) = match received {
                        Ok(r) => r,
                        Err(e) => {
                            // Losing the source terminates the run; restart
                            // and resubscription are external concerns.
                            error!("Source unavailable: {e}");
                            return Err(e.into());
                        }
                    };
                    match outcome {
                        DecodeOutcome::Decoded => {}
                        DecodeOutcome::EmptyPayload => {
                            warn!("Received empty payload");
                            metrics::counter!(EMPTY_PAYLOADS).increment(1);
                        }
                        DecodeOutcome::Malformed => {
                            warn!("Received undecodable payload, ingesting as all-null");
                            metrics::counter!(MALFORMED_PAYLOADS).increment(1);
                        }
                    }
                    metrics::counter!(EVENTS_RECEIVED).increment(1);
                    batch.push(event.normalize(Utc::now()));
                    checkpoint.push(offset);
                }
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }
        acquire_time.fin();

        metrics::histogram!(BATCH_SIZE).record(batch.len() as f64);

        let commit_time = common_metrics::timing_guard(BATCH_COMMIT_TIME);
        let result = context.writer.commit(batch_id, batch).await;
        match &result {
            Ok(BatchOutcome::Skipped) => {
                info!("[Batch {batch_id}] Empty batch. Skipping write.");
                metrics::counter!(BATCHES_SKIPPED).increment(1);
            }
            Ok(BatchOutcome::Committed {
                count,
                partitions_written,
                total_records,
            }) => {
                info!(
                    "[Batch {batch_id}] Write complete | Records: {count} | Partitions: {partitions_written} | Total records: {total_records}"
                );
                metrics::counter!(BATCHES_COMMITTED).increment(1);
                metrics::counter!(RECORDS_WRITTEN).increment(*count as u64);
                metrics::histogram!(PARTITIONS_PER_BATCH).record(*partitions_written as f64);
                metrics::gauge!(CUMULATIVE_TOTAL).set(*total_records as f64);
            }
            Err(e) => {
                error!("[Batch {batch_id}] Write failed: {e}");
                metrics::counter!(BATCHES_FAILED).increment(1);
            }
        }

        // The checkpoint only moves once the batch is durable. If storing
        // fails the data is already written, so we stop rather than risk
        // committing a position we never stored.
        if let Err(e) = settle(&result, checkpoint) {
            metrics::counter!(OFFSET_STORE_FAILED).increment(1);
            error!("[Batch {batch_id}] Failed to store offset: {e}");
            return Err(e.into());
        }
        commit_time.fin();

        if let Err(e) = result {
            // The failed batch's positions were withheld. Stopping here
            // keeps the durable checkpoint behind the failure so the next
            // subscription replays the batch; running on would let later
            // batches store positions past it.
            return Err(e.into());
        }

        batch_id += 1;
    }

    info!("Shutting down");

    Ok(())
}
