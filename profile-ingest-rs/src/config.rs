use std::collections::HashMap;

use common_kafka::config::{ConsumerConfig, KafkaConfig};
use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(nested = true)]
    pub consumer: ConsumerConfig,

    // Wall-clock micro-batch boundary: everything received since the
    // previous trigger belongs to the current batch, including nothing.
    #[envconfig(default = "10")]
    pub trigger_interval_secs: u64,

    // Parallel append tasks per commit. Bounds per-batch file fan-out in
    // the table store; a throughput knob, not a correctness one.
    #[envconfig(default = "2")]
    pub write_shards: usize,

    #[envconfig(default = "data/user_profiles")]
    pub table_base_path: String,

    // Opaque table store options, a JSON object of string keys and values,
    // forwarded verbatim to the table store.
    #[envconfig(default = "{}")]
    pub table_options: String,

    #[envconfig(default = "data/ingest_total.txt")]
    pub counter_file_path: String,

    // Destructive: wipes the cross-restart running total. Only makes sense
    // for fresh deployments and test runs, never on routine restarts.
    #[envconfig(default = "false")]
    pub reset_counter_on_start: bool,

    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3301")]
    pub port: u16,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        ConsumerConfig::set_defaults("profile-ingest-rs", "user_profiles");
        Self::init_from_env()
    }

    pub fn parsed_table_options(&self) -> Result<HashMap<String, String>, serde_json::Error> {
        serde_json::from_str(&self.table_options)
    }
}
