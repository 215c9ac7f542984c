pub mod app_context;
pub mod checkpoint;
pub mod config;
pub mod counter;
pub mod metrics_consts;
pub mod table;
pub mod types;
pub mod writer;
