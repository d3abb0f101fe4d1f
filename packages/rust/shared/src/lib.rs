//! Shared types, error model, and configuration for Harvester.
//!
//! This crate is the foundation depended on by all other Harvester crates.
//! It provides:
//! - [`HarvesterError`]: the unified error type
//! - Job types ([`JobConfig`], [`InputConfig`], [`OutputConfig`], [`TransformStep`])
//! - Configuration ([`AppConfig`], [`HttpConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DestinationConfig, HttpConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, parse_config,
};
pub use error::{HarvesterError, Result};
pub use types::{
    ContentKind, InputConfig, InputSource, JobConfig, META_JOB_KEY, META_TIMESTAMP_KEY,
    MergeConfig, OutputConfig, RequestConfig, ScheduleConfig, TransformStep, normalize_cron,
};
