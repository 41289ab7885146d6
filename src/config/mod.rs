//! Collector configuration loaded from YAML.

mod collector_config;

pub use collector_config::{load_or_create_config, CollectorConfig, LimitsConfig};
