/// TOML configuration for the monitor
#[allow(clippy::module_inception)]
pub mod config;

pub use config::{
    AlertsConfig, Config, DevicesConfig, SimulationConfig, StorageConfig, MAX_JITTER_RADIUS,
};
