//! Configuration types and loading for the catalog sync services.
//!
//! Settings are read from `configuration/base.*`, then from the environment specific file
//! selected through `APP_ENVIRONMENT`, and finally from `APP_`-prefixed environment variables.
//! `SYNC_CONFIGURATION_DIR` points the loader at another directory.

mod environment;
mod load;
pub mod shared;

pub use environment::{Environment, EnvironmentError};
pub use load::{Config, LoadConfigError, load_config, load_config_from_dir};
