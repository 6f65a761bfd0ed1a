//! Environment-variable configuration loading for the hearth daemon.
//!
//! Follows the `Config::from_env()` idiom: read each variable with a
//! documented default, fail fast on the first missing/invalid required
//! value. A `.env` file is loaded first if present.

pub mod env_helpers;
pub mod error;
pub mod settings;

pub use error::{ConfigError, Result};
pub use settings::{
    AlertSettings, BackoffSettings, Compression, ConnectionSettings, ObservabilitySettings,
    PipelineSettings, Settings, WriterSettings,
};
