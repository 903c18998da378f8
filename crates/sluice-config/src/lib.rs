//! Sluice Config - configuration handed to the pipeline and stores at startup.

mod config;
mod error;
mod logging;
mod paths;

pub use config::*;
pub use error::{ConfigError, ConfigResult};
pub use logging::init_tracing;
pub use paths::AppPaths;
