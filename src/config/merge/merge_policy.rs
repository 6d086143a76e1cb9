//! Merge rules: built-in defaults sit below every other source.

use crate::config::{default_cache_path, default_state_path};
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with the built-in defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("policy", "last-successful")?
        .set_default(
            "storage.state_path",
            default_state_path().to_string_lossy().to_string(),
        )?
        .set_default(
            "storage.cache_path",
            default_cache_path().to_string_lossy().to_string(),
        )?
        .set_default("storage.max_history", 50_i64)?
        .set_default("resolver.allow_snapshots", false)?
        .set_default("resolver.offline", false)
}
