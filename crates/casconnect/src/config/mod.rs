//! Configuration management
//!
//! Settings are layered with precedence: env > file > defaults.

mod builder;
mod env;
mod file;

pub use builder::{ConfigBuilder, ConnectionConfig, DEFAULT_USER, LoggingConfig, URL_SCHEME};
pub use env::load_from_env;
pub use file::{find_config_file, load_from_file};

use crate::Result;

/// Load configuration with precedence: env > file > defaults
pub fn load_config() -> Result<ConfigBuilder> {
    let mut builder = ConfigBuilder::new();

    if let Some(path) = file::find_config_file() {
        tracing::info!("Loading configuration from {}", path.display());
        builder = file::load_from_file(&path, builder)?;
    }

    env::load_from_env(builder)
}

/// Load configuration from a specific file path, then apply the environment
pub fn load_config_from_path(path: &std::path::Path) -> Result<ConfigBuilder> {
    let builder = file::load_from_file(path, ConfigBuilder::new())?;
    env::load_from_env(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_from_missing_path() {
        let err = load_config_from_path(std::path::Path::new("/nonexistent/casconnect.toml"))
            .unwrap_err();
        assert!(err.is_config());
    }
}
