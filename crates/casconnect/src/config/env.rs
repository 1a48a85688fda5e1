//! Environment variable loading for configuration

use std::env;
use std::time::Duration;

use url::Url;

use super::builder::ConfigBuilder;
use crate::Result;
use crate::isolation::IsolationLevel;
use crate::statement::Holdability;

/// Environment variable names
mod vars {
    pub const CUBRID_URL: &str = "CUBRID_URL";
    pub const CUBRID_USER: &str = "CUBRID_USER";
    pub const CUBRID_AUTOCOMMIT: &str = "CUBRID_AUTOCOMMIT";
    pub const CUBRID_HOLDABILITY: &str = "CUBRID_HOLDABILITY";
    pub const CUBRID_LOCK_TIMEOUT_MS: &str = "CUBRID_LOCK_TIMEOUT_MS";
    pub const CUBRID_ISOLATION: &str = "CUBRID_ISOLATION";
    pub const RUST_LOG: &str = "RUST_LOG";
    pub const CUBRID_JSON_LOGS: &str = "CUBRID_JSON_LOGS";
}

/// Load configuration from environment variables
pub fn load_from_env(mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    if let Ok(url_str) = env::var(vars::CUBRID_URL) {
        let url = Url::parse(&url_str)
            .map_err(|e| crate::Error::Config(format!("Invalid {}: {}", vars::CUBRID_URL, e)))?;
        builder = builder.url(url);
    }

    if let Ok(user) = env::var(vars::CUBRID_USER) {
        builder = builder.user(user);
    }

    if let Ok(val) = env::var(vars::CUBRID_AUTOCOMMIT) {
        builder = builder.auto_commit(parse_bool(&val));
    }

    if let Ok(val) = env::var(vars::CUBRID_HOLDABILITY) {
        builder = builder.holdability(val.parse::<Holdability>()?);
    }

    // Unparseable timeouts are ignored
    if let Ok(ms_str) = env::var(vars::CUBRID_LOCK_TIMEOUT_MS)
        && let Ok(ms) = ms_str.parse::<u64>()
    {
        builder = builder.lock_timeout(Some(Duration::from_millis(ms)));
    }

    if let Ok(val) = env::var(vars::CUBRID_ISOLATION) {
        builder = builder.isolation(Some(val.parse::<IsolationLevel>()?));
    }

    if let Ok(level) = env::var(vars::RUST_LOG) {
        builder = builder.log_level(level);
    }

    if let Ok(val) = env::var(vars::CUBRID_JSON_LOGS) {
        builder = builder.json_logs(parse_bool(&val));
    }

    Ok(builder)
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
