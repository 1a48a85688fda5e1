//! TOML configuration file loading

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::builder::ConfigBuilder;
use crate::Result;
use crate::isolation::IsolationLevel;
use crate::statement::Holdability;

/// Configuration file locations checked in order
const CONFIG_PATHS: &[&str] = &[
    "./casconnect.toml",
    "~/.config/casconnect/config.toml",
    "/etc/casconnect/config.toml",
];

/// Find the first existing configuration file
pub fn find_config_file() -> Option<PathBuf> {
    for path_str in CONFIG_PATHS {
        let path = if path_str.starts_with('~') {
            if let Ok(home) = std::env::var("HOME") {
                PathBuf::from(path_str.replacen('~', &home, 1))
            } else {
                continue;
            }
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path, builder: ConfigBuilder) -> Result<ConfigBuilder> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let file_config: FileConfig = toml::from_str(&content).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;

    apply_file_config(builder, file_config)
}

fn apply_file_config(mut builder: ConfigBuilder, config: FileConfig) -> Result<ConfigBuilder> {
    if let Some(conn) = config.connection {
        if let Some(url_str) = conn.url {
            let url = Url::parse(&url_str)
                .map_err(|e| crate::Error::Config(format!("Invalid connection URL: {e}")))?;
            builder = builder.url(url);
        }

        if let Some(user) = conn.user {
            builder = builder.user(user);
        }
    }

    if let Some(tx) = config.transaction {
        if let Some(auto_commit) = tx.auto_commit {
            builder = builder.auto_commit(auto_commit);
        }

        if let Some(holdability) = tx.holdability {
            builder = builder.holdability(holdability.parse::<Holdability>()?);
        }

        if let Some(ms) = tx.lock_timeout_ms {
            builder = builder.lock_timeout(Some(Duration::from_millis(ms)));
        }

        if let Some(isolation) = tx.isolation {
            builder = builder.isolation(Some(isolation.parse::<IsolationLevel>()?));
        }

        if let Some(keys) = tx.auto_generated_keys {
            builder = builder.auto_generated_keys(keys);
        }
    }

    if let Some(logging) = config.logging {
        if let Some(level) = logging.log_level {
            builder = builder.log_level(level);
        }

        if let Some(json) = logging.json_logs {
            builder = builder.json_logs(json);
        }
    }

    Ok(builder)
}

/// Root configuration file structure
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    connection: Option<ConnectionSection>,
    transaction: Option<TransactionSection>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Deserialize)]
struct ConnectionSection {
    url: Option<String>,
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionSection {
    auto_commit: Option<bool>,
    holdability: Option<String>,
    lock_timeout_ms: Option<u64>,
    isolation: Option<String>,
    auto_generated_keys: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct LoggingSection {
    log_level: Option<String>,
    json_logs: Option<bool>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[connection]
url = "cubrid://localhost:33000/demodb"
user = "dba"

[transaction]
auto_commit = false
holdability = "close_at_commit"
lock_timeout_ms = 2500
isolation = "repeatable_read"
auto_generated_keys = true

[logging]
log_level = "debug"
json_logs = true
"#;
        let temp_file = create_temp_config(toml_content);

        let config = load_from_file(temp_file.path(), ConfigBuilder::new())
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.url.as_str(), "cubrid://localhost:33000/demodb");
        assert_eq!(config.user, "dba");
        assert!(!config.auto_commit);
        assert_eq!(config.holdability, Holdability::CloseAtCommit);
        assert_eq!(config.lock_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.isolation, Some(IsolationLevel::RepeatableRead));
        assert!(config.auto_generated_keys);
        assert_eq!(config.logging.log_level, "debug");
        assert!(config.logging.json_logs);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml_content = r#"
[connection]
url = "cubrid://localhost:33000/demodb"
"#;
        let config: FileConfig = toml::from_str(toml_content).unwrap();
        assert!(config.connection.is_some());
        assert!(config.transaction.is_none());
        assert!(config.logging.is_none());
    }

    #[test]
    fn test_load_from_file_not_found() {
        let err = load_from_file(
            Path::new("/nonexistent/path/config.toml"),
            ConfigBuilder::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_from_file_invalid_toml() {
        let temp_file = create_temp_config("[connection\nurl = ");
        let err = load_from_file(temp_file.path(), ConfigBuilder::new()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_invalid_isolation_rejected() {
        let toml_content = r#"
[transaction]
isolation = "chaos"
"#;
        let temp_file = create_temp_config(toml_content);
        let err = load_from_file(temp_file.path(), ConfigBuilder::new()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let toml_content = r#"
[connection]
url = "not a url"
"#;
        let temp_file = create_temp_config(toml_content);
        let err = load_from_file(temp_file.path(), ConfigBuilder::new()).unwrap_err();
        assert!(err.to_string().contains("Invalid connection URL"));
    }
}
