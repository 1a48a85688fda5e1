//! Connection configuration builder

use std::time::Duration;

use url::Url;

use crate::Error;
use crate::isolation::IsolationLevel;
use crate::statement::Holdability;

/// URL scheme accepted for broker addresses.
pub const URL_SCHEME: &str = "cubrid";

/// User assumed when neither the builder nor the URL names one.
pub const DEFAULT_USER: &str = "public";

/// Settings applied by [`Connection::open`](crate::Connection::open).
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: Url,
    pub user: String,
    pub auto_commit: bool,
    pub holdability: Holdability,
    pub lock_timeout: Option<Duration>,
    pub isolation: Option<IsolationLevel>,
    pub auto_generated_keys: bool,
    pub logging: LoggingConfig,
}

impl ConnectionConfig {
    #[must_use]
    pub const fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    #[must_use]
    pub const fn logging(&self) -> &LoggingConfig {
        &self.logging
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    pub log_level: String,
    pub json_logs: bool,
}

/// Configuration builder with fluent API
#[derive(Debug)]
pub struct ConfigBuilder {
    url: Option<Url>,
    user: Option<String>,
    auto_commit: bool,
    holdability: Holdability,
    lock_timeout: Option<Duration>,
    isolation: Option<IsolationLevel>,
    auto_generated_keys: bool,
    logging: LoggingConfig,
}

impl ConfigBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            url: None,
            user: None,
            auto_commit: true,
            holdability: Holdability::HoldOverCommit,
            lock_timeout: None,
            isolation: None,
            auto_generated_keys: false,
            logging: LoggingConfig {
                log_level: String::new(),
                json_logs: false,
            },
        }
    }

    #[must_use]
    pub fn url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub const fn auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    #[must_use]
    pub const fn holdability(mut self, holdability: Holdability) -> Self {
        self.holdability = holdability;
        self
    }

    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn isolation(mut self, level: Option<IsolationLevel>) -> Self {
        self.isolation = level;
        self
    }

    #[must_use]
    pub const fn auto_generated_keys(mut self, enabled: bool) -> Self {
        self.auto_generated_keys = enabled;
        self
    }

    #[must_use]
    pub fn log_level(mut self, level: String) -> Self {
        self.logging.log_level = level;
        self
    }

    #[must_use]
    pub const fn json_logs(mut self, enabled: bool) -> Self {
        self.logging.json_logs = enabled;
        self
    }

    pub fn build(self) -> crate::Result<ConnectionConfig> {
        let url = self
            .url
            .ok_or_else(|| Error::Config("connection url is required".into()))?;
        if url.scheme() != URL_SCHEME {
            return Err(Error::Config(format!(
                "unsupported URL scheme '{}', expected '{URL_SCHEME}'",
                url.scheme()
            )));
        }

        let user = self
            .user
            .or_else(|| Some(url.username().to_string()).filter(|u| !u.is_empty()))
            .unwrap_or_else(|| DEFAULT_USER.to_string());

        let log_level = if self.logging.log_level.is_empty() {
            "info".to_string()
        } else {
            self.logging.log_level
        };

        Ok(ConnectionConfig {
            url,
            user,
            auto_commit: self.auto_commit,
            holdability: self.holdability,
            lock_timeout: self.lock_timeout,
            isolation: self.isolation,
            auto_generated_keys: self.auto_generated_keys,
            logging: LoggingConfig {
                log_level,
                json_logs: self.logging.json_logs,
            },
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_build_requires_url() {
        let err = ConfigBuilder::new().build().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("url is required"));
    }

    #[test]
    fn test_build_rejects_foreign_scheme() {
        let err = ConfigBuilder::new()
            .url(url("postgres://localhost:5432/db"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("postgres"));
    }

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::builder()
            .url(url("cubrid://localhost:33000/demodb"))
            .build()
            .unwrap();
        assert_eq!(config.user, DEFAULT_USER);
        assert!(config.auto_commit);
        assert_eq!(config.holdability, Holdability::HoldOverCommit);
        assert!(config.lock_timeout.is_none());
        assert!(config.isolation.is_none());
        assert!(!config.auto_generated_keys);
        assert_eq!(config.logging().log_level, "info");
    }

    #[test]
    fn test_user_from_url() {
        let config = ConfigBuilder::new()
            .url(url("cubrid://dba@localhost:33000/demodb"))
            .build()
            .unwrap();
        assert_eq!(config.user, "dba");
    }

    #[test]
    fn test_explicit_user_wins() {
        let config = ConfigBuilder::new()
            .url(url("cubrid://dba@localhost:33000/demodb"))
            .user("app")
            .build()
            .unwrap();
        assert_eq!(config.user, "app");
    }

    #[test]
    fn test_fluent_settings() {
        let config = ConfigBuilder::default()
            .url(url("cubrid://localhost:33000/demodb"))
            .auto_commit(false)
            .holdability(Holdability::CloseAtCommit)
            .lock_timeout(Some(Duration::from_millis(1500)))
            .isolation(Some(IsolationLevel::Serializable))
            .auto_generated_keys(true)
            .log_level("debug".into())
            .json_logs(true)
            .build()
            .unwrap();
        assert!(!config.auto_commit);
        assert_eq!(config.holdability, Holdability::CloseAtCommit);
        assert_eq!(config.lock_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.isolation, Some(IsolationLevel::Serializable));
        assert!(config.auto_generated_keys);
        assert_eq!(
            config.logging,
            LoggingConfig {
                log_level: "debug".into(),
                json_logs: true
            }
        );
    }
}
