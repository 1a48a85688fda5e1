//! Metadata views handed out by a connection.
//!
//! Both views are built lazily on first request and cached by the
//! connection until it closes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

use crate::connection::Inner;

/// Sentinel returned when no shard information is available.
pub const SHARD_ID_INVALID: i32 = -1;

#[derive(Debug)]
pub struct DatabaseMetadata {
    url: String,
    user: String,
    closed: AtomicBool,
}

impl DatabaseMetadata {
    pub(crate) fn new(url: &str, user: &str) -> Self {
        Self {
            url: url.to_owned(),
            user: user.to_owned(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn user_name(&self) -> &str {
        &self.user
    }

    pub const fn driver_name(&self) -> &'static str {
        env!("CARGO_PKG_NAME")
    }

    pub const fn driver_version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Read-through shard information; nothing is cached.
#[derive(Debug)]
pub struct ShardMetadata {
    connection: Weak<Inner>,
}

impl ShardMetadata {
    pub(crate) const fn new(connection: Weak<Inner>) -> Self {
        Self { connection }
    }

    /// Shard that served the last request, or [`SHARD_ID_INVALID`].
    pub fn shard_id(&self) -> i32 {
        self.connection
            .upgrade()
            .and_then(|inner| inner.peek(|session| session.shard_id()))
            .unwrap_or(SHARD_ID_INVALID)
    }

    pub fn is_shard(&self) -> bool {
        self.connection
            .upgrade()
            .and_then(|inner| inner.peek(|session| session.is_connected_to_proxy()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_metadata_fields() {
        let meta = DatabaseMetadata::new("cubrid://db:33000/demodb", "dba");
        assert_eq!(meta.url(), "cubrid://db:33000/demodb");
        assert_eq!(meta.user_name(), "dba");
        assert_eq!(meta.driver_name(), "casconnect");
        assert!(!meta.is_closed());
        meta.close();
        assert!(meta.is_closed());
    }

    #[test]
    fn test_detached_shard_metadata() {
        let shard = ShardMetadata::new(Weak::new());
        assert_eq!(shard.shard_id(), SHARD_ID_INVALID);
        assert!(!shard.is_shard());
    }
}
