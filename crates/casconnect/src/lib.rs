//! Connection lifecycle and transaction coordinator for CUBRID broker sessions.
//!
//! A [`Connection`] sits between application code and one broker [`Session`].
//! It tracks every statement created under it, drives them through commit
//! and rollback, translates isolation levels into the broker's code space
//! and tears everything down exactly once on close.
//!
//! The wire protocol itself is out of scope: callers supply a [`Session`]
//! implementation, and [`testing::MockSession`] stands in for one in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use casconnect::{Connection, StatementOptions, load_config};
//!
//! let config = load_config()?.build()?;
//! casconnect::init_logging(config.logging());
//! let conn = Connection::open(session, &config)?;
//! let stmt = conn.prepare_statement("SELECT * FROM athlete", StatementOptions::new())?;
//! conn.commit()?;
//! conn.close();
//! ```

pub mod config;
mod connection;
mod error;
pub mod isolation;
mod metadata;
pub mod observability;
mod out_result;
pub mod session;
pub mod statement;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{
    ConfigBuilder, ConnectionConfig, LoggingConfig, load_config, load_config_from_path,
};
pub use connection::{Capability, Connection};
pub use error::{Error, Result};
pub use isolation::{IsolationLevel, IsolationTable};
pub use metadata::{DatabaseMetadata, SHARD_ID_INVALID, ShardMetadata};
pub use observability::init_logging;
pub use out_result::OutResultSet;
pub use session::{
    CasChangeMode, CasInfo, ErrorInfo, IsolationCode, LobHandle, LobKind, PrepareFlag, Session,
    StatementHandle,
};
pub use statement::{
    Concurrency, Holdability, ResultSetType, Statement, StatementId, StatementKind,
    StatementOptions,
};
