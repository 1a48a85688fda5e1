//! Contract consumed from the broker session.
//!
//! A [`Session`] is one physical channel to a CAS broker. It is not
//! thread-safe on its own: the coordinator keeps it behind a mutex and
//! never issues two calls at once. Calls do not return `Result`; after each
//! one the coordinator reads [`Session::recent_error`] and converts any
//! non-success code into an [`Error`](crate::Error).

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Error code and message left behind by the last session call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: i32,
    pub message: String,
}

impl ErrorInfo {
    /// Sentinel code for a successful call.
    pub const NO_ERROR: i32 = 0;

    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn none() -> Self {
        Self {
            code: Self::NO_ERROR,
            message: String::new(),
        }
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.code == Self::NO_ERROR
    }

    /// Translate into the crate error; logs the failure on the way out.
    pub fn into_result(self) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(Error::from(self))
        }
    }
}

/// Error left by a statement handle call, if any.
pub(crate) fn handle_failure(session: &mut dyn Session) -> Option<ErrorInfo> {
    let info = session.recent_error();
    (!info.is_ok()).then_some(info)
}

impl Default for ErrorInfo {
    fn default() -> Self {
        Self::none()
    }
}

/// Flag byte sent with a prepare request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrepareFlag(u8);

impl PrepareFlag {
    pub const PLAIN: Self = Self(0x00);
    pub const UPDATABLE: Self = Self(0x02);
    pub const HOLDABLE: Self = Self(0x08);
    pub const CALL: Self = Self(0x40);

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Native isolation code understood by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IsolationCode(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobKind {
    Blob,
    Clob,
}

/// Packed server-side LOB locator, opaque to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LobHandle(pub Vec<u8>);

impl LobHandle {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Broker process serving the session, used for display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasInfo {
    pub ip: String,
    pub port: u16,
    pub id: i32,
    pub process_id: i32,
}

/// Whether the broker may hand the session to another CAS between transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CasChangeMode {
    Auto = 1,
    Keep = 2,
}

impl TryFrom<i32> for CasChangeMode {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            1 => Ok(Self::Auto),
            2 => Ok(Self::Keep),
            other => Err(Error::InvalidParameterValue(format!(
                "unknown CAS change mode {other}"
            ))),
        }
    }
}

/// Server-side statement or cursor handle produced by `prepare`.
///
/// Statement internals (binding, execution, fetching) live behind this trait;
/// the coordinator only drives the transaction-end disposal of the handle.
pub trait StatementHandle: Send + fmt::Debug {
    fn server_handle(&self) -> i32;

    /// Free client-side results; the server keeps the prepared handle.
    fn complete(&mut self, session: &mut dyn Session);

    /// Release the server-side handle.
    fn close(&mut self, session: &mut dyn Session);
}

/// One physical channel to the database broker.
pub trait Session: Send + fmt::Debug {
    fn prepare(&mut self, sql: &str, flag: PrepareFlag) -> Option<Box<dyn StatementHandle>>;

    fn end_transaction(&mut self, commit: bool);

    fn set_auto_commit(&mut self, auto_commit: bool);

    /// Ask the broker to commit on its own after generated-key retrieval.
    fn turn_on_auto_commit_by_self(&mut self);

    fn set_isolation_level(&mut self, code: IsolationCode);

    fn isolation_level(&mut self) -> IsolationCode;

    fn set_lock_timeout(&mut self, timeout: Duration);

    /// Returns the previous raw mode.
    fn set_cas_change_mode(&mut self, mode: CasChangeMode) -> i32;

    fn lob_new(&mut self, kind: LobKind) -> Option<LobHandle>;

    fn lob_write(&mut self, handle: &LobHandle, offset: u64, buf: &[u8]) -> usize;

    fn lob_read(&mut self, handle: &LobHandle, offset: u64, buf: &mut [u8]) -> usize;

    fn shard_id(&mut self) -> i32;

    fn is_connected_to_proxy(&mut self) -> bool;

    fn recent_error(&mut self) -> ErrorInfo;

    fn protocol_version_at_least(&self, version: u8) -> bool;

    fn supports_holdable_result(&self) -> bool;

    fn supports_statement_pooling(&self) -> bool;

    /// Default query timeout in seconds; zero means none.
    fn query_timeout(&self) -> u32;

    fn is_valid(&mut self, timeout: Duration) -> bool;

    fn cas_info(&self) -> CasInfo;

    fn close(&mut self);
}
