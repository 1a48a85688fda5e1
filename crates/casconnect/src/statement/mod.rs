//! Statements created under a connection.
//!
//! Provides:
//! - `Statement`: a plain, prepared or callable statement bound to one connection
//! - `StatementOptions` and the cursor option enums
//! - `StatementRegistry`: the connection's ordered set of live statements

mod options;
mod registry;

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

pub use options::{Concurrency, Holdability, ResultSetType, StatementOptions};
pub(crate) use registry::{StatementRegistry, TransactionEnd};

use crate::connection::Inner;
use crate::error::Result;
use crate::session::{ErrorInfo, Session, StatementHandle, handle_failure};

/// Identifier unique within one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(pub(crate) u64);

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stmt#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Ad-hoc statement; its handle is attached on first execution.
    Plain,
    Prepared,
    Callable,
}

impl StatementKind {
    #[must_use]
    pub const fn is_prepared(self) -> bool {
        matches!(self, Self::Prepared | Self::Callable)
    }
}

#[derive(Debug)]
struct StatementState {
    handle: Option<Box<dyn StatementHandle>>,
    current_transaction: bool,
    query_timeout: u32,
    closed: bool,
}

/// A statement registered with a [`Connection`](crate::Connection).
///
/// Statements hold only a weak reference back to their connection, so a
/// dropped connection is never kept alive by an outstanding statement.
#[derive(Debug)]
pub struct Statement {
    id: StatementId,
    kind: StatementKind,
    sql: Option<String>,
    result_set_type: ResultSetType,
    concurrency: Concurrency,
    holdability: Holdability,
    generated_keys: bool,
    state: Mutex<StatementState>,
    connection: Weak<Inner>,
}

impl Statement {
    pub(crate) fn new(
        id: StatementId,
        kind: StatementKind,
        sql: Option<String>,
        options: StatementOptions,
        holdability: Holdability,
        handle: Option<Box<dyn StatementHandle>>,
        connection: Weak<Inner>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            sql,
            result_set_type: options.result_set_type,
            concurrency: options.concurrency,
            holdability,
            generated_keys: options.generated_keys,
            state: Mutex::new(StatementState {
                handle,
                current_transaction: true,
                query_timeout: 0,
                closed: false,
            }),
            connection,
        })
    }

    pub const fn id(&self) -> StatementId {
        self.id
    }

    pub const fn kind(&self) -> StatementKind {
        self.kind
    }

    pub const fn is_prepared(&self) -> bool {
        self.kind.is_prepared()
    }

    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    pub const fn result_set_type(&self) -> ResultSetType {
        self.result_set_type
    }

    pub const fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// Effective holdability; `HoldOverCommit` only when the broker supports it.
    pub const fn holdability(&self) -> Holdability {
        self.holdability
    }

    pub const fn generated_keys(&self) -> bool {
        self.generated_keys
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Whether results were produced inside the transaction still open.
    pub fn is_current_transaction(&self) -> bool {
        self.state.lock().current_transaction
    }

    /// Called by executors whenever the statement runs again.
    pub fn mark_current_transaction(&self) {
        self.state.lock().current_transaction = true;
    }

    pub(crate) fn set_current_transaction(&self, current: bool) {
        self.state.lock().current_transaction = current;
    }

    /// Query timeout in seconds; zero means none.
    pub fn query_timeout(&self) -> u32 {
        self.state.lock().query_timeout
    }

    pub fn set_query_timeout(&self, seconds: u32) {
        self.state.lock().query_timeout = seconds;
    }

    /// Attach the server handle produced by executing a plain statement.
    pub fn attach_handle(&self, handle: Box<dyn StatementHandle>) {
        self.state.lock().handle = Some(handle);
    }

    /// Run `f` against the server handle, if one is attached.
    ///
    /// The statement lock is held while `f` runs. Never call back into the
    /// connection from `f`: take the session first with
    /// [`Connection::with_session`](crate::Connection::with_session) and
    /// reach the handle from inside that closure.
    pub fn with_handle<R>(&self, f: impl FnOnce(&mut dyn StatementHandle) -> R) -> Option<R> {
        let mut state = self.state.lock();
        let handle = state.handle.as_mut()?;
        Some(f(handle.as_mut()))
    }

    /// Soft completion: free results, keep the handle.
    pub(crate) fn complete(&self, session: &mut dyn Session) -> Option<ErrorInfo> {
        let mut state = self.state.lock();
        let handle = state.handle.as_mut()?;
        handle.complete(session);
        handle_failure(session)
    }

    /// Full disposal: release the handle and mark the statement closed.
    pub(crate) fn dispose(&self, session: &mut dyn Session) -> Option<ErrorInfo> {
        let handle = {
            let mut state = self.state.lock();
            state.closed = true;
            state.handle.take()
        };
        let mut handle = handle?;
        handle.close(session);
        handle_failure(session)
    }

    /// Close the statement and deregister it from its connection. Idempotent.
    ///
    /// The statement leaves the registry even when the broker reports an
    /// error releasing its handle.
    pub fn close(&self) -> Result<()> {
        let handle = {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.handle.take()
        };

        let Some(connection) = self.connection.upgrade() else {
            return Ok(());
        };
        let released = match handle {
            Some(mut handle) => connection.call(|session| handle.close(session)),
            None => Ok(()),
        };
        connection.remove_statement(self.id);
        released
    }
}
