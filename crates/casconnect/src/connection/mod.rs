//! Connection lifecycle and transaction coordinator.
//!
//! A [`Connection`] owns one broker [`Session`] together with the registry of
//! statements and out-result-sets created under it. Two locks guard it:
//!
//! - the coordinator lock (`state`) protects the open/autocommit/ending flags
//!   and both registries;
//! - the session lock serializes protocol calls, so no two calls on the shared
//!   session ever interleave.
//!
//! Lock order is always coordinator, then session, then statement.
//!
//! # Example
//!
//! ```rust,ignore
//! let conn = casconnect::Connection::new(session, "cubrid://db:33000/demodb", "dba");
//! conn.set_auto_commit(false)?;
//! let stmt = conn.prepare_statement("UPDATE t SET v = ?", StatementOptions::new())?;
//! conn.commit()?;
//! conn.close();
//! ```

mod capability;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

pub use capability::Capability;

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::isolation::{IsolationLevel, IsolationTable, NEW_ISOLATION_PROTOCOL};
use crate::metadata::{DatabaseMetadata, SHARD_ID_INVALID, ShardMetadata};
use crate::out_result::{OutResultSet, OutResultSetRegistry};
use crate::session::{
    CasChangeMode, ErrorInfo, LobHandle, LobKind, PrepareFlag, Session, StatementHandle,
};
use crate::statement::{
    Holdability, Statement, StatementId, StatementKind, StatementOptions, StatementRegistry,
    TransactionEnd,
};

#[derive(Debug)]
struct SessionSlot {
    session: Option<Box<dyn Session>>,
    last_error: Option<ErrorInfo>,
}

impl SessionSlot {
    /// One protocol call followed by the error check. Caller holds the session lock.
    fn call<T>(&mut self, f: impl FnOnce(&mut dyn Session) -> T) -> Result<T> {
        let session = self.session.as_mut().ok_or(Error::ConnectionClosed)?;
        let value = f(session.as_mut());
        let info = session.recent_error();
        if info.is_ok() {
            Ok(value)
        } else {
            self.last_error = Some(info.clone());
            Err(Error::from(info))
        }
    }
}

#[derive(Debug)]
struct State {
    open: bool,
    auto_commit: bool,
    holdability: Holdability,
    /// Set while commit/rollback runs; re-entrant calls return early.
    ending: bool,
    auto_generated_keys: bool,
    statements: StatementRegistry,
    out_result_sets: OutResultSetRegistry,
    metadata: Option<Arc<DatabaseMetadata>>,
    shard_metadata: Option<Arc<ShardMetadata>>,
    next_statement_id: u64,
}

/// Shared core of a connection; statements and metadata hold it weakly.
#[derive(Debug)]
pub(crate) struct Inner {
    url: String,
    user: String,
    state: Mutex<State>,
    session: Mutex<SessionSlot>,
}

impl Inner {
    fn lock_open(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.state.lock();
        if state.open {
            Ok(state)
        } else {
            Err(Error::ConnectionClosed)
        }
    }

    /// One protocol call under the session lock, followed by the error check.
    pub(crate) fn call<T>(&self, f: impl FnOnce(&mut dyn Session) -> T) -> Result<T> {
        self.session.lock().call(f)
    }

    /// Capability or best-effort query; no error check.
    pub(crate) fn peek<T>(&self, f: impl FnOnce(&mut dyn Session) -> T) -> Option<T> {
        let mut slot = self.session.lock();
        let session = slot.session.as_mut()?;
        Some(f(session.as_mut()))
    }

    pub(crate) fn remove_statement(&self, id: StatementId) -> bool {
        let removed = self.state.lock().statements.remove(id).is_some();
        if removed {
            tracing::debug!(statement = %id, "Statement deregistered");
        }
        removed
    }

    fn register(&self, state: &mut State, statement: &Arc<Statement>) {
        state.statements.add(Arc::clone(statement));
        let timeout = self.peek(|session| session.query_timeout()).unwrap_or(0);
        if timeout > 0 {
            statement.set_query_timeout(timeout);
        }
        tracing::debug!(
            statement = %statement.id(),
            kind = ?statement.kind(),
            registered = state.statements.len(),
            "Statement registered"
        );
    }

    const fn next_statement_id(state: &mut State) -> StatementId {
        state.next_statement_id += 1;
        StatementId(state.next_statement_id)
    }

    /// Close everything once. Returns false if already closed.
    fn shutdown(&self) -> bool {
        let mut state = self.state.lock();
        if !state.open {
            return false;
        }
        state.open = false;
        let statements = state.statements.take_all();
        let cursors = state.out_result_sets.take_all();
        state.shard_metadata = None;
        if let Some(metadata) = state.metadata.take() {
            metadata.close();
        }

        let mut slot = self.session.lock();
        if let Some(mut session) = slot.session.take() {
            for statement in &statements {
                if let Some(info) = statement.dispose(session.as_mut()) {
                    tracing::warn!(
                        statement = %statement.id(),
                        code = info.code,
                        message = %info.message,
                        "Statement release failed during close"
                    );
                }
            }
            for cursor in &cursors {
                if let Some(info) = cursor.close(session.as_mut()) {
                    tracing::warn!(
                        handle = cursor.server_handle(),
                        code = info.code,
                        message = %info.message,
                        "Out-result-set release failed during close"
                    );
                }
            }
            session.close();
        }
        slot.last_error = None;
        tracing::info!(
            url = %self.url,
            statements = statements.len(),
            out_result_sets = cursors.len(),
            "Connection closed"
        );
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.shutdown() {
            tracing::debug!(url = %self.url, "Connection released on drop");
        }
    }
}

/// Clears the `ending` flag on every exit path of commit/rollback.
struct EndingGuard<'a>(&'a Inner);

impl Drop for EndingGuard<'_> {
    fn drop(&mut self) {
        self.0.state.lock().ending = false;
    }
}

/// Client connection to a CUBRID broker.
///
/// Cloning yields another handle to the same connection; all clones share
/// one session and one transaction.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Wrap an already established session.
    pub fn new(session: Box<dyn Session>, url: impl Into<String>, user: impl Into<String>) -> Self {
        let url = url.into();
        let user = user.into();
        tracing::info!(url = %url, user = %user, "Connection opened");
        Self {
            inner: Arc::new(Inner {
                url,
                user,
                state: Mutex::new(State {
                    open: true,
                    auto_commit: true,
                    holdability: Holdability::HoldOverCommit,
                    ending: false,
                    auto_generated_keys: false,
                    statements: StatementRegistry::default(),
                    out_result_sets: OutResultSetRegistry::default(),
                    metadata: None,
                    shard_metadata: None,
                    next_statement_id: 0,
                }),
                session: Mutex::new(SessionSlot {
                    session: Some(session),
                    last_error: None,
                }),
            }),
        }
    }

    /// Wrap a session and apply the connection settings from `config`.
    pub fn open(session: Box<dyn Session>, config: &ConnectionConfig) -> Result<Self> {
        let connection = Self::new(session, config.url.as_str(), config.user.as_str());
        connection.set_holdability(config.holdability)?;
        connection.set_auto_generated_keys(config.auto_generated_keys)?;
        if let Some(timeout) = config.lock_timeout {
            connection.set_lock_timeout(timeout)?;
        }
        if let Some(level) = config.isolation {
            connection.set_transaction_isolation(level)?;
        }
        if !config.auto_commit {
            connection.set_auto_commit(false)?;
        }
        Ok(connection)
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn user(&self) -> &str {
        &self.inner.user
    }

    fn ensure_open(&self) -> Result<()> {
        self.inner.lock_open().map(drop)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Close all statements and out-result-sets, then release the session.
    /// Repeated calls do nothing.
    pub fn close(&self) {
        self.inner.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        !self.inner.state.lock().open
    }

    /// False when closed; otherwise asks the broker within `timeout`.
    pub fn is_valid(&self, timeout: Duration) -> bool {
        if self.is_closed() {
            return false;
        }
        self.inner
            .peek(|session| session.is_valid(timeout))
            .unwrap_or(false)
    }

    /// Last non-success error reported by the session.
    pub fn last_error(&self) -> Option<ErrorInfo> {
        self.inner.session.lock().last_error.clone()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Statement factories
    // ═══════════════════════════════════════════════════════════════════════

    /// Create an ad-hoc statement. No protocol call is made.
    pub fn create_statement(&self, options: StatementOptions) -> Result<Arc<Statement>> {
        let mut state = self.inner.lock_open()?;
        options.validate()?;
        let requested = options.holdability.unwrap_or(state.holdability);
        let holdable = self
            .inner
            .peek(|session| session.supports_holdable_result())
            .unwrap_or(false);

        let statement = Statement::new(
            Inner::next_statement_id(&mut state),
            StatementKind::Plain,
            None,
            options,
            effective_holdability(requested, holdable),
            None,
            Arc::downgrade(&self.inner),
        );
        self.inner.register(&mut state, &statement);
        Ok(statement)
    }

    pub fn prepare_statement(&self, sql: &str, options: StatementOptions) -> Result<Arc<Statement>> {
        self.prepare(sql, StatementKind::Prepared, options)
    }

    /// Prepare a stored procedure call. Cursor options are not configurable.
    pub fn prepare_call(&self, sql: &str) -> Result<Arc<Statement>> {
        self.prepare(sql, StatementKind::Callable, StatementOptions::new())
    }

    fn prepare(
        &self,
        sql: &str,
        kind: StatementKind,
        options: StatementOptions,
    ) -> Result<Arc<Statement>> {
        let mut state = self.inner.lock_open()?;
        options.validate()?;
        let requested = options.holdability.unwrap_or(state.holdability);

        let prepared = self.inner.call(|session| {
            let holdable = session.supports_holdable_result();
            let flag = if kind == StatementKind::Callable {
                PrepareFlag::CALL
            } else {
                options.prepare_flag(requested, holdable)
            };
            (session.prepare(sql, flag), holdable)
        });

        let (handle, holdable) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                drop(state);
                if let Err(rollback_err) = self.rollback_if_auto() {
                    tracing::warn!(error = %rollback_err, "Rollback after failed prepare failed");
                }
                return Err(err);
            }
        };
        let handle = handle
            .ok_or_else(|| Error::Internal("prepare returned no statement handle".into()))?;

        let statement = Statement::new(
            Inner::next_statement_id(&mut state),
            kind,
            Some(sql.to_owned()),
            options,
            effective_holdability(requested, holdable),
            Some(handle),
            Arc::downgrade(&self.inner),
        );
        self.inner.register(&mut state, &statement);
        Ok(statement)
    }

    /// Deregister a statement without closing it.
    pub fn remove_statement(&self, id: StatementId) -> bool {
        self.inner.remove_statement(id)
    }

    pub fn statement_count(&self) -> usize {
        self.inner.state.lock().statements.len()
    }

    /// Registered statements, in registration order.
    pub fn statements(&self) -> Vec<Arc<Statement>> {
        self.inner.state.lock().statements.snapshot()
    }

    /// Track a procedure result cursor until the connection closes.
    pub fn add_out_result_set(&self, handle: Box<dyn StatementHandle>) -> Result<Arc<OutResultSet>> {
        let mut state = self.inner.lock_open()?;
        let cursor = OutResultSet::new(handle);
        state.out_result_sets.add(Arc::clone(&cursor));
        Ok(cursor)
    }

    pub fn out_result_set_count(&self) -> usize {
        self.inner.state.lock().out_result_sets.len()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Transactions
    // ═══════════════════════════════════════════════════════════════════════

    pub fn commit(&self) -> Result<()> {
        self.end_transaction(TransactionEnd::Commit)
    }

    pub fn rollback(&self) -> Result<()> {
        self.end_transaction(TransactionEnd::Rollback)
    }

    /// Commit only when autocommit is on.
    pub fn commit_if_auto(&self) -> Result<()> {
        if self.get_auto_commit()? {
            self.commit()
        } else {
            Ok(())
        }
    }

    /// Roll back only when autocommit is on.
    pub fn rollback_if_auto(&self) -> Result<()> {
        if self.get_auto_commit()? {
            self.rollback()
        } else {
            Ok(())
        }
    }

    fn end_transaction(&self, end: TransactionEnd) -> Result<()> {
        let generated_keys = {
            let mut state = self.inner.lock_open()?;
            if state.ending {
                tracing::debug!(?end, "Transaction end already in progress");
                return Ok(());
            }
            state.ending = true;
            state.auto_generated_keys
        };
        let _ending = EndingGuard(&self.inner);

        // The session lock is held from the completion pass through the
        // end-transaction call, so nothing can register in between.
        let mut state = self.inner.state.lock();
        let mut slot = self.inner.session.lock();
        let session = slot.session.as_mut().ok_or(Error::ConnectionClosed)?;
        let outcome = state.statements.complete(end, session.as_mut());
        drop(state);
        tracing::debug!(
            ?end,
            retained = outcome.retained.len(),
            completed = outcome.completed.len(),
            disposed = outcome.disposed.len(),
            pooled = outcome.pooled.len(),
            "Statements completed"
        );
        if let Some(info) = &outcome.error {
            slot.last_error = Some(info.clone());
        }

        let commit = end == TransactionEnd::Commit;
        let ended = slot.call(|session| {
            if generated_keys {
                session.turn_on_auto_commit_by_self();
            }
            session.end_transaction(commit);
        });
        drop(slot);

        if let Some(info) = outcome.error {
            return Err(Error::from(info));
        }
        ended?;
        tracing::debug!(?end, "Transaction ended");
        Ok(())
    }

    /// Switching modes commits the open transaction first.
    pub fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        let current = self.inner.lock_open()?.auto_commit;
        if current != auto_commit {
            self.commit()?;
        }
        self.inner.lock_open()?.auto_commit = auto_commit;
        self.inner.call(|session| session.set_auto_commit(auto_commit))
    }

    pub fn get_auto_commit(&self) -> Result<bool> {
        Ok(self.inner.lock_open()?.auto_commit)
    }

    /// Commits, then installs `level` using the code space of the broker.
    pub fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        self.ensure_open()?;
        self.commit()?;
        let code = self.isolation_table()?.to_wire(level)?;
        self.inner.call(|session| session.set_isolation_level(code))?;
        tracing::debug!(%level, code = code.0, "Isolation level changed");
        Ok(())
    }

    pub fn get_transaction_isolation(&self) -> Result<IsolationLevel> {
        self.ensure_open()?;
        let code = self.inner.call(|session| session.isolation_level())?;
        Ok(self.isolation_table()?.from_wire(code))
    }

    fn isolation_table(&self) -> Result<IsolationTable> {
        self.inner
            .peek(|session| {
                IsolationTable::select(session.protocol_version_at_least(NEW_ISOLATION_PROTOCOL))
            })
            .ok_or(Error::ConnectionClosed)
    }

    /// Default holdability, downgraded when the broker cannot hold results.
    pub fn get_holdability(&self) -> Result<Holdability> {
        let default = self.inner.lock_open()?.holdability;
        let holdable = self
            .inner
            .peek(|session| session.supports_holdable_result())
            .ok_or(Error::ConnectionClosed)?;
        Ok(effective_holdability(default, holdable))
    }

    pub fn set_holdability(&self, holdability: Holdability) -> Result<()> {
        self.inner.lock_open()?.holdability = holdability;
        Ok(())
    }

    /// When on, each transaction end first asks the broker to commit by itself.
    pub fn set_auto_generated_keys(&self, enabled: bool) -> Result<()> {
        self.inner.lock_open()?.auto_generated_keys = enabled;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Session settings
    // ═══════════════════════════════════════════════════════════════════════

    pub fn set_lock_timeout(&self, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        self.inner.call(|session| session.set_lock_timeout(timeout))
    }

    /// Returns the previous raw mode. Unknown modes fail before any protocol call.
    pub fn set_cas_change_mode(&self, mode: i32) -> Result<i32> {
        self.ensure_open()?;
        let mode = CasChangeMode::try_from(mode)?;
        self.inner.call(|session| session.set_cas_change_mode(mode))
    }

    /// Accepted and ignored.
    pub fn set_read_only(&self, _read_only: bool) -> Result<()> {
        self.ensure_open()
    }

    pub fn is_read_only(&self) -> Result<bool> {
        self.ensure_open().map(|()| false)
    }

    pub fn catalog(&self) -> Result<String> {
        self.ensure_open().map(|()| String::new())
    }

    /// Fails with [`Error::UnsupportedCapability`] for every unsupported feature.
    pub fn require(&self, capability: Capability) -> Result<()> {
        self.ensure_open()?;
        if capability.is_supported() {
            Ok(())
        } else {
            Err(Error::UnsupportedCapability(capability))
        }
    }

    /// Run a delegated protocol call on the live session.
    ///
    /// The session lock is held while `f` runs. It must be the outer lock:
    /// statement handles may be reached from inside `f`, but never call
    /// `with_session` from inside [`Statement::with_handle`].
    pub fn with_session<T>(&self, f: impl FnOnce(&mut dyn Session) -> T) -> Result<T> {
        self.ensure_open()?;
        self.inner.call(f)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Large objects
    // ═══════════════════════════════════════════════════════════════════════

    pub fn lob_new(&self, kind: LobKind) -> Result<LobHandle> {
        self.ensure_open()?;
        self.inner
            .call(|session| session.lob_new(kind))?
            .ok_or_else(|| Error::Internal("LOB allocation returned no handle".into()))
    }

    pub fn lob_write(&self, handle: &LobHandle, offset: u64, buf: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        self.inner
            .call(|session| session.lob_write(handle, offset, buf))
    }

    pub fn lob_read(&self, handle: &LobHandle, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        self.inner.call(|session| session.lob_read(handle, offset, buf))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Metadata and shards
    // ═══════════════════════════════════════════════════════════════════════

    pub fn get_metadata(&self) -> Result<Arc<DatabaseMetadata>> {
        let mut state = self.inner.lock_open()?;
        let metadata = state
            .metadata
            .get_or_insert_with(|| Arc::new(DatabaseMetadata::new(&self.inner.url, &self.inner.user)));
        Ok(Arc::clone(metadata))
    }

    pub fn get_shard_metadata(&self) -> Result<Arc<ShardMetadata>> {
        let mut state = self.inner.lock_open()?;
        let metadata = state
            .shard_metadata
            .get_or_insert_with(|| Arc::new(ShardMetadata::new(Arc::downgrade(&self.inner))));
        Ok(Arc::clone(metadata))
    }

    /// Best effort: [`SHARD_ID_INVALID`] once closed.
    pub fn shard_id(&self) -> i32 {
        self.inner
            .peek(|session| session.shard_id())
            .unwrap_or(SHARD_ID_INVALID)
    }

    pub fn is_shard(&self) -> bool {
        self.inner
            .peek(|session| session.is_connected_to_proxy())
            .unwrap_or(false)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.peek(|session| session.cas_info()) {
            Some(cas) => write!(
                f,
                "Connection({}:{}, {}, {})",
                cas.ip, cas.port, cas.id, cas.process_id
            ),
            None => f.write_str("Connection(closed)"),
        }
    }
}

const fn effective_holdability(requested: Holdability, holdable_supported: bool) -> Holdability {
    match requested {
        Holdability::HoldOverCommit if holdable_supported => Holdability::HoldOverCommit,
        _ => Holdability::CloseAtCommit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockSession, Op};

    fn connect(session: &MockSession) -> Connection {
        Connection::new(Box::new(session.clone()), "cubrid://localhost:33000/demodb", "dba")
    }

    #[test]
    fn test_effective_holdability() {
        assert_eq!(
            effective_holdability(Holdability::HoldOverCommit, true),
            Holdability::HoldOverCommit
        );
        assert_eq!(
            effective_holdability(Holdability::HoldOverCommit, false),
            Holdability::CloseAtCommit
        );
        assert_eq!(
            effective_holdability(Holdability::CloseAtCommit, true),
            Holdability::CloseAtCommit
        );
    }

    #[test]
    fn test_new_connection_defaults() {
        let session = MockSession::new();
        let conn = connect(&session);
        assert!(!conn.is_closed());
        assert!(conn.get_auto_commit().unwrap());
        assert_eq!(conn.get_holdability().unwrap(), Holdability::HoldOverCommit);
        assert_eq!(conn.statement_count(), 0);
        assert_eq!(conn.url(), "cubrid://localhost:33000/demodb");
        assert_eq!(conn.user(), "dba");
    }

    #[test]
    fn test_holdability_downgraded_without_support() {
        let session = MockSession::new().with_holdable_result(false);
        let conn = connect(&session);
        assert_eq!(conn.get_holdability().unwrap(), Holdability::CloseAtCommit);
    }

    #[test]
    fn test_ending_flag_cleared_after_failed_commit() {
        let session = MockSession::new();
        let conn = connect(&session);
        session.fail_next(Op::EndTransaction, ErrorInfo::new(-1, "lost"));

        let err = conn.commit().unwrap_err();
        assert_eq!(err.protocol_code(), Some(-1));
        assert!(!conn.inner.state.lock().ending);

        conn.commit().unwrap();
        assert_eq!(session.end_transactions(), vec![true, true]);
    }

    #[test]
    fn test_last_error_recorded() {
        let session = MockSession::new();
        let conn = connect(&session);
        assert!(conn.last_error().is_none());
        session.fail_next(Op::SetLockTimeout, ErrorInfo::new(-75, "bad timeout"));
        assert!(conn.set_lock_timeout(Duration::from_secs(1)).is_err());
        assert_eq!(conn.last_error().unwrap().code, -75);
    }

    #[test]
    fn test_display() {
        let session = MockSession::new();
        let conn = connect(&session);
        assert_eq!(conn.to_string(), "Connection(127.0.0.1:33000, 1, 4242)");
        conn.close();
        assert_eq!(conn.to_string(), "Connection(closed)");
    }

    #[test]
    fn test_drop_releases_session() {
        let session = MockSession::new();
        let conn = connect(&session);
        drop(conn);
        assert!(session.is_closed());
        assert_eq!(session.count(|c| *c == Call::Close), 1);
    }

    #[test]
    fn test_generated_keys_precede_end_transaction() {
        let session = MockSession::new();
        let conn = connect(&session);
        conn.set_auto_generated_keys(true).unwrap();
        conn.commit().unwrap();
        let calls = session.calls();
        let n = calls.len();
        assert_eq!(calls[n - 2], Call::TurnOnAutoCommitBySelf);
        assert_eq!(calls[n - 1], Call::EndTransaction(true));
    }

    #[test]
    fn test_require_capability() {
        let session = MockSession::new();
        let conn = connect(&session);
        assert!(conn.require(Capability::Blob).is_ok());
        assert_eq!(
            conn.require(Capability::Savepoints).unwrap_err(),
            Error::UnsupportedCapability(Capability::Savepoints)
        );
        conn.close();
        assert!(conn.require(Capability::Blob).unwrap_err().is_connection_closed());
    }
}
