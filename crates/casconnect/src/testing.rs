//! In-memory [`Session`] for tests.
//!
//! [`MockSession`] is cheap to clone; all clones share one call log, so a
//! test can hand one clone to a [`Connection`](crate::Connection) and keep
//! another as a probe.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::isolation::code;
use crate::session::{
    CasChangeMode, CasInfo, ErrorInfo, IsolationCode, LobHandle, LobKind, PrepareFlag, Session,
    StatementHandle,
};

/// Session operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Prepare,
    EndTransaction,
    SetAutoCommit,
    SetIsolation,
    GetIsolation,
    SetLockTimeout,
    SetCasChangeMode,
    LobNew,
    LobWrite,
    LobRead,
    CompleteHandle,
    CloseHandle,
}

/// One recorded protocol call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Prepare { sql: String, flag: PrepareFlag },
    EndTransaction(bool),
    SetAutoCommit(bool),
    TurnOnAutoCommitBySelf,
    SetIsolation(IsolationCode),
    GetIsolation,
    SetLockTimeout(Duration),
    SetCasChangeMode(CasChangeMode),
    LobNew(LobKind),
    LobWrite { offset: u64, len: usize },
    LobRead { offset: u64, len: usize },
    CompleteHandle(i32),
    CloseHandle(i32),
    Close,
    IsValid,
}

impl Call {
    /// True for calls that reach the broker, as opposed to handle bookkeeping.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        !matches!(self, Self::CompleteHandle(_) | Self::CloseHandle(_))
    }
}

#[derive(Debug)]
struct MockState {
    calls: Vec<Call>,
    failures: Vec<(Op, ErrorInfo)>,
    error: ErrorInfo,
    protocol_version: u8,
    holdable_result: bool,
    statement_pooling: bool,
    query_timeout: u32,
    isolation: IsolationCode,
    cas_change_mode: CasChangeMode,
    lobs: HashMap<Vec<u8>, Vec<u8>>,
    next_handle: i32,
    next_lob: u32,
    shard_id: i32,
    proxy: bool,
    valid: bool,
    closed: bool,
}

impl MockState {
    /// Log the call and arm the error slot. Returns true if the call fails.
    fn begin(&mut self, op: Option<Op>, call: Call) -> bool {
        self.calls.push(call);
        let failure = op.and_then(|op| {
            self.failures
                .iter()
                .position(|(o, _)| *o == op)
                .map(|index| self.failures.remove(index).1)
        });
        match failure {
            Some(info) => {
                self.error = info;
                true
            }
            None => {
                self.error = ErrorInfo::none();
                false
            }
        }
    }

    const fn next_handle(&mut self) -> i32 {
        self.next_handle += 1;
        self.next_handle
    }
}

type EndTransactionHook = Box<dyn FnOnce(bool) + Send>;

#[derive(Clone)]
pub struct MockSession {
    state: Arc<Mutex<MockState>>,
    hook: Arc<Mutex<Option<EndTransactionHook>>>,
}

impl MockSession {
    /// Broker on protocol 8 with holdable results and no statement pooling.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                calls: Vec::new(),
                failures: Vec::new(),
                error: ErrorInfo::none(),
                protocol_version: 8,
                holdable_result: true,
                statement_pooling: false,
                query_timeout: 0,
                isolation: code::READ_COMMITTED,
                cas_change_mode: CasChangeMode::Auto,
                lobs: HashMap::new(),
                next_handle: 0,
                next_lob: 0,
                shard_id: 0,
                proxy: false,
                valid: true,
                closed: false,
            })),
            hook: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn with_protocol_version(self, version: u8) -> Self {
        self.state.lock().protocol_version = version;
        self
    }

    #[must_use]
    pub fn with_holdable_result(self, supported: bool) -> Self {
        self.state.lock().holdable_result = supported;
        self
    }

    #[must_use]
    pub fn with_statement_pooling(self, enabled: bool) -> Self {
        self.state.lock().statement_pooling = enabled;
        self
    }

    #[must_use]
    pub fn with_query_timeout(self, seconds: u32) -> Self {
        self.state.lock().query_timeout = seconds;
        self
    }

    #[must_use]
    pub fn with_shard(self, shard_id: i32, proxy: bool) -> Self {
        {
            let mut state = self.state.lock();
            state.shard_id = shard_id;
            state.proxy = proxy;
        }
        self
    }

    #[must_use]
    pub fn with_valid(self, valid: bool) -> Self {
        self.state.lock().valid = valid;
        self
    }

    /// Make the next call of kind `op` fail with `info`.
    pub fn fail_next(&self, op: Op, info: ErrorInfo) {
        self.state.lock().failures.push((op, info));
    }

    /// Run `hook` inside the next `end_transaction`, with no mock lock held.
    pub fn on_end_transaction(&self, hook: impl FnOnce(bool) + Send + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    /// A fresh statement handle that reports into this session's call log.
    #[must_use]
    pub fn new_handle(&self) -> Box<dyn StatementHandle> {
        let id = self.state.lock().next_handle();
        Box::new(MockStatementHandle {
            id,
            state: Arc::clone(&self.state),
        })
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Commit flags of every `end_transaction` call, in order.
    #[must_use]
    pub fn end_transactions(&self) -> Vec<bool> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::EndTransaction(commit) => Some(*commit),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockSession")
            .field("protocol_version", &state.protocol_version)
            .field("calls", &state.calls.len())
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

impl Session for MockSession {
    fn prepare(&mut self, sql: &str, flag: PrepareFlag) -> Option<Box<dyn StatementHandle>> {
        let failed = self.state.lock().begin(
            Some(Op::Prepare),
            Call::Prepare {
                sql: sql.to_owned(),
                flag,
            },
        );
        if failed { None } else { Some(self.new_handle()) }
    }

    fn end_transaction(&mut self, commit: bool) {
        self.state
            .lock()
            .begin(Some(Op::EndTransaction), Call::EndTransaction(commit));
        let hook = self.hook.lock().take();
        if let Some(hook) = hook {
            hook(commit);
        }
    }

    fn set_auto_commit(&mut self, auto_commit: bool) {
        self.state
            .lock()
            .begin(Some(Op::SetAutoCommit), Call::SetAutoCommit(auto_commit));
    }

    fn turn_on_auto_commit_by_self(&mut self) {
        self.state.lock().begin(None, Call::TurnOnAutoCommitBySelf);
    }

    fn set_isolation_level(&mut self, code: IsolationCode) {
        let mut state = self.state.lock();
        if !state.begin(Some(Op::SetIsolation), Call::SetIsolation(code)) {
            state.isolation = code;
        }
    }

    fn isolation_level(&mut self) -> IsolationCode {
        let mut state = self.state.lock();
        state.begin(Some(Op::GetIsolation), Call::GetIsolation);
        state.isolation
    }

    fn set_lock_timeout(&mut self, timeout: Duration) {
        self.state
            .lock()
            .begin(Some(Op::SetLockTimeout), Call::SetLockTimeout(timeout));
    }

    fn set_cas_change_mode(&mut self, mode: CasChangeMode) -> i32 {
        let mut state = self.state.lock();
        let previous = state.cas_change_mode as i32;
        if !state.begin(Some(Op::SetCasChangeMode), Call::SetCasChangeMode(mode)) {
            state.cas_change_mode = mode;
        }
        previous
    }

    fn lob_new(&mut self, kind: LobKind) -> Option<LobHandle> {
        let mut state = self.state.lock();
        if state.begin(Some(Op::LobNew), Call::LobNew(kind)) {
            return None;
        }
        state.next_lob += 1;
        let tag = match kind {
            LobKind::Blob => b'B',
            LobKind::Clob => b'C',
        };
        let mut locator = vec![tag];
        locator.extend_from_slice(&state.next_lob.to_be_bytes());
        state.lobs.insert(locator.clone(), Vec::new());
        Some(LobHandle(locator))
    }

    fn lob_write(&mut self, handle: &LobHandle, offset: u64, buf: &[u8]) -> usize {
        let mut state = self.state.lock();
        let call = Call::LobWrite {
            offset,
            len: buf.len(),
        };
        if state.begin(Some(Op::LobWrite), call) {
            return 0;
        }
        let Ok(start) = usize::try_from(offset) else {
            return 0;
        };
        let Some(data) = state.lobs.get_mut(handle.as_bytes()) else {
            state.error = ErrorInfo::new(-1, "unknown LOB locator");
            return 0;
        };
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        buf.len()
    }

    fn lob_read(&mut self, handle: &LobHandle, offset: u64, buf: &mut [u8]) -> usize {
        let mut state = self.state.lock();
        let call = Call::LobRead {
            offset,
            len: buf.len(),
        };
        if state.begin(Some(Op::LobRead), call) {
            return 0;
        }
        let Some(data) = state.lobs.get(handle.as_bytes()) else {
            state.error = ErrorInfo::new(-1, "unknown LOB locator");
            return 0;
        };
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        n
    }

    fn shard_id(&mut self) -> i32 {
        self.state.lock().shard_id
    }

    fn is_connected_to_proxy(&mut self) -> bool {
        self.state.lock().proxy
    }

    fn recent_error(&mut self) -> ErrorInfo {
        self.state.lock().error.clone()
    }

    fn protocol_version_at_least(&self, version: u8) -> bool {
        self.state.lock().protocol_version >= version
    }

    fn supports_holdable_result(&self) -> bool {
        self.state.lock().holdable_result
    }

    fn supports_statement_pooling(&self) -> bool {
        self.state.lock().statement_pooling
    }

    fn query_timeout(&self) -> u32 {
        self.state.lock().query_timeout
    }

    fn is_valid(&mut self, _timeout: Duration) -> bool {
        let mut state = self.state.lock();
        state.begin(None, Call::IsValid);
        state.valid && !state.closed
    }

    fn cas_info(&self) -> CasInfo {
        CasInfo {
            ip: "127.0.0.1".to_string(),
            port: 33000,
            id: 1,
            process_id: 4242,
        }
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.begin(None, Call::Close);
        state.closed = true;
    }
}

/// Handle produced by [`MockSession`]; logs completion and close.
#[derive(Debug)]
pub struct MockStatementHandle {
    id: i32,
    state: Arc<Mutex<MockState>>,
}

impl StatementHandle for MockStatementHandle {
    fn server_handle(&self) -> i32 {
        self.id
    }

    fn complete(&mut self, _session: &mut dyn Session) {
        self.state
            .lock()
            .begin(Some(Op::CompleteHandle), Call::CompleteHandle(self.id));
    }

    fn close(&mut self, _session: &mut dyn Session) {
        self.state
            .lock()
            .begin(Some(Op::CloseHandle), Call::CloseHandle(self.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_next_is_one_shot() {
        let mut session = MockSession::new();
        session.fail_next(Op::SetLockTimeout, ErrorInfo::new(-5, "nope"));

        session.set_lock_timeout(Duration::from_secs(1));
        assert_eq!(session.recent_error().code, -5);

        session.set_lock_timeout(Duration::from_secs(1));
        assert!(session.recent_error().is_ok());
    }

    #[test]
    fn test_failed_prepare_returns_no_handle() {
        let mut session = MockSession::new();
        session.fail_next(Op::Prepare, ErrorInfo::new(-493, "syntax"));
        assert!(session.prepare("SELEC", PrepareFlag::PLAIN).is_none());
        assert!(session.prepare("SELECT 1", PrepareFlag::PLAIN).is_some());
    }

    #[test]
    fn test_lob_storage() {
        let mut session = MockSession::new();
        let lob = session.lob_new(LobKind::Clob).unwrap();
        assert_eq!(session.lob_write(&lob, 0, b"hello"), 5);
        assert_eq!(session.lob_write(&lob, 5, b" world"), 6);

        let mut buf = [0u8; 16];
        let n = session.lob_read(&lob, 6, &mut buf);
        assert_eq!(&buf[..n], b"world");
        assert_eq!(session.lob_read(&lob, 100, &mut buf), 0);
    }

    #[test]
    fn test_cas_change_mode_returns_previous() {
        let mut session = MockSession::new();
        assert_eq!(session.set_cas_change_mode(CasChangeMode::Keep), 1);
        assert_eq!(session.set_cas_change_mode(CasChangeMode::Auto), 2);
    }

    #[test]
    fn test_hook_runs_once() {
        let mut session = MockSession::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.on_end_transaction(move |commit| sink.lock().push(commit));

        session.end_transaction(false);
        session.end_transaction(true);

        assert_eq!(*seen.lock(), vec![false]);
        assert_eq!(session.end_transactions(), vec![false, true]);
    }
}
