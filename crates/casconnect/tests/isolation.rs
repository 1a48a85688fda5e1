//! Isolation level translation against old and new brokers.

use casconnect::testing::{Call, MockSession};
use casconnect::{Connection, Error, IsolationCode, IsolationLevel};

fn connect(session: &MockSession) -> Connection {
    Connection::new(
        Box::new(session.clone()),
        "cubrid://localhost:33000/demodb",
        "dba",
    )
}

#[test]
fn new_protocol_round_trips_portable_levels() {
    let session = MockSession::new().with_protocol_version(7);
    let conn = connect(&session);

    for level in [
        IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead,
        IsolationLevel::Serializable,
    ] {
        conn.set_transaction_isolation(level).unwrap();
        assert_eq!(conn.get_transaction_isolation().unwrap(), level);
    }
}

#[test]
fn new_protocol_rejects_read_uncommitted() {
    let session = MockSession::new().with_protocol_version(8);
    let conn = connect(&session);

    let err = conn
        .set_transaction_isolation(IsolationLevel::ReadUncommitted)
        .unwrap_err();

    assert_eq!(err, Error::InvalidIsolationLevel(1));
    assert_eq!(session.count(|c| matches!(c, Call::SetIsolation(_))), 0);
}

#[test]
fn legacy_protocol_round_trips_every_level() {
    let session = MockSession::new().with_protocol_version(6);
    let conn = connect(&session);

    for level in [
        IsolationLevel::ReadUncommitted,
        IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead,
        IsolationLevel::Serializable,
        IsolationLevel::RepClassCommitInstance,
        IsolationLevel::RepClassUncommitInstance,
    ] {
        conn.set_transaction_isolation(level).unwrap();
        assert_eq!(
            conn.get_transaction_isolation().unwrap(),
            level.canonical(),
            "{level}"
        );
    }
}

#[test]
fn none_is_never_written() {
    for version in [6, 8] {
        let session = MockSession::new().with_protocol_version(version);
        let conn = connect(&session);
        assert_eq!(
            conn.set_transaction_isolation(IsolationLevel::None),
            Err(Error::InvalidIsolationLevel(0))
        );
    }
}

#[test]
fn unknown_code_reads_as_none() {
    let session = MockSession::new();
    let conn = connect(&session);
    conn.with_session(|s| s.set_isolation_level(IsolationCode(42)))
        .unwrap();
    assert_eq!(
        conn.get_transaction_isolation().unwrap(),
        IsolationLevel::None
    );
}

#[test]
fn isolation_change_commits_first() {
    let session = MockSession::new();
    let conn = connect(&session);

    conn.set_transaction_isolation(IsolationLevel::RepeatableRead)
        .unwrap();

    let calls = session.calls();
    assert_eq!(
        calls,
        vec![
            Call::EndTransaction(true),
            Call::SetIsolation(IsolationCode(5)),
        ]
    );
}
