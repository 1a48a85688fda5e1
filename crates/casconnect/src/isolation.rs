//! Translation between portable isolation levels and broker isolation codes.
//!
//! Brokers speaking protocol version 7 or later only know read committed,
//! repeatable read and serializable. Older brokers also encode the legacy
//! class/instance granularity levels. Each code space is one static table;
//! [`IsolationTable::select`] picks the table, nothing else branches on the
//! protocol version.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::session::IsolationCode;

/// First protocol version using the reduced isolation code space.
pub const NEW_ISOLATION_PROTOCOL: u8 = 7;

/// Broker isolation codes.
pub mod code {
    use crate::session::IsolationCode;

    pub const COMMIT_CLASS_UNCOMMIT_INSTANCE: IsolationCode = IsolationCode(1);
    pub const COMMIT_CLASS_COMMIT_INSTANCE: IsolationCode = IsolationCode(2);
    pub const REP_CLASS_UNCOMMIT_INSTANCE: IsolationCode = IsolationCode(3);
    pub const READ_COMMITTED: IsolationCode = IsolationCode(4);
    pub const REPEATABLE_READ: IsolationCode = IsolationCode(5);
    pub const SERIALIZABLE: IsolationCode = IsolationCode(6);
}

/// Portable isolation level, carrying the classic JDBC ordinals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// Returned when the broker reports a code outside the active table.
    None,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    /// Legacy alias: repeatable class reads, committed instance reads.
    RepClassCommitInstance,
    /// Legacy alias: repeatable class reads, uncommitted instance reads.
    RepClassUncommitInstance,
}

impl IsolationLevel {
    pub const ALL: [Self; 7] = [
        Self::None,
        Self::ReadUncommitted,
        Self::ReadCommitted,
        Self::RepeatableRead,
        Self::Serializable,
        Self::RepClassCommitInstance,
        Self::RepClassUncommitInstance,
    ];

    #[must_use]
    pub const fn ordinal(self) -> i32 {
        match self {
            Self::None => 0,
            Self::ReadUncommitted => 1,
            Self::ReadCommitted => 2,
            Self::RepeatableRead => 4,
            Self::Serializable => 8,
            Self::RepClassCommitInstance => 16,
            Self::RepClassUncommitInstance => 32,
        }
    }

    /// Portable level a legacy alias reads back as.
    #[must_use]
    pub const fn canonical(self) -> Self {
        match self {
            Self::RepClassCommitInstance => Self::ReadCommitted,
            Self::RepClassUncommitInstance => Self::ReadUncommitted,
            other => other,
        }
    }
}

impl TryFrom<i32> for IsolationLevel {
    type Error = Error;

    fn try_from(ordinal: i32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.ordinal() == ordinal)
            .ok_or(Error::InvalidIsolationLevel(ordinal))
    }
}

impl FromStr for IsolationLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "read_uncommitted" => Ok(Self::ReadUncommitted),
            "read_committed" => Ok(Self::ReadCommitted),
            "repeatable_read" => Ok(Self::RepeatableRead),
            "serializable" => Ok(Self::Serializable),
            "rep_class_commit_instance" => Ok(Self::RepClassCommitInstance),
            "rep_class_uncommit_instance" => Ok(Self::RepClassUncommitInstance),
            other => other
                .parse::<i32>()
                .map_err(|_| Error::Config(format!("unknown isolation level '{s}'")))
                .and_then(Self::try_from),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::ReadUncommitted => "read uncommitted",
            Self::ReadCommitted => "read committed",
            Self::RepeatableRead => "repeatable read",
            Self::Serializable => "serializable",
            Self::RepClassCommitInstance => "rep class commit instance",
            Self::RepClassUncommitInstance => "rep class uncommit instance",
        };
        f.write_str(name)
    }
}

/// One isolation code space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsolationTable {
    to_wire: &'static [(IsolationLevel, IsolationCode)],
    from_wire: &'static [(IsolationCode, IsolationLevel)],
}

impl IsolationTable {
    pub const CURRENT: Self = Self {
        to_wire: &[
            (IsolationLevel::ReadCommitted, code::READ_COMMITTED),
            (IsolationLevel::RepClassCommitInstance, code::READ_COMMITTED),
            (IsolationLevel::RepeatableRead, code::REPEATABLE_READ),
            (IsolationLevel::Serializable, code::SERIALIZABLE),
        ],
        from_wire: &[
            (code::READ_COMMITTED, IsolationLevel::ReadCommitted),
            (code::REPEATABLE_READ, IsolationLevel::RepeatableRead),
            (code::SERIALIZABLE, IsolationLevel::Serializable),
        ],
    };

    pub const LEGACY: Self = Self {
        to_wire: &[
            (IsolationLevel::ReadCommitted, code::READ_COMMITTED),
            (
                IsolationLevel::ReadUncommitted,
                code::REP_CLASS_UNCOMMIT_INSTANCE,
            ),
            (IsolationLevel::RepeatableRead, code::REPEATABLE_READ),
            (IsolationLevel::Serializable, code::SERIALIZABLE),
            (IsolationLevel::RepClassCommitInstance, code::READ_COMMITTED),
            (
                IsolationLevel::RepClassUncommitInstance,
                code::REP_CLASS_UNCOMMIT_INSTANCE,
            ),
        ],
        from_wire: &[
            (
                code::COMMIT_CLASS_COMMIT_INSTANCE,
                IsolationLevel::ReadCommitted,
            ),
            (
                code::COMMIT_CLASS_UNCOMMIT_INSTANCE,
                IsolationLevel::ReadUncommitted,
            ),
            (code::REPEATABLE_READ, IsolationLevel::RepeatableRead),
            (code::READ_COMMITTED, IsolationLevel::ReadCommitted),
            (
                code::REP_CLASS_UNCOMMIT_INSTANCE,
                IsolationLevel::ReadUncommitted,
            ),
            (code::SERIALIZABLE, IsolationLevel::Serializable),
        ],
    };

    /// Table for a broker that does (or does not) speak the newer code space.
    #[must_use]
    pub const fn select(new_protocol: bool) -> Self {
        if new_protocol { Self::CURRENT } else { Self::LEGACY }
    }

    pub fn to_wire(&self, level: IsolationLevel) -> Result<IsolationCode> {
        self.to_wire
            .iter()
            .find(|(l, _)| *l == level)
            .map(|(_, code)| *code)
            .ok_or(Error::InvalidIsolationLevel(level.ordinal()))
    }

    /// Unknown codes read back as [`IsolationLevel::None`].
    #[must_use]
    pub fn from_wire(&self, code: IsolationCode) -> IsolationLevel {
        self.from_wire
            .iter()
            .find(|(c, _)| *c == code)
            .map_or(IsolationLevel::None, |(_, level)| *level)
    }

    /// Levels accepted on the write side.
    pub fn levels(&self) -> impl Iterator<Item = IsolationLevel> + '_ {
        self.to_wire.iter().map(|(level, _)| *level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_every_accepted_level() {
        for table in [IsolationTable::CURRENT, IsolationTable::LEGACY] {
            for level in table.levels() {
                let wire = table.to_wire(level).unwrap();
                assert_eq!(table.from_wire(wire), level.canonical(), "{level}");
            }
        }
    }

    #[test]
    fn test_portable_levels_round_trip_exactly() {
        let portable = [
            IsolationLevel::ReadUncommitted,
            IsolationLevel::ReadCommitted,
            IsolationLevel::RepeatableRead,
            IsolationLevel::Serializable,
        ];
        for level in portable {
            let legacy = IsolationTable::LEGACY;
            assert_eq!(legacy.from_wire(legacy.to_wire(level).unwrap()), level);
        }
    }

    #[test]
    fn test_current_rejects_read_uncommitted() {
        let err = IsolationTable::CURRENT
            .to_wire(IsolationLevel::ReadUncommitted)
            .unwrap_err();
        assert_eq!(err, Error::InvalidIsolationLevel(1));
        assert!(
            IsolationTable::CURRENT
                .to_wire(IsolationLevel::RepClassUncommitInstance)
                .is_err()
        );
    }

    #[test]
    fn test_none_is_never_written() {
        for table in [IsolationTable::CURRENT, IsolationTable::LEGACY] {
            assert!(table.to_wire(IsolationLevel::None).unwrap_err().is_invalid_isolation());
        }
    }

    #[test]
    fn test_unknown_code_reads_as_none() {
        assert_eq!(
            IsolationTable::CURRENT.from_wire(code::COMMIT_CLASS_COMMIT_INSTANCE),
            IsolationLevel::None
        );
        assert_eq!(
            IsolationTable::LEGACY.from_wire(IsolationCode(42)),
            IsolationLevel::None
        );
    }

    #[test]
    fn test_legacy_only_codes() {
        let legacy = IsolationTable::LEGACY;
        assert_eq!(
            legacy.from_wire(code::COMMIT_CLASS_COMMIT_INSTANCE),
            IsolationLevel::ReadCommitted
        );
        assert_eq!(
            legacy.from_wire(code::COMMIT_CLASS_UNCOMMIT_INSTANCE),
            IsolationLevel::ReadUncommitted
        );
    }

    #[test]
    fn test_ordinal_parsing() {
        assert_eq!(IsolationLevel::try_from(8).unwrap(), IsolationLevel::Serializable);
        assert_eq!(
            IsolationLevel::try_from(3).unwrap_err(),
            Error::InvalidIsolationLevel(3)
        );
        assert_eq!(
            "Repeatable-Read".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::RepeatableRead
        );
        assert_eq!("16".parse::<IsolationLevel>().unwrap(), IsolationLevel::RepClassCommitInstance);
        assert!("dirty".parse::<IsolationLevel>().unwrap_err().is_config());
    }

    #[test]
    fn test_select() {
        assert_eq!(IsolationTable::select(true), IsolationTable::CURRENT);
        assert_eq!(IsolationTable::select(false), IsolationTable::LEGACY);
    }
}
