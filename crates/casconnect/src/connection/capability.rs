//! Optional driver features and whether this driver provides them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Blob,
    Clob,
    /// Accepted and ignored.
    ReadOnlyHint,
    /// Accepted and ignored; the catalog is always empty.
    Catalog,
    HoldableUpdatableCursor,
    Savepoints,
    ClientInfo,
    NetworkTimeout,
    Schema,
    Abort,
    TypeMap,
    NativeSql,
    NClob,
    SqlXml,
    Arrays,
    Structs,
    Unwrap,
}

impl Capability {
    pub const ALL: [Self; 17] = [
        Self::Blob,
        Self::Clob,
        Self::ReadOnlyHint,
        Self::Catalog,
        Self::HoldableUpdatableCursor,
        Self::Savepoints,
        Self::ClientInfo,
        Self::NetworkTimeout,
        Self::Schema,
        Self::Abort,
        Self::TypeMap,
        Self::NativeSql,
        Self::NClob,
        Self::SqlXml,
        Self::Arrays,
        Self::Structs,
        Self::Unwrap,
    ];

    #[must_use]
    pub const fn is_supported(self) -> bool {
        match self {
            Self::Blob | Self::Clob | Self::ReadOnlyHint | Self::Catalog => true,
            Self::HoldableUpdatableCursor
            | Self::Savepoints
            | Self::ClientInfo
            | Self::NetworkTimeout
            | Self::Schema
            | Self::Abort
            | Self::TypeMap
            | Self::NativeSql
            | Self::NClob
            | Self::SqlXml
            | Self::Arrays
            | Self::Structs
            | Self::Unwrap => false,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Clob => "clob",
            Self::ReadOnlyHint => "read-only hint",
            Self::Catalog => "catalog",
            Self::HoldableUpdatableCursor => "holdable sensitive or updatable cursor",
            Self::Savepoints => "savepoints",
            Self::ClientInfo => "client info",
            Self::NetworkTimeout => "network timeout",
            Self::Schema => "schema",
            Self::Abort => "abort",
            Self::TypeMap => "type map",
            Self::NativeSql => "native SQL",
            Self::NClob => "nclob",
            Self::SqlXml => "SQLXML",
            Self::Arrays => "arrays",
            Self::Structs => "structs",
            Self::Unwrap => "unwrap",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
