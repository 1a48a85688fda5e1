//! Cursor options requested when a statement is created.

use std::str::FromStr;

use crate::connection::Capability;
use crate::error::{Error, Result};
use crate::session::PrepareFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResultSetType {
    #[default]
    ForwardOnly,
    ScrollInsensitive,
    ScrollSensitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Concurrency {
    #[default]
    ReadOnly,
    Updatable,
}

/// Whether open results survive a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Holdability {
    #[default]
    HoldOverCommit,
    CloseAtCommit,
}

impl FromStr for Holdability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "hold" | "hold_over_commit" => Ok(Self::HoldOverCommit),
            "close" | "close_at_commit" => Ok(Self::CloseAtCommit),
            other => Err(Error::Config(format!("unknown holdability '{other}'"))),
        }
    }
}

/// Options for `create_statement` / `prepare_statement`.
///
/// `holdability: None` inherits the connection default and skips the
/// holdable/updatable compatibility check, matching the two-argument
/// factory forms. An explicit `Some(HoldOverCommit)` is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatementOptions {
    pub result_set_type: ResultSetType,
    pub concurrency: Concurrency,
    pub holdability: Option<Holdability>,
    pub generated_keys: bool,
}

impl StatementOptions {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            result_set_type: ResultSetType::ForwardOnly,
            concurrency: Concurrency::ReadOnly,
            holdability: None,
            generated_keys: false,
        }
    }

    #[must_use]
    pub const fn result_set_type(mut self, result_set_type: ResultSetType) -> Self {
        self.result_set_type = result_set_type;
        self
    }

    #[must_use]
    pub const fn concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub const fn holdability(mut self, holdability: Holdability) -> Self {
        self.holdability = Some(holdability);
        self
    }

    #[must_use]
    pub const fn generated_keys(mut self, enabled: bool) -> Self {
        self.generated_keys = enabled;
        self
    }

    /// Sensitive scrolling or updatable concurrency.
    #[must_use]
    pub const fn wants_updatable(&self) -> bool {
        matches!(self.result_set_type, ResultSetType::ScrollSensitive)
            || matches!(self.concurrency, Concurrency::Updatable)
    }

    /// Reject explicitly holdable cursors that are also sensitive or updatable.
    pub fn validate(&self) -> Result<()> {
        if matches!(self.holdability, Some(Holdability::HoldOverCommit)) && self.wants_updatable() {
            return Err(Error::UnsupportedCapability(
                Capability::HoldableUpdatableCursor,
            ));
        }
        Ok(())
    }

    /// Prepare flag for these options. Holdable wins over updatable, but only
    /// when the broker supports holdable results.
    #[must_use]
    pub const fn prepare_flag(&self, holdability: Holdability, holdable_supported: bool) -> PrepareFlag {
        if matches!(holdability, Holdability::HoldOverCommit) && holdable_supported {
            PrepareFlag::HOLDABLE
        } else if self.wants_updatable() {
            PrepareFlag::UPDATABLE
        } else {
            PrepareFlag::PLAIN
        }
    }
}
