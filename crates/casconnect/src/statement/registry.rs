//! Ordered set of live statements and the transaction-end completion pass.

use std::sync::Arc;

use super::{Holdability, Statement, StatementId};
use crate::session::{ErrorInfo, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransactionEnd {
    Commit,
    Rollback,
}

/// What one completion pass did to the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Completion {
    pub retained: Vec<StatementId>,
    pub completed: Vec<StatementId>,
    pub disposed: Vec<StatementId>,
    pub pooled: Vec<StatementId>,
    /// First error a handle reported; the pass still visits every statement.
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Default)]
pub(crate) struct StatementRegistry {
    statements: Vec<Arc<Statement>>,
}

impl StatementRegistry {
    pub fn add(&mut self, statement: Arc<Statement>) {
        self.statements.push(statement);
    }

    pub fn remove(&mut self, id: StatementId) -> Option<Arc<Statement>> {
        let index = self.statements.iter().position(|s| s.id() == id)?;
        Some(self.statements.remove(index))
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn contains(&self, id: StatementId) -> bool {
        self.statements.iter().any(|s| s.id() == id)
    }

    pub fn snapshot(&self) -> Vec<Arc<Statement>> {
        self.statements.clone()
    }

    pub fn take_all(&mut self) -> Vec<Arc<Statement>> {
        std::mem::take(&mut self.statements)
    }

    /// Drive every statement through the end of the current transaction.
    ///
    /// Holdable statements survive a commit flagged as non-current. On
    /// rollback, holdable statements that are not current are left alone.
    /// Prepared statements otherwise leave the registry: closed outright, or
    /// only completed when the broker pools statements. Everything else is
    /// completed in place.
    ///
    /// The scan never mutates the registry; removals are applied after it.
    /// A handle error does not stop the pass; the first one is reported in
    /// [`Completion::error`].
    pub fn complete(&mut self, end: TransactionEnd, session: &mut dyn Session) -> Completion {
        let pooling = session.supports_statement_pooling();
        let mut outcome = Completion::default();

        for statement in &self.statements {
            let id = statement.id();
            if statement.holdability() == Holdability::HoldOverCommit {
                match end {
                    TransactionEnd::Commit => {
                        statement.set_current_transaction(false);
                        outcome.retained.push(id);
                        continue;
                    }
                    TransactionEnd::Rollback if !statement.is_current_transaction() => {
                        outcome.retained.push(id);
                        continue;
                    }
                    TransactionEnd::Rollback => {}
                }
            }

            let failure = if statement.is_prepared() {
                if pooling {
                    outcome.pooled.push(id);
                    statement.complete(session)
                } else {
                    outcome.disposed.push(id);
                    statement.dispose(session)
                }
            } else {
                outcome.completed.push(id);
                statement.complete(session)
            };
            if let Some(info) = failure {
                tracing::debug!(statement = %id, code = info.code, "Statement completion failed");
                outcome.error.get_or_insert(info);
            }
        }

        self.statements
            .retain(|s| !outcome.pooled.contains(&s.id()) && !outcome.disposed.contains(&s.id()));
        outcome
    }
}
