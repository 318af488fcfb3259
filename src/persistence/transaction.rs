//! Transaction demarcation around a unit of work.

use crate::persistence::{Database, PersistenceError};

/// The two isolation levels the backing store supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    Serializable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionOptions {
    pub isolation: IsolationLevel,
    /// Roll back even when the work succeeds.
    pub read_only: bool,
}

impl TransactionOptions {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }
}

/// Run `work` inside a transaction: commit on `Ok`, roll back on `Err`.
/// Read-only units always roll back.
pub fn in_transaction<D, T, E, F>(db: &D, options: TransactionOptions, work: F) -> Result<T, E>
where
    D: Database + ?Sized,
    E: From<PersistenceError>,
    F: FnOnce(&D) -> Result<T, E>,
{
    db.begin(options.isolation)?;

    match work(db) {
        Ok(value) if options.read_only => {
            db.rollback()?;
            Ok(value)
        }
        Ok(value) => {
            if let Err(e) = db.commit() {
                tracing::error!(error = %e, "Commit failed, rolling back");
                if let Err(rollback) = db.rollback() {
                    tracing::error!(error = %rollback, "Rollback after failed commit also failed");
                }
                return Err(e.into());
            }
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = db.rollback() {
                tracing::error!(error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}
