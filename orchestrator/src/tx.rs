//! Bridges `volant_db::Database::with_tx`'s required `Result<T, DbError>`
//! closure signature back to the orchestrator's richer error type, so a
//! failure deep in `volant-allocator`/`volant-stager`/manifest assembly keeps
//! its original category (`ResourceExhausted`, `Validation`, ...) instead of
//! flattening into `DbError::Conflict`. Generalizes the `db_err` helper
//! already used by `volant-routes`/`volant-stager`'s tests into a
//! production-path utility, since the orchestrator's transactions span many
//! more error sources than any single downstream crate's own tests do.

use volant_db::{Database, DbError};

use crate::error::{OrchestratorError, Result};

pub(crate) fn run_tx<T>(
    db: &Database,
    f: impl FnOnce(&rusqlite::Transaction) -> Result<T>,
) -> Result<T> {
    let mut captured: Option<OrchestratorError> = None;
    let result = db.with_tx(|tx| {
        f(tx).map_err(|e| {
            let db_err = match &e {
                OrchestratorError::Db(inner) => DbError::Conflict(inner.to_string()),
                other => DbError::Conflict(other.to_string()),
            };
            captured = Some(e);
            db_err
        })
    });

    match result {
        Ok(v) => Ok(v),
        Err(_) if captured.is_some() => Err(captured.expect("checked is_some above")),
        Err(db_err) => Err(db_err.into()),
    }
}
