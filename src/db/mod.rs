mod events;
mod schema;
mod watchlist;

pub use events::EventStore;
pub use watchlist::{AddOutcome, DeactivateOutcome, RegisterOutcome, WatchlistStore};

use std::time::Duration;

use rusqlite::Transaction;
use tokio_rusqlite::Connection;

use crate::error::StoreError;
use schema::SCHEMA;

/// Total attempts for a contended commit before giving up.
const COMMIT_RETRIES: u32 = 3;
const COMMIT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Handle to the SQLite database. Each long-running loop opens its own `Db`
/// so the loops only ever meet at the SQLite file, where lock contention is
/// absorbed by [`Db::with_retry`].
#[derive(Clone)]
pub struct Db {
    conn: Connection,
}

impl Db {
    pub async fn open(db_path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Run a read-only closure on the connection. Not retried: a transient
    /// lock during a read surfaces as an error and the calling loop skips
    /// that cycle.
    pub async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn.call(move |conn| Ok(f(conn)?)).await.map_err(StoreError::from)
    }

    /// Run a write closure inside a transaction, retrying the whole
    /// transaction a bounded number of times while the database is locked by
    /// another connection. Non-contention errors roll back and propagate
    /// immediately.
    pub async fn with_retry<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: Fn(&Transaction<'_>) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn| Ok(commit_with_retry(conn, COMMIT_RETRIES, COMMIT_RETRY_DELAY, &f)))
            .await
            .map_err(StoreError::from)?
    }
}

fn commit_with_retry<T, F>(
    conn: &mut rusqlite::Connection,
    retries: u32,
    delay: Duration,
    f: &F,
) -> Result<T, StoreError>
where
    F: Fn(&Transaction<'_>) -> rusqlite::Result<T>,
{
    for attempt in 1..=retries {
        let result = conn.transaction().and_then(|tx| {
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        });

        match result {
            Ok(value) => return Ok(value),
            Err(e) if is_busy(&e) => {
                tracing::warn!("database is locked, retrying ({}/{})", attempt, retries);
                if attempt < retries {
                    std::thread::sleep(delay);
                }
            }
            // Dropping the transaction already rolled it back
            Err(e) => return Err(StoreError::Sqlite(e)),
        }
    }

    Err(StoreError::RetriesExhausted(retries))
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}
