use rusqlite::{params, OptionalExtension, Row};

use super::Db;
use crate::error::StoreError;
use crate::models::{Event, EventKind, NewEvent};

/// Store for observed events awaiting delivery.
#[derive(Clone)]
pub struct EventStore {
    db: Db,
}

impl EventStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Insert an observed event, or refresh its snapshot fields if the
    /// upstream id is already known. The delivered flag is never written
    /// here, so re-observing an already delivered event cannot queue it
    /// again.
    pub async fn upsert_event(&self, event: NewEvent) -> Result<(), StoreError> {
        self.db
            .with_retry(move |tx| {
                tx.execute(
                    r#"INSERT INTO events (id, kind, author, content, url, created_utc)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                       ON CONFLICT(id) DO UPDATE SET
                           kind = excluded.kind,
                           author = excluded.author,
                           content = excluded.content,
                           url = excluded.url,
                           created_utc = excluded.created_utc"#,
                    params![
                        event.id,
                        event.kind.as_str(),
                        event.author,
                        event.content,
                        event.url,
                        event.created_utc
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Undelivered events, oldest first.
    pub async fn pending_events(&self) -> Result<Vec<Event>, StoreError> {
        self.db
            .read(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, kind, author, content, url, created_utc, delivered FROM events
                     WHERE delivered = 0 ORDER BY created_utc, id",
                )?;
                let events = stmt
                    .query_map([], |row| Ok(event_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(events)
            })
            .await
    }

    /// Flip the delivered flag for a batch of event ids in one transaction.
    pub async fn mark_delivered(&self, ids: &[String]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids = ids.to_vec();
        self.db
            .with_retry(move |tx| {
                for id in &ids {
                    tx.execute("UPDATE events SET delivered = 1 WHERE id = ?1", params![id])?;
                }
                Ok(())
            })
            .await
    }

    pub async fn event(&self, id: &str) -> Result<Option<Event>, StoreError> {
        let id = id.to_string();
        self.db
            .read(move |conn| {
                conn.query_row(
                    "SELECT id, kind, author, content, url, created_utc, delivered FROM events WHERE id = ?1",
                    params![id],
                    |row| Ok(event_from_row(row)),
                )
                .optional()
            })
            .await
    }
}

fn event_from_row(row: &Row) -> Event {
    Event {
        id: row.get(0).unwrap(),
        kind: EventKind::from_str(&row.get::<_, String>(1).unwrap()).unwrap(),
        author: row.get(2).unwrap(),
        content: row.get(3).unwrap(),
        url: row.get(4).unwrap(),
        created_utc: row.get(5).unwrap(),
        delivered: row.get::<_, i64>(6).unwrap() != 0,
    }
}
