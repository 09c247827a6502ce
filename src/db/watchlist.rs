use rusqlite::{params, OptionalExtension, Row};

use super::Db;
use crate::error::{StoreError, WatchError};
use crate::models::WatchedAuthor;
#[cfg(test)]
use crate::models::{Subscriber, WatchedCommunity};

/// Result of adding an author or community to the watchlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Reactivated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Added,
    Reactivated,
    AlreadyActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivateOutcome {
    Deactivated,
    NotRegistered,
    AlreadyInactive,
}

/// Store for watched authors, watched communities and chat subscribers.
/// Rows are soft-deleted: removal flips `active` off so that ratings and
/// row ids survive a later re-add.
#[derive(Clone)]
pub struct WatchlistStore {
    db: Db,
}

impl WatchlistStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn add_author(&self, name: &str) -> Result<AddOutcome, WatchError> {
        let name = name.trim().to_string();
        self.db
            .with_retry(move |tx| {
                let existing = tx
                    .query_row(
                        "SELECT id, active FROM watched_authors WHERE name = ?1",
                        params![name],
                        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? != 0)),
                    )
                    .optional()?;

                let outcome = match existing {
                    None => {
                        tx.execute(
                            "INSERT INTO watched_authors (name) VALUES (?1)",
                            params![name],
                        )?;
                        Ok(AddOutcome::Added)
                    }
                    Some((_, true)) => Err(WatchError::AuthorAlreadyActive(name.clone())),
                    Some((id, false)) => {
                        tx.execute(
                            "UPDATE watched_authors SET active = 1 WHERE id = ?1",
                            params![id],
                        )?;
                        Ok(AddOutcome::Reactivated)
                    }
                };
                Ok(outcome)
            })
            .await?
    }

    pub async fn remove_author(&self, name: &str) -> Result<(), WatchError> {
        let name = name.trim().to_string();
        self.db
            .with_retry(move |tx| {
                let existing = tx
                    .query_row(
                        "SELECT id, active FROM watched_authors WHERE name = ?1",
                        params![name],
                        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? != 0)),
                    )
                    .optional()?;

                let outcome = match existing {
                    None => Err(WatchError::AuthorNotFound(name.clone())),
                    Some((_, false)) => Err(WatchError::AuthorAlreadyInactive(name.clone())),
                    Some((id, true)) => {
                        tx.execute(
                            "UPDATE watched_authors SET active = 0 WHERE id = ?1",
                            params![id],
                        )?;
                        Ok(())
                    }
                };
                Ok(outcome)
            })
            .await?
    }

    /// Mute an author until `now + duration_secs`. Fails if the author is
    /// unknown or the current mute has not expired yet.
    pub async fn mute_author(
        &self,
        name: &str,
        duration_secs: i64,
        now: i64,
    ) -> Result<(), WatchError> {
        let name = name.trim().to_string();
        self.db
            .with_retry(move |tx| {
                let existing = tx
                    .query_row(
                        "SELECT id, muted_until FROM watched_authors WHERE name = ?1",
                        params![name],
                        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                    )
                    .optional()?;

                let outcome = match existing {
                    None => Err(WatchError::AuthorNotFound(name.clone())),
                    Some((_, muted_until)) if muted_until > now => {
                        Err(WatchError::AuthorAlreadyMuted(name.clone()))
                    }
                    Some((id, _)) => {
                        tx.execute(
                            "UPDATE watched_authors SET muted_until = ?1 WHERE id = ?2",
                            params![now.saturating_add(duration_secs), id],
                        )?;
                        Ok(())
                    }
                };
                Ok(outcome)
            })
            .await?
    }

    /// Expire any mute immediately. Unmuting an author who is not muted is
    /// a no-op, not an error.
    pub async fn unmute_author(&self, name: &str, now: i64) -> Result<(), WatchError> {
        let name = name.trim().to_string();
        self.db
            .with_retry(move |tx| {
                let updated = tx.execute(
                    "UPDATE watched_authors SET muted_until = ?1 WHERE name = ?2",
                    params![now - 1, name],
                )?;

                let outcome = if updated == 0 {
                    Err(WatchError::AuthorNotFound(name.clone()))
                } else {
                    Ok(())
                };
                Ok(outcome)
            })
            .await?
    }

    /// Adjust an author's rating by `delta` and return the new value.
    /// Ratings have no floor or ceiling.
    pub async fn rate_author(&self, name: &str, delta: i64) -> Result<i64, WatchError> {
        let name = name.trim().to_string();
        self.db
            .with_retry(move |tx| {
                let existing = tx
                    .query_row(
                        "SELECT id, rating FROM watched_authors WHERE name = ?1",
                        params![name],
                        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                    )
                    .optional()?;

                let outcome = match existing {
                    None => Err(WatchError::AuthorNotFound(name.clone())),
                    Some((id, rating)) => {
                        let rating = rating + delta;
                        tx.execute(
                            "UPDATE watched_authors SET rating = ?1 WHERE id = ?2",
                            params![rating, id],
                        )?;
                        Ok(rating)
                    }
                };
                Ok(outcome)
            })
            .await?
    }

    /// Current rating, regardless of the active flag.
    pub async fn author_rating(&self, name: &str) -> Result<i64, WatchError> {
        let name = name.trim().to_string();
        let key = name.clone();
        let rating = self
            .db
            .read(move |conn| {
                conn.query_row(
                    "SELECT rating FROM watched_authors WHERE name = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;
        rating.ok_or(WatchError::AuthorNotFound(name))
    }

    /// Whether an author is muted at `now`. An author with no row counts as
    /// muted so that a row deleted mid-flight cannot produce notifications.
    pub async fn is_author_muted(&self, name: &str, now: i64) -> Result<bool, StoreError> {
        let name = name.trim().to_string();
        let muted_until = self
            .db
            .read(move |conn| {
                conn.query_row(
                    "SELECT muted_until FROM watched_authors WHERE name = ?1",
                    params![name],
                    |row| row.get::<_, i64>(0),
                )
                .optional()
            })
            .await?;
        Ok(match muted_until {
            Some(ts) => ts > now,
            None => true,
        })
    }

    pub async fn author(&self, name: &str) -> Result<Option<WatchedAuthor>, StoreError> {
        let name = name.trim().to_string();
        self.db
            .read(move |conn| {
                conn.query_row(
                    "SELECT id, name, active, muted_until, rating FROM watched_authors WHERE name = ?1",
                    params![name],
                    |row| Ok(author_from_row(row)),
                )
                .optional()
            })
            .await
    }

    pub async fn active_authors(&self) -> Result<Vec<WatchedAuthor>, StoreError> {
        self.db
            .read(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, active, muted_until, rating FROM watched_authors WHERE active = 1 ORDER BY name",
                )?;
                let authors = stmt
                    .query_map([], |row| Ok(author_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(authors)
            })
            .await
    }

    pub async fn active_author_names(&self) -> Result<Vec<String>, StoreError> {
        self.db
            .read(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM watched_authors WHERE active = 1 ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
    }

    pub async fn add_community(&self, name: &str) -> Result<AddOutcome, WatchError> {
        let name = name.trim().to_string();
        self.db
            .with_retry(move |tx| {
                let existing = tx
                    .query_row(
                        "SELECT id, active FROM watched_communities WHERE name = ?1",
                        params![name],
                        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? != 0)),
                    )
                    .optional()?;

                let outcome = match existing {
                    None => {
                        tx.execute(
                            "INSERT INTO watched_communities (name) VALUES (?1)",
                            params![name],
                        )?;
                        Ok(AddOutcome::Added)
                    }
                    Some((_, true)) => Err(WatchError::CommunityAlreadyActive(name.clone())),
                    Some((id, false)) => {
                        tx.execute(
                            "UPDATE watched_communities SET active = 1 WHERE id = ?1",
                            params![id],
                        )?;
                        Ok(AddOutcome::Reactivated)
                    }
                };
                Ok(outcome)
            })
            .await?
    }

    pub async fn remove_community(&self, name: &str) -> Result<(), WatchError> {
        let name = name.trim().to_string();
        self.db
            .with_retry(move |tx| {
                let existing = tx
                    .query_row(
                        "SELECT id, active FROM watched_communities WHERE name = ?1",
                        params![name],
                        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? != 0)),
                    )
                    .optional()?;

                let outcome = match existing {
                    None => Err(WatchError::CommunityNotFound(name.clone())),
                    Some((_, false)) => Err(WatchError::CommunityAlreadyInactive(name.clone())),
                    Some((id, true)) => {
                        tx.execute(
                            "UPDATE watched_communities SET active = 0 WHERE id = ?1",
                            params![id],
                        )?;
                        Ok(())
                    }
                };
                Ok(outcome)
            })
            .await?
    }

    /// Active community names in byte order. The watcher joins these into
    /// its stream scope, so the ordering here keeps the scope key stable.
    pub async fn active_community_names(&self) -> Result<Vec<String>, StoreError> {
        self.db
            .read(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM watched_communities WHERE active = 1 ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
    }

    pub async fn register_subscriber(
        &self,
        chat_id: &str,
        username: Option<&str>,
    ) -> Result<RegisterOutcome, StoreError> {
        let chat_id = chat_id.to_string();
        let username = username.map(str::to_string);
        self.db
            .with_retry(move |tx| {
                let existing = tx
                    .query_row(
                        "SELECT id, active FROM subscribers WHERE chat_id = ?1",
                        params![chat_id],
                        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? != 0)),
                    )
                    .optional()?;

                match existing {
                    None => {
                        tx.execute(
                            "INSERT INTO subscribers (chat_id, username) VALUES (?1, ?2)",
                            params![chat_id, username],
                        )?;
                        Ok(RegisterOutcome::Added)
                    }
                    Some((id, active)) => {
                        tx.execute(
                            "UPDATE subscribers SET active = 1, username = ?1 WHERE id = ?2",
                            params![username, id],
                        )?;
                        if active {
                            Ok(RegisterOutcome::AlreadyActive)
                        } else {
                            Ok(RegisterOutcome::Reactivated)
                        }
                    }
                }
            })
            .await
    }

    pub async fn deactivate_subscriber(
        &self,
        chat_id: &str,
    ) -> Result<DeactivateOutcome, StoreError> {
        let chat_id = chat_id.to_string();
        self.db
            .with_retry(move |tx| {
                let existing = tx
                    .query_row(
                        "SELECT id, active FROM subscribers WHERE chat_id = ?1",
                        params![chat_id],
                        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? != 0)),
                    )
                    .optional()?;

                match existing {
                    None => Ok(DeactivateOutcome::NotRegistered),
                    Some((_, false)) => Ok(DeactivateOutcome::AlreadyInactive),
                    Some((id, true)) => {
                        tx.execute("UPDATE subscribers SET active = 0 WHERE id = ?1", params![id])?;
                        Ok(DeactivateOutcome::Deactivated)
                    }
                }
            })
            .await
    }

    pub async fn active_subscriber_ids(&self) -> Result<Vec<String>, StoreError> {
        self.db
            .read(|conn| {
                let mut stmt =
                    conn.prepare("SELECT chat_id FROM subscribers WHERE active = 1 ORDER BY id")?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(ids)
            })
            .await
    }

    #[cfg(test)]
    pub async fn community(&self, name: &str) -> Result<Option<WatchedCommunity>, StoreError> {
        let name = name.trim().to_string();
        self.db
            .read(move |conn| {
                conn.query_row(
                    "SELECT id, name, active FROM watched_communities WHERE name = ?1",
                    params![name],
                    |row| Ok(community_from_row(row)),
                )
                .optional()
            })
            .await
    }

    #[cfg(test)]
    pub async fn subscriber(&self, chat_id: &str) -> Result<Option<Subscriber>, StoreError> {
        let chat_id = chat_id.to_string();
        self.db
            .read(move |conn| {
                conn.query_row(
                    "SELECT id, chat_id, username, active FROM subscribers WHERE chat_id = ?1",
                    params![chat_id],
                    |row| Ok(subscriber_from_row(row)),
                )
                .optional()
            })
            .await
    }
}

fn author_from_row(row: &Row) -> WatchedAuthor {
    WatchedAuthor {
        id: row.get(0).unwrap(),
        name: row.get(1).unwrap(),
        active: row.get::<_, i64>(2).unwrap() != 0,
        muted_until: row.get(3).unwrap(),
        rating: row.get(4).unwrap(),
    }
}

#[cfg(test)]
fn community_from_row(row: &Row) -> WatchedCommunity {
    WatchedCommunity {
        id: row.get(0).unwrap(),
        name: row.get(1).unwrap(),
        active: row.get::<_, i64>(2).unwrap() != 0,
    }
}

#[cfg(test)]
fn subscriber_from_row(row: &Row) -> Subscriber {
    Subscriber {
        id: row.get(0).unwrap(),
        chat_id: row.get(1).unwrap(),
        username: row.get(2).unwrap(),
        active: row.get::<_, i64>(3).unwrap() != 0,
    }
}
