mod workers;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};

use crate::db::{EventStore, WatchlistStore};
use crate::error::StoreError;
use crate::models::{EventKind, NewEvent};
use crate::reddit::{permalink_url, Comment, Submission, Upstream};
use workers::StreamWorkers;

/// Scope streamed when no communities are on the watchlist. Keeps the
/// workers running so a first `/addsub` takes effect on the next refresh.
const FALLBACK_SCOPE: &str = "test";

/// Depth of the queue between the stream workers and the filter.
const QUEUE_DEPTH: usize = 64;

/// An item produced by one of the stream workers.
#[derive(Debug, Clone)]
pub enum StreamItem {
    Comment(Comment),
    Submission(Submission),
}

impl StreamItem {
    fn author(&self) -> &str {
        match self {
            StreamItem::Comment(c) => &c.author,
            StreamItem::Submission(s) => &s.author,
        }
    }
}

/// Polling cadences for the watch loop.
#[derive(Debug, Clone, Copy)]
pub struct Intervals {
    /// How often the watchlist is re-read for author and scope changes.
    pub refresh: Duration,
    /// Pause between polls when a stream has nothing new.
    pub stream_pause: Duration,
    /// Back-off after an upstream error in a stream worker.
    pub upstream_cooldown: Duration,
    /// Back-off after a failed commit before pulling the next item.
    pub error_cooldown: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            refresh: Duration::from_secs(10),
            stream_pause: Duration::from_secs(1),
            upstream_cooldown: Duration::from_secs(30),
            error_cooldown: Duration::from_secs(10),
        }
    }
}

/// The watch loop: keeps a pair of stream workers pointed at the watched
/// communities, filters their output against the watched authors and
/// commits matches as events.
pub struct Watcher {
    watchlist: WatchlistStore,
    events: EventStore,
    upstream: Arc<dyn Upstream>,
    intervals: Intervals,
    scope: Option<String>,
    authors: HashSet<String>,
    workers: Option<StreamWorkers>,
    tx: mpsc::Sender<StreamItem>,
    rx: mpsc::Receiver<StreamItem>,
}

impl Watcher {
    pub fn new(
        watchlist: WatchlistStore,
        events: EventStore,
        upstream: Arc<dyn Upstream>,
        intervals: Intervals,
    ) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        Self {
            watchlist,
            events,
            upstream,
            intervals,
            scope: None,
            authors: HashSet::new(),
            workers: None,
            tx,
            rx,
        }
    }

    /// Drive the loop until `shutdown` flips. Watchlist refreshes and
    /// queued stream items are multiplexed on one task; the stream workers
    /// only ever touch the queue.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut refresh = tokio::time::interval(self.intervals.refresh);

        loop {
            tokio::select! {
                _ = refresh.tick() => {
                    if let Err(e) = self.reconcile().await {
                        tracing::warn!("watchlist refresh failed: {}", e);
                    }
                }
                item = self.rx.recv() => {
                    // The watcher keeps a sender, so recv cannot yield None
                    let Some(item) = item else { break };
                    if let Err(e) = self.ingest(item).await {
                        tracing::error!("failed to record event: {}", e);
                        tokio::time::sleep(self.intervals.error_cooldown).await;
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("watcher stopping");
                    break;
                }
            }
        }
    }

    /// Re-read the watchlist and apply it. The author snapshot is swapped
    /// and, if the active communities changed, the workers are restarted on
    /// the new scope. Nothing is applied unless both reads succeed, so a
    /// flaky read cannot half-update the state.
    async fn reconcile(&mut self) -> Result<(), StoreError> {
        let communities = self.watchlist.active_community_names().await?;
        let authors = self.watchlist.active_author_names().await?;

        self.authors = authors.into_iter().collect();

        let scope = if communities.is_empty() {
            FALLBACK_SCOPE.to_string()
        } else {
            communities.join("+")
        };

        if self.scope.as_deref() != Some(scope.as_str()) {
            tracing::info!("watching /r/{}", scope);
            self.workers = Some(StreamWorkers::spawn(
                self.upstream.clone(),
                &scope,
                self.tx.clone(),
                self.intervals.stream_pause,
                self.intervals.upstream_cooldown,
            ));
            self.scope = Some(scope);
        }

        Ok(())
    }

    async fn ingest(&self, item: StreamItem) -> Result<bool, StoreError> {
        self.ingest_at(item, Utc::now().timestamp()).await
    }

    /// Filter a stream item and commit it if it qualifies. Returns whether
    /// an event row was written.
    async fn ingest_at(&self, item: StreamItem, now: i64) -> Result<bool, StoreError> {
        if !self.authors.contains(item.author()) {
            return Ok(false);
        }

        if let StreamItem::Comment(comment) = &item {
            if self.is_self_reply(comment).await {
                tracing::debug!("skipping self-reply {} by {}", comment.id, comment.author);
                return Ok(false);
            }
        }

        // Mutes are checked against the store at commit time rather than
        // the reconciled snapshot, so a fresh mute applies immediately.
        if self.watchlist.is_author_muted(item.author(), now).await? {
            tracing::debug!("skipping item by muted author {}", item.author());
            return Ok(false);
        }

        let event = match item {
            StreamItem::Comment(comment) => event_from_comment(&comment),
            StreamItem::Submission(submission) => event_from_submission(&submission),
        };
        tracing::info!("recording {} {} by {}", event.kind, event.id, event.author);
        self.events.upsert_event(event).await?;
        Ok(true)
    }

    /// Whether a comment replies to its own author's content. Lookup
    /// failures count as not a self-reply: a broken parent lookup must not
    /// suppress notifications.
    async fn is_self_reply(&self, comment: &Comment) -> bool {
        match self.upstream.parent_author(&comment.parent_id).await {
            Ok(parent_author) => parent_author == comment.author,
            Err(e) => {
                tracing::debug!("parent lookup failed for {}: {}", comment.parent_id, e);
                false
            }
        }
    }
}

fn event_from_comment(comment: &Comment) -> NewEvent {
    NewEvent {
        id: comment.id.clone(),
        kind: EventKind::Comment,
        author: comment.author.clone(),
        content: comment.body.clone(),
        url: permalink_url(&comment.permalink),
        created_utc: comment.created_utc,
    }
}

fn event_from_submission(submission: &Submission) -> NewEvent {
    NewEvent {
        id: submission.id.clone(),
        kind: EventKind::Submission,
        author: submission.author.clone(),
        content: submission.title.clone(),
        url: permalink_url(&submission.permalink),
        created_utc: submission.created_utc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::db::Db;
    use crate::error::UpstreamError;

    /// Upstream stub with empty listings and a fixed answer for parent
    /// lookups.
    struct StaticUpstream {
        parent_author: Option<String>,
        parent_fails: bool,
    }

    impl StaticUpstream {
        fn with_parent(author: &str) -> Self {
            Self {
                parent_author: Some(author.to_string()),
                parent_fails: false,
            }
        }

        fn failing_parent() -> Self {
            Self {
                parent_author: None,
                parent_fails: true,
            }
        }
    }

    #[async_trait]
    impl Upstream for StaticUpstream {
        async fn latest_comments(&self, _scope: &str) -> Result<Vec<Comment>, UpstreamError> {
            Ok(Vec::new())
        }

        async fn latest_submissions(&self, _scope: &str) -> Result<Vec<Submission>, UpstreamError> {
            Ok(Vec::new())
        }

        async fn parent_author(&self, parent_id: &str) -> Result<String, UpstreamError> {
            if self.parent_fails {
                return Err(UpstreamError::Status(500));
            }
            self.parent_author
                .clone()
                .ok_or_else(|| UpstreamError::NotFound(parent_id.to_string()))
        }

        async fn author_exists(&self, _name: &str) -> Result<bool, UpstreamError> {
            Ok(true)
        }

        async fn community_exists(&self, _name: &str) -> Result<bool, UpstreamError> {
            Ok(true)
        }
    }

    async fn watcher_with(upstream: StaticUpstream) -> (Watcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watch.db");
        let db = Db::open(path.to_str().unwrap()).await.unwrap();
        let watchlist = WatchlistStore::new(db.clone());
        let events = EventStore::new(db);
        let watcher = Watcher::new(watchlist, events, Arc::new(upstream), Intervals::default());
        (watcher, dir)
    }

    fn comment_by(author: &str, id: &str) -> StreamItem {
        StreamItem::Comment(Comment {
            id: id.to_string(),
            author: author.to_string(),
            body: "a comment".to_string(),
            permalink: format!("/r/test/comments/root/topic/{id}/"),
            created_utc: 1_000,
            parent_id: "t3_root".to_string(),
        })
    }

    fn submission_by(author: &str, id: &str) -> StreamItem {
        StreamItem::Submission(Submission {
            id: id.to_string(),
            author: author.to_string(),
            title: "a submission".to_string(),
            permalink: format!("/r/test/comments/{id}/a_submission/"),
            created_utc: 1_000,
        })
    }

    #[tokio::test]
    async fn ignores_authors_not_on_the_watchlist() {
        let (mut watcher, _dir) = watcher_with(StaticUpstream::with_parent("someone")).await;
        watcher.reconcile().await.unwrap();

        let written = watcher.ingest_at(comment_by("alice", "t1_a"), 2_000).await.unwrap();
        assert!(!written);
        assert!(watcher.events.pending_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn records_watched_activity() {
        let (mut watcher, _dir) = watcher_with(StaticUpstream::with_parent("someone")).await;
        watcher.watchlist.add_author("alice").await.unwrap();
        watcher.reconcile().await.unwrap();

        assert!(watcher.ingest_at(comment_by("alice", "t1_a"), 2_000).await.unwrap());
        assert!(watcher.ingest_at(submission_by("alice", "t3_b"), 2_000).await.unwrap());

        let event = watcher.events.event("t1_a").await.unwrap().unwrap();
        assert_eq!(event.author, "alice");
        assert_eq!(event.url, "https://reddit.com/r/test/comments/root/topic/t1_a/");
        assert_eq!(watcher.events.pending_events().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn skips_self_replies_but_not_submissions() {
        let (mut watcher, _dir) = watcher_with(StaticUpstream::with_parent("alice")).await;
        watcher.watchlist.add_author("alice").await.unwrap();
        watcher.reconcile().await.unwrap();

        // Comment under alice's own thread is suppressed
        assert!(!watcher.ingest_at(comment_by("alice", "t1_a"), 2_000).await.unwrap());
        // The self-reply rule only applies to comments
        assert!(watcher.ingest_at(submission_by("alice", "t3_b"), 2_000).await.unwrap());
    }

    #[tokio::test]
    async fn parent_lookup_failure_does_not_suppress() {
        let (mut watcher, _dir) = watcher_with(StaticUpstream::failing_parent()).await;
        watcher.watchlist.add_author("alice").await.unwrap();
        watcher.reconcile().await.unwrap();

        assert!(watcher.ingest_at(comment_by("alice", "t1_a"), 2_000).await.unwrap());
    }

    #[tokio::test]
    async fn fresh_mutes_apply_without_a_refresh() {
        let (mut watcher, _dir) = watcher_with(StaticUpstream::with_parent("someone")).await;
        watcher.watchlist.add_author("alice").await.unwrap();
        watcher.reconcile().await.unwrap();

        // Muted between reconcile and the next item: still suppressed
        watcher.watchlist.mute_author("alice", 60, 2_000).await.unwrap();
        assert!(!watcher.ingest_at(comment_by("alice", "t1_a"), 2_010).await.unwrap());
        assert!(watcher.events.event("t1_a").await.unwrap().is_none());

        // The same item offered after expiry goes through
        assert!(watcher.ingest_at(comment_by("alice", "t1_a"), 2_060).await.unwrap());
        assert!(watcher.events.event("t1_a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn scope_joins_sorted_communities() {
        let (mut watcher, _dir) = watcher_with(StaticUpstream::with_parent("someone")).await;
        watcher.reconcile().await.unwrap();
        assert_eq!(watcher.scope.as_deref(), Some("test"));

        watcher.watchlist.add_community("zebra").await.unwrap();
        watcher.watchlist.add_community("alpha").await.unwrap();
        watcher.reconcile().await.unwrap();
        assert_eq!(watcher.scope.as_deref(), Some("alpha+zebra"));

        watcher.watchlist.remove_community("zebra").await.unwrap();
        watcher.reconcile().await.unwrap();
        assert_eq!(watcher.scope.as_deref(), Some("alpha"));
    }
}
