use std::sync::Arc;
use std::time::Duration;

use futures::future;
use tokio::sync::watch;

use crate::db::{EventStore, WatchlistStore};
use crate::error::StoreError;
use crate::models::Event;
use crate::telegram::ChatTransport;

/// Most rockets a notification will carry. Stored ratings are unbounded,
/// so the rendering has to cap somewhere the message stays readable.
const MAX_ROCKETS: i64 = 10;

/// The delivery loop: drains undelivered events oldest first and fans each
/// one out to every active subscriber. Events are marked delivered after
/// the send attempts, so a crash mid-cycle re-delivers rather than drops.
pub struct DeliveryLoop {
    watchlist: WatchlistStore,
    events: EventStore,
    transport: Arc<dyn ChatTransport>,
    interval: Duration,
}

impl DeliveryLoop {
    pub fn new(
        watchlist: WatchlistStore,
        events: EventStore,
        transport: Arc<dyn ChatTransport>,
        interval: Duration,
    ) -> Self {
        Self {
            watchlist,
            events,
            transport,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(0) => {}
                        Ok(count) => tracing::info!("delivered {} events", count),
                        Err(e) => tracing::warn!("delivery cycle failed: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("delivery loop stopping");
                    break;
                }
            }
        }
    }

    /// One delivery pass. Returns how many events were marked delivered.
    async fn run_cycle(&self) -> Result<usize, StoreError> {
        let pending = self.events.pending_events().await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let subscribers = self.watchlist.active_subscriber_ids().await?;
        let mut delivered = Vec::with_capacity(pending.len());

        for event in &pending {
            // A missing rating never blocks delivery, the message just
            // carries no rockets.
            let rating = match self.watchlist.author_rating(&event.author).await {
                Ok(rating) => Some(rating),
                Err(e) => {
                    tracing::debug!("no rating for {}: {}", event.author, e);
                    None
                }
            };
            let text = format_notification(event, rating);

            let sends = subscribers.iter().map(|chat_id| {
                let text = &text;
                async move {
                    if let Err(e) = self.transport.send_message(chat_id, text).await {
                        tracing::warn!("failed to notify chat {}: {}", chat_id, e);
                    }
                }
            });
            future::join_all(sends).await;

            delivered.push(event.id.clone());
        }

        self.events.mark_delivered(&delivered).await?;
        Ok(delivered.len())
    }
}

/// Notification text for an event. The author's rating shows as a run of
/// rockets; ratings at or below zero show none, ratings past
/// [`MAX_ROCKETS`] show the cap.
fn format_notification(event: &Event, rating: Option<i64>) -> String {
    let rockets = "🚀".repeat(rating.unwrap_or(0).clamp(0, MAX_ROCKETS) as usize);
    format!(
        "📢 New {} by {}{}\n{}",
        event.kind, event.author, rockets, event.url
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::db::Db;
    use crate::error::ChannelError;
    use crate::models::{EventKind, NewEvent};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, String)>>,
        fail_chat: Option<String>,
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
            if self.fail_chat.as_deref() == Some(chat_id) {
                return Err(ChannelError::Api("blocked by user".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    async fn delivery_with(
        transport: Arc<RecordingTransport>,
    ) -> (DeliveryLoop, WatchlistStore, EventStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("delivery.db");
        let db = Db::open(path.to_str().unwrap()).await.unwrap();
        let watchlist = WatchlistStore::new(db.clone());
        let events = EventStore::new(db);
        let delivery = DeliveryLoop::new(
            watchlist.clone(),
            events.clone(),
            transport,
            Duration::from_secs(5),
        );
        (delivery, watchlist, events, dir)
    }

    fn event(id: &str, author: &str, created_utc: i64) -> NewEvent {
        NewEvent {
            id: id.to_string(),
            kind: EventKind::Submission,
            author: author.to_string(),
            content: "a submission".to_string(),
            url: format!("https://reddit.com/r/test/comments/{id}/"),
            created_utc,
        }
    }

    fn sample_event() -> Event {
        Event {
            id: "t3_a".to_string(),
            kind: EventKind::Submission,
            author: "alice".to_string(),
            content: "a submission".to_string(),
            url: "https://reddit.com/r/test/comments/t3_a/".to_string(),
            created_utc: 100,
            delivered: false,
        }
    }

    #[test]
    fn notification_carries_one_rocket_per_rating_point() {
        let text = format_notification(&sample_event(), Some(3));
        assert_eq!(
            text,
            "📢 New submission by alice🚀🚀🚀\nhttps://reddit.com/r/test/comments/t3_a/"
        );
    }

    #[test]
    fn rocket_runs_cap_at_the_display_limit() {
        let capped = format_notification(&sample_event(), Some(MAX_ROCKETS));
        assert_eq!(format_notification(&sample_event(), Some(MAX_ROCKETS + 1)), capped);
        // Ratings are unbounded, the rendering must not be
        assert_eq!(format_notification(&sample_event(), Some(i64::MAX)), capped);
        assert_eq!(capped.matches("🚀").count(), MAX_ROCKETS as usize);
    }

    #[test]
    fn non_positive_and_missing_ratings_show_no_rockets() {
        let plain = "📢 New submission by alice\nhttps://reddit.com/r/test/comments/t3_a/";
        assert_eq!(format_notification(&sample_event(), Some(0)), plain);
        assert_eq!(format_notification(&sample_event(), Some(-7)), plain);
        assert_eq!(format_notification(&sample_event(), None), plain);
    }

    #[tokio::test]
    async fn delivers_oldest_first_to_every_subscriber() {
        let transport = Arc::new(RecordingTransport::default());
        let (delivery, watchlist, events, _dir) = delivery_with(transport.clone()).await;

        watchlist.add_author("alice").await.unwrap();
        watchlist.rate_author("alice", -3).await.unwrap(); // 5 -> 2
        watchlist.register_subscriber("1", None).await.unwrap();
        watchlist.register_subscriber("2", None).await.unwrap();

        events.upsert_event(event("t3_new", "alice", 200)).await.unwrap();
        events.upsert_event(event("t3_old", "alice", 100)).await.unwrap();

        assert_eq!(delivery.run_cycle().await.unwrap(), 2);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 4);
        // Both chats hear about the older event before the newer one
        assert!(sent[0].1.contains("t3_old"));
        assert!(sent[1].1.contains("t3_old"));
        assert!(sent[2].1.contains("t3_new"));
        assert!(sent[3].1.contains("t3_new"));
        assert!(sent[0].1.contains("🚀🚀\n"));
        drop(sent);

        assert!(events.pending_events().await.unwrap().is_empty());
        assert!(events.event("t3_old").await.unwrap().unwrap().delivered);
    }

    #[tokio::test]
    async fn an_extreme_rating_still_delivers() {
        let transport = Arc::new(RecordingTransport::default());
        let (delivery, watchlist, events, _dir) = delivery_with(transport.clone()).await;

        watchlist.add_author("alice").await.unwrap();
        watchlist.rate_author("alice", i64::MAX - 5).await.unwrap(); // 5 -> i64::MAX
        watchlist.register_subscriber("1", None).await.unwrap();
        events.upsert_event(event("t3_a", "alice", 100)).await.unwrap();

        assert_eq!(delivery.run_cycle().await.unwrap(), 1);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.matches("🚀").count(), MAX_ROCKETS as usize);
        drop(sent);

        assert!(events.event("t3_a").await.unwrap().unwrap().delivered);
    }

    #[tokio::test]
    async fn one_failing_chat_does_not_hold_the_queue() {
        let transport = Arc::new(RecordingTransport {
            fail_chat: Some("1".to_string()),
            ..Default::default()
        });
        let (delivery, watchlist, events, _dir) = delivery_with(transport.clone()).await;

        watchlist.add_author("alice").await.unwrap();
        watchlist.register_subscriber("1", None).await.unwrap();
        watchlist.register_subscriber("2", None).await.unwrap();
        events.upsert_event(event("t3_a", "alice", 100)).await.unwrap();

        assert_eq!(delivery.run_cycle().await.unwrap(), 1);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "2");
        drop(sent);

        assert!(events.event("t3_a").await.unwrap().unwrap().delivered);
    }

    #[tokio::test]
    async fn an_empty_subscriber_list_still_drains_the_queue() {
        let transport = Arc::new(RecordingTransport::default());
        let (delivery, _watchlist, events, _dir) = delivery_with(transport.clone()).await;

        events.upsert_event(event("t3_a", "ghost", 100)).await.unwrap();

        assert_eq!(delivery.run_cycle().await.unwrap(), 1);
        assert!(transport.sent.lock().unwrap().is_empty());
        assert!(events.pending_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_author_delivers_without_rockets() {
        let transport = Arc::new(RecordingTransport::default());
        let (delivery, watchlist, events, _dir) = delivery_with(transport.clone()).await;

        watchlist.register_subscriber("1", None).await.unwrap();
        events.upsert_event(event("t3_a", "ghost", 100)).await.unwrap();

        assert_eq!(delivery.run_cycle().await.unwrap(), 1);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].1, "📢 New submission by ghost\nhttps://reddit.com/r/test/comments/t3_a/");
    }
}
