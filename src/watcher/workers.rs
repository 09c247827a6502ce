use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::StreamItem;
use crate::reddit::{CommentStream, SubmissionStream, Upstream};

/// The pair of background tasks streaming one scope's comments and
/// submissions into the watcher queue. Replaced wholesale when the scope
/// changes; dropping the pair stops both tasks.
pub(super) struct StreamWorkers {
    comments: JoinHandle<()>,
    submissions: JoinHandle<()>,
}

impl StreamWorkers {
    pub(super) fn spawn(
        upstream: Arc<dyn Upstream>,
        scope: &str,
        tx: mpsc::Sender<StreamItem>,
        pause: Duration,
        cooldown: Duration,
    ) -> Self {
        let mut comment_stream = CommentStream::new(upstream.clone(), scope);
        let comment_tx = tx.clone();
        let comments = tokio::spawn(async move {
            loop {
                match comment_stream.next().await {
                    Ok(Some(comment)) => {
                        if comment_tx.send(StreamItem::Comment(comment)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => tokio::time::sleep(pause).await,
                    Err(e) => {
                        tracing::warn!("comment stream error: {}", e);
                        tokio::time::sleep(cooldown).await;
                    }
                }
            }
        });

        let mut submission_stream = SubmissionStream::new(upstream, scope);
        let submissions = tokio::spawn(async move {
            loop {
                match submission_stream.next().await {
                    Ok(Some(submission)) => {
                        if tx.send(StreamItem::Submission(submission)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => tokio::time::sleep(pause).await,
                    Err(e) => {
                        tracing::warn!("submission stream error: {}", e);
                        tokio::time::sleep(cooldown).await;
                    }
                }
            }
        });

        Self {
            comments,
            submissions,
        }
    }
}

impl Drop for StreamWorkers {
    fn drop(&mut self) {
        self.comments.abort();
        self.submissions.abort();
    }
}
