use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use super::{Comment, Submission, Upstream};
use crate::error::UpstreamError;

/// How many recently seen ids a stream remembers. Several listings deep,
/// enough to absorb reordering between polls without growing forever.
const SEEN_WINDOW: usize = 512;

/// Sliding window of ids already yielded by a stream.
struct SeenWindow {
    ids: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
}

impl SeenWindow {
    fn new(cap: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    /// Record an id, evicting the oldest entry once the window is full.
    /// Returns false if the id was already present.
    fn insert(&mut self, id: &str) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        if self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }
}

/// Polling stream over a scope's comments. Each fetch is deduplicated
/// against the seen window and replayed oldest first, so items come out in
/// publication order. A fresh stream yields the whole current listing.
pub struct CommentStream {
    upstream: Arc<dyn Upstream>,
    scope: String,
    seen: SeenWindow,
    backlog: VecDeque<Comment>,
}

impl CommentStream {
    pub fn new(upstream: Arc<dyn Upstream>, scope: &str) -> Self {
        Self {
            upstream,
            scope: scope.to_string(),
            seen: SeenWindow::new(SEEN_WINDOW),
            backlog: VecDeque::new(),
        }
    }

    /// Next unseen comment. `Ok(None)` means the scope has nothing new.
    pub async fn next(&mut self) -> Result<Option<Comment>, UpstreamError> {
        if let Some(comment) = self.backlog.pop_front() {
            return Ok(Some(comment));
        }

        let listing = self.upstream.latest_comments(&self.scope).await?;
        for comment in listing.into_iter().rev() {
            if self.seen.insert(&comment.id) {
                self.backlog.push_back(comment);
            }
        }
        Ok(self.backlog.pop_front())
    }
}

/// Polling stream over a scope's submissions, same replay rules as
/// [`CommentStream`].
pub struct SubmissionStream {
    upstream: Arc<dyn Upstream>,
    scope: String,
    seen: SeenWindow,
    backlog: VecDeque<Submission>,
}

impl SubmissionStream {
    pub fn new(upstream: Arc<dyn Upstream>, scope: &str) -> Self {
        Self {
            upstream,
            scope: scope.to_string(),
            seen: SeenWindow::new(SEEN_WINDOW),
            backlog: VecDeque::new(),
        }
    }

    pub async fn next(&mut self) -> Result<Option<Submission>, UpstreamError> {
        if let Some(submission) = self.backlog.pop_front() {
            return Ok(Some(submission));
        }

        let listing = self.upstream.latest_submissions(&self.scope).await?;
        for submission in listing.into_iter().rev() {
            if self.seen.insert(&submission.id) {
                self.backlog.push_back(submission);
            }
        }
        Ok(self.backlog.pop_front())
    }
}
