mod client;
mod stream;

pub use client::RedditClient;
pub use stream::{CommentStream, SubmissionStream};

use async_trait::async_trait;
use url::Url;

use crate::error::UpstreamError;

const SITE_URL: &str = "https://reddit.com";

/// A comment from a community stream. Ids are upstream fullnames
/// ("t1_..."), which is what the events table keys on.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub body: String,
    /// Site-relative permalink path.
    pub permalink: String,
    pub created_utc: i64,
    /// Fullname of the thing this comment replies to ("t1_..." for a
    /// comment, "t3_..." for a submission).
    pub parent_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub id: String,
    pub author: String,
    pub title: String,
    pub permalink: String,
    pub created_utc: i64,
}

/// Read-only view of the upstream site. The watcher and the chat commands
/// only ever talk to the site through this trait, so tests can script it.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Latest comments in a scope, newest first as the site reports them.
    async fn latest_comments(&self, scope: &str) -> Result<Vec<Comment>, UpstreamError>;

    /// Latest submissions in a scope, newest first.
    async fn latest_submissions(&self, scope: &str) -> Result<Vec<Submission>, UpstreamError>;

    /// Author of the thing `parent_id` points at.
    async fn parent_author(&self, parent_id: &str) -> Result<String, UpstreamError>;

    async fn author_exists(&self, name: &str) -> Result<bool, UpstreamError>;

    async fn community_exists(&self, name: &str) -> Result<bool, UpstreamError>;
}

/// Expand a site-relative permalink into an absolute link.
pub fn permalink_url(permalink: &str) -> String {
    match Url::parse(SITE_URL).and_then(|base| base.join(permalink)) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{SITE_URL}{permalink}"),
    }
}
