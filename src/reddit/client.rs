use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{Comment, Submission, Upstream};
use crate::error::UpstreamError;

const REDDIT_API_URL: &str = "https://www.reddit.com";
/// Public listings cap out at 100 items per request.
const LISTING_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    data: ThingData,
}

/// Union of the comment and submission fields we read. Listings mix thing
/// kinds, so everything is optional and the mappers below skip anything
/// that lacks the fields for its kind.
#[derive(Debug, Deserialize)]
struct ThingData {
    name: Option<String>,
    author: Option<String>,
    body: Option<String>,
    title: Option<String>,
    permalink: Option<String>,
    created_utc: Option<f64>,
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct About {
    kind: String,
}

/// Client for the site's public JSON endpoints. No authentication; the
/// site only asks for a descriptive user agent.
pub struct RedditClient {
    client: Client,
}

impl RedditClient {
    pub fn new(user_agent: &str) -> Self {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    async fn get_listing(&self, url: &str) -> Result<Listing, UpstreamError> {
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => return Err(UpstreamError::RateLimited),
            status if !status.is_success() => return Err(UpstreamError::Status(status.as_u16())),
            _ => {}
        }

        Ok(response.json().await?)
    }

    async fn thing_exists(&self, url: &str, kind: &str) -> Result<bool, UpstreamError> {
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(false),
            StatusCode::TOO_MANY_REQUESTS => return Err(UpstreamError::RateLimited),
            status if !status.is_success() => return Err(UpstreamError::Status(status.as_u16())),
            _ => {}
        }

        // Lookups for nonexistent names can redirect to a search page that
        // still answers 200, so only a well-formed about response counts.
        match response.json::<About>().await {
            Ok(about) => Ok(about.kind == kind),
            Err(_) => Ok(false),
        }
    }
}

#[async_trait]
impl Upstream for RedditClient {
    async fn latest_comments(&self, scope: &str) -> Result<Vec<Comment>, UpstreamError> {
        let url = format!("{REDDIT_API_URL}/r/{scope}/comments.json?limit={LISTING_LIMIT}");
        let listing = self.get_listing(&url).await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .filter_map(comment_from_thing)
            .collect())
    }

    async fn latest_submissions(&self, scope: &str) -> Result<Vec<Submission>, UpstreamError> {
        let url = format!("{REDDIT_API_URL}/r/{scope}/new.json?limit={LISTING_LIMIT}");
        let listing = self.get_listing(&url).await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .filter_map(submission_from_thing)
            .collect())
    }

    async fn parent_author(&self, parent_id: &str) -> Result<String, UpstreamError> {
        let url = format!("{REDDIT_API_URL}/api/info.json?id={parent_id}");
        let listing = self.get_listing(&url).await?;
        listing
            .data
            .children
            .into_iter()
            .find_map(|thing| thing.data.author)
            .ok_or_else(|| UpstreamError::NotFound(parent_id.to_string()))
    }

    async fn author_exists(&self, name: &str) -> Result<bool, UpstreamError> {
        let url = format!("{REDDIT_API_URL}/user/{name}/about.json");
        self.thing_exists(&url, "t2").await
    }

    async fn community_exists(&self, name: &str) -> Result<bool, UpstreamError> {
        let url = format!("{REDDIT_API_URL}/r/{name}/about.json");
        self.thing_exists(&url, "t5").await
    }
}

fn comment_from_thing(thing: Thing) -> Option<Comment> {
    let data = thing.data;
    Some(Comment {
        id: data.name?,
        author: data.author?,
        body: data.body?,
        permalink: data.permalink?,
        created_utc: data.created_utc? as i64,
        parent_id: data.parent_id?,
    })
}

fn submission_from_thing(thing: Thing) -> Option<Submission> {
    let data = thing.data;
    Some(Submission {
        id: data.name?,
        author: data.author?,
        title: data.title?,
        permalink: data.permalink?,
        created_utc: data.created_utc? as i64,
    })
}
