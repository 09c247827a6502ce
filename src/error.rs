use thiserror::Error;

/// Storage-layer failures, including exhaustion of the bounded commit retry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database commit failed after {0} retries (database stayed locked)")]
    RetriesExhausted(u32),

    #[error("database connection error: {0}")]
    Connection(String),
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(e) => StoreError::Sqlite(e),
            other => StoreError::Connection(other.to_string()),
        }
    }
}

/// Domain failures of the watchlist operations. The messages double as the
/// user-facing text the command layer replies with, so they stay free of
/// storage details.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("redditor not found: {0}")]
    AuthorNotFound(String),

    #[error("redditor already being watched: {0}")]
    AuthorAlreadyActive(String),

    #[error("redditor already inactive: {0}")]
    AuthorAlreadyInactive(String),

    #[error("redditor already muted: {0}")]
    AuthorAlreadyMuted(String),

    #[error("subreddit not found: {0}")]
    CommunityNotFound(String),

    #[error("subreddit already being watched: {0}")]
    CommunityAlreadyActive(String),

    #[error("subreddit already inactive: {0}")]
    CommunityAlreadyInactive(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WatchError {
    /// True for the failures a caller may show verbatim; storage failures
    /// are logged instead and replaced with a generic message.
    pub fn is_domain(&self) -> bool {
        !matches!(self, WatchError::Store(_))
    }
}

/// Failures of the upstream Reddit client. The stream workers treat every
/// variant as transient and re-enter after a cooldown.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0} from reddit")]
    Status(u16),

    #[error("rate limited by reddit")]
    RateLimited,

    #[error("upstream item not found: {0}")]
    NotFound(String),
}

/// Failures when talking to the Telegram Bot API.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telegram api error: {0}")]
    Api(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
