use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::db::{AddOutcome, DeactivateOutcome, RegisterOutcome, WatchlistStore};
use crate::error::WatchError;
use crate::reddit::Upstream;

const HELP_TEXT: &str = "/add <redditor> - watch a redditor\n\
/remove <redditor> - stop watching a redditor\n\
/list - watched redditors\n\
/addsub <subreddit> - watch a subreddit\n\
/rmsub <subreddit> - stop watching a subreddit\n\
/listsubs - watched subreddits\n\
/mute <redditor> <duration> - pause notifications, e.g. 30m, 12h, 7d\n\
/unmute <redditor> - lift a mute early\n\
/rate <redditor> <delta> - adjust a rating, e.g. /rate alice -2\n\
/stop - unsubscribe this chat";

const MUTE_USAGE: &str = "usage: /mute <redditor> <duration>, e.g. /mute alice 12h (units: m, h, d, y)";
const RATE_USAGE: &str = "usage: /rate <redditor> <delta>, e.g. /rate alice -2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Command {
    Start,
    Help,
    Stop,
    ListAuthors,
    ListCommunities,
    AddAuthor(String),
    RemoveAuthor(String),
    AddCommunity(String),
    RemoveCommunity(String),
    Mute { author: String, duration_secs: i64 },
    Unmute(String),
    Rate { author: String, delta: i64 },
}

/// Parse a chat message into a command. `None` means the message is not a
/// command at all; `Err` carries the usage text for a malformed one.
pub(super) fn parse_command(text: &str) -> Option<Result<Command, String>> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let mut parts = text.split_whitespace();
    let head = parts.next()?;
    // Group chats address commands as "/add@BotName"
    let command = head.split('@').next().unwrap_or(head);
    let args: Vec<&str> = parts.collect();

    let parsed = match (command, args.as_slice()) {
        ("/start", _) => Ok(Command::Start),
        ("/help", _) => Ok(Command::Help),
        ("/stop", _) => Ok(Command::Stop),
        ("/list", _) => Ok(Command::ListAuthors),
        ("/listsubs", _) => Ok(Command::ListCommunities),
        ("/add", [name]) => Ok(Command::AddAuthor((*name).to_string())),
        ("/add", _) => Err("usage: /add <redditor>".to_string()),
        ("/remove", [name]) => Ok(Command::RemoveAuthor((*name).to_string())),
        ("/remove", _) => Err("usage: /remove <redditor>".to_string()),
        ("/addsub", [name]) => Ok(Command::AddCommunity((*name).to_string())),
        ("/addsub", _) => Err("usage: /addsub <subreddit>".to_string()),
        ("/rmsub", [name]) => Ok(Command::RemoveCommunity((*name).to_string())),
        ("/rmsub", _) => Err("usage: /rmsub <subreddit>".to_string()),
        ("/mute", [name, duration]) => match parse_duration(duration) {
            Some(duration_secs) => Ok(Command::Mute {
                author: (*name).to_string(),
                duration_secs,
            }),
            None => Err(MUTE_USAGE.to_string()),
        },
        ("/mute", _) => Err(MUTE_USAGE.to_string()),
        ("/unmute", [name]) => Ok(Command::Unmute((*name).to_string())),
        ("/unmute", _) => Err("usage: /unmute <redditor>".to_string()),
        ("/rate", [name, delta]) => match delta.parse::<i64>() {
            Ok(delta) => Ok(Command::Rate {
                author: (*name).to_string(),
                delta,
            }),
            Err(_) => Err(RATE_USAGE.to_string()),
        },
        ("/rate", _) => Err(RATE_USAGE.to_string()),
        _ => Err(format!("unknown command {command}, try /help")),
    };
    Some(parsed)
}

/// Duration grammar for mutes: a positive whole number with an explicit
/// unit suffix, one of m(inutes), h(ours), d(ays) or y(ears).
fn parse_duration(input: &str) -> Option<i64> {
    let (last_idx, unit) = input.char_indices().last()?;
    let value: i64 = input[..last_idx].parse().ok()?;
    if value <= 0 {
        return None;
    }

    let secs_per_unit = match unit {
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'y' => 31_536_000,
        _ => return None,
    };
    value.checked_mul(secs_per_unit)
}

/// Executes parsed commands against the watchlist and renders the reply
/// text. Domain failures read back verbatim; anything else is logged and
/// replaced with a generic apology.
pub(super) struct CommandHandler {
    watchlist: WatchlistStore,
    upstream: Arc<dyn Upstream>,
}

impl CommandHandler {
    pub(super) fn new(watchlist: WatchlistStore, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            watchlist,
            upstream,
        }
    }

    pub(super) async fn handle(
        &self,
        command: Command,
        chat_id: &str,
        username: Option<&str>,
    ) -> String {
        self.handle_at(command, chat_id, username, Utc::now().timestamp())
            .await
    }

    async fn handle_at(
        &self,
        command: Command,
        chat_id: &str,
        username: Option<&str>,
        now: i64,
    ) -> String {
        let result = match command {
            Command::Start => self.start(chat_id, username).await,
            Command::Help => Ok(HELP_TEXT.to_string()),
            Command::Stop => self.stop(chat_id).await,
            Command::ListAuthors => self.list_authors(now).await,
            Command::ListCommunities => self.list_communities().await,
            Command::AddAuthor(name) => self.add_author(&name).await,
            Command::RemoveAuthor(name) => self.remove_author(&name).await,
            Command::AddCommunity(name) => self.add_community(&name).await,
            Command::RemoveCommunity(name) => self.remove_community(&name).await,
            Command::Mute {
                author,
                duration_secs,
            } => self.mute(&author, duration_secs, now).await,
            Command::Unmute(author) => self.unmute(&author, now).await,
            Command::Rate { author, delta } => self.rate(&author, delta).await,
        };

        match result {
            Ok(reply) => reply,
            Err(e) if e.is_domain() => e.to_string(),
            Err(e) => {
                tracing::error!("command failed: {}", e);
                "something went wrong, try again later".to_string()
            }
        }
    }

    async fn start(&self, chat_id: &str, username: Option<&str>) -> Result<String, WatchError> {
        let reply = match self.watchlist.register_subscriber(chat_id, username).await? {
            RegisterOutcome::Added => {
                "subscribed, this chat now gets watch notifications\nsend /help for the command list"
            }
            RegisterOutcome::Reactivated => "welcome back, notifications are on again",
            RegisterOutcome::AlreadyActive => "this chat is already subscribed",
        };
        Ok(reply.to_string())
    }

    async fn stop(&self, chat_id: &str) -> Result<String, WatchError> {
        let reply = match self.watchlist.deactivate_subscriber(chat_id).await? {
            DeactivateOutcome::Deactivated => "unsubscribed, no more notifications for this chat",
            DeactivateOutcome::NotRegistered => "this chat was not subscribed",
            DeactivateOutcome::AlreadyInactive => "this chat is already unsubscribed",
        };
        Ok(reply.to_string())
    }

    async fn list_authors(&self, now: i64) -> Result<String, WatchError> {
        let authors = self.watchlist.active_authors().await?;
        if authors.is_empty() {
            return Ok("no redditors on the watchlist".to_string());
        }
        let lines: Vec<String> = authors
            .iter()
            .map(|author| {
                let muted = if author.is_muted(now) { " [muted]" } else { "" };
                format!("{} (rating {}){}", author.name, author.rating, muted)
            })
            .collect();
        Ok(lines.join("\n"))
    }

    async fn list_communities(&self) -> Result<String, WatchError> {
        let names = self.watchlist.active_community_names().await?;
        if names.is_empty() {
            return Ok("no subreddits on the watchlist".to_string());
        }
        let lines: Vec<String> = names.iter().map(|name| format!("/r/{name}")).collect();
        Ok(lines.join("\n"))
    }

    async fn add_author(&self, name: &str) -> Result<String, WatchError> {
        let name = name.trim();
        match self.upstream.author_exists(name).await {
            Ok(true) => {}
            Ok(false) => return Ok(format!("no such redditor: {name}")),
            Err(e) => {
                tracing::warn!("author lookup failed: {}", e);
                return Ok("couldn't reach reddit, try again later".to_string());
            }
        }

        let reply = match self.watchlist.add_author(name).await? {
            AddOutcome::Added => format!("watching {name}"),
            AddOutcome::Reactivated => format!("watching {name} again"),
        };
        Ok(reply)
    }

    async fn remove_author(&self, name: &str) -> Result<String, WatchError> {
        self.watchlist.remove_author(name).await?;
        Ok(format!("stopped watching {}", name.trim()))
    }

    async fn add_community(&self, name: &str) -> Result<String, WatchError> {
        let name = name.trim();
        match self.upstream.community_exists(name).await {
            Ok(true) => {}
            Ok(false) => return Ok(format!("no such subreddit: {name}")),
            Err(e) => {
                tracing::warn!("subreddit lookup failed: {}", e);
                return Ok("couldn't reach reddit, try again later".to_string());
            }
        }

        let reply = match self.watchlist.add_community(name).await? {
            AddOutcome::Added => format!("watching /r/{name}"),
            AddOutcome::Reactivated => format!("watching /r/{name} again"),
        };
        Ok(reply)
    }

    async fn remove_community(&self, name: &str) -> Result<String, WatchError> {
        self.watchlist.remove_community(name).await?;
        Ok(format!("stopped watching /r/{}", name.trim()))
    }

    async fn mute(&self, author: &str, duration_secs: i64, now: i64) -> Result<String, WatchError> {
        self.watchlist.mute_author(author, duration_secs, now).await?;
        let when = DateTime::<Utc>::from_timestamp(now.saturating_add(duration_secs), 0)
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "the far future".to_string());
        Ok(format!("muted {} until {}", author.trim(), when))
    }

    async fn unmute(&self, author: &str, now: i64) -> Result<String, WatchError> {
        self.watchlist.unmute_author(author, now).await?;
        Ok(format!("unmuted {}", author.trim()))
    }

    async fn rate(&self, author: &str, delta: i64) -> Result<String, WatchError> {
        let rating = self.watchlist.rate_author(author, delta).await?;
        Ok(format!("{} is now rated {}", author.trim(), rating))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::db::Db;
    use crate::error::UpstreamError;
    use crate::reddit::{Comment, Submission};

    #[test]
    fn plain_messages_are_not_commands() {
        assert!(parse_command("hello there").is_none());
        assert!(parse_command("").is_none());
    }

    #[test]
    fn parses_bare_and_mentioned_commands() {
        assert_eq!(parse_command("/list").unwrap().unwrap(), Command::ListAuthors);
        assert_eq!(
            parse_command("  /add alice  ").unwrap().unwrap(),
            Command::AddAuthor("alice".to_string())
        );
        assert_eq!(
            parse_command("/add@WatcherBot alice").unwrap().unwrap(),
            Command::AddAuthor("alice".to_string())
        );
    }

    #[test]
    fn missing_arguments_produce_usage_errors() {
        assert!(parse_command("/add").unwrap().is_err());
        assert!(parse_command("/add alice bob").unwrap().is_err());
        assert!(parse_command("/mute alice").unwrap().is_err());
        assert!(parse_command("/rate alice").unwrap().is_err());
        assert!(parse_command("/frobnicate").unwrap().is_err());
    }

    #[test]
    fn mute_durations_require_an_explicit_unit() {
        assert_eq!(parse_duration("30m"), Some(1_800));
        assert_eq!(parse_duration("12h"), Some(43_200));
        assert_eq!(parse_duration("7d"), Some(604_800));
        assert_eq!(parse_duration("1y"), Some(31_536_000));

        assert_eq!(parse_duration("30"), None);
        assert_eq!(parse_duration("30x"), None);
        assert_eq!(parse_duration("-5m"), None);
        assert_eq!(parse_duration("0h"), None);
        assert_eq!(parse_duration("m"), None);
        // Values that would overflow the timestamp math are rejected
        assert_eq!(parse_duration("999999999999999999y"), None);
    }

    #[test]
    fn parses_signed_rating_deltas() {
        assert_eq!(
            parse_command("/rate alice -2").unwrap().unwrap(),
            Command::Rate {
                author: "alice".to_string(),
                delta: -2
            }
        );
    }

    /// Upstream stub with canned existence answers.
    struct FixedUpstream {
        author_exists: Option<bool>,
        community_exists: Option<bool>,
    }

    impl Default for FixedUpstream {
        fn default() -> Self {
            Self {
                author_exists: Some(true),
                community_exists: Some(true),
            }
        }
    }

    #[async_trait]
    impl Upstream for FixedUpstream {
        async fn latest_comments(&self, _scope: &str) -> Result<Vec<Comment>, UpstreamError> {
            unimplemented!()
        }

        async fn latest_submissions(&self, _scope: &str) -> Result<Vec<Submission>, UpstreamError> {
            unimplemented!()
        }

        async fn parent_author(&self, _parent_id: &str) -> Result<String, UpstreamError> {
            unimplemented!()
        }

        async fn author_exists(&self, _name: &str) -> Result<bool, UpstreamError> {
            self.author_exists.ok_or(UpstreamError::Status(500))
        }

        async fn community_exists(&self, _name: &str) -> Result<bool, UpstreamError> {
            self.community_exists.ok_or(UpstreamError::Status(500))
        }
    }

    async fn handler_with(upstream: FixedUpstream) -> (CommandHandler, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.db");
        let db = Db::open(path.to_str().unwrap()).await.unwrap();
        let handler = CommandHandler::new(WatchlistStore::new(db), Arc::new(upstream));
        (handler, dir)
    }

    #[tokio::test]
    async fn start_and_stop_manage_the_subscription() {
        let (handler, _dir) = handler_with(FixedUpstream::default()).await;

        let reply = handler.handle(Command::Start, "42", Some("carol")).await;
        assert!(reply.starts_with("subscribed"));

        let reply = handler.handle(Command::Start, "42", Some("carol")).await;
        assert_eq!(reply, "this chat is already subscribed");

        let reply = handler.handle(Command::Stop, "42", None).await;
        assert!(reply.starts_with("unsubscribed"));

        let reply = handler.handle(Command::Start, "42", Some("carol")).await;
        assert_eq!(reply, "welcome back, notifications are on again");
    }

    #[tokio::test]
    async fn add_author_checks_the_site_first() {
        let (handler, _dir) = handler_with(FixedUpstream {
            author_exists: Some(false),
            ..Default::default()
        })
        .await;

        let reply = handler
            .handle(Command::AddAuthor("ghost".to_string()), "42", None)
            .await;
        assert_eq!(reply, "no such redditor: ghost");
        assert!(handler.watchlist.active_authors().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_site_is_reported_gently() {
        let (handler, _dir) = handler_with(FixedUpstream {
            author_exists: None,
            ..Default::default()
        })
        .await;

        let reply = handler
            .handle(Command::AddAuthor("alice".to_string()), "42", None)
            .await;
        assert_eq!(reply, "couldn't reach reddit, try again later");
    }

    #[tokio::test]
    async fn duplicate_adds_read_back_the_domain_error() {
        let (handler, _dir) = handler_with(FixedUpstream::default()).await;

        let reply = handler
            .handle(Command::AddAuthor("alice".to_string()), "42", None)
            .await;
        assert_eq!(reply, "watching alice");

        let reply = handler
            .handle(Command::AddAuthor("alice".to_string()), "42", None)
            .await;
        assert_eq!(reply, "redditor already being watched: alice");
    }

    #[tokio::test]
    async fn list_shows_ratings_and_mutes() {
        let (handler, _dir) = handler_with(FixedUpstream::default()).await;
        handler.watchlist.add_author("alice").await.unwrap();
        handler.watchlist.add_author("bob").await.unwrap();
        handler.watchlist.rate_author("alice", 2).await.unwrap();
        handler.watchlist.mute_author("bob", 3_600, 1_000).await.unwrap();

        let reply = handler
            .handle_at(Command::ListAuthors, "42", None, 2_000)
            .await;
        assert_eq!(reply, "alice (rating 7)\nbob (rating 5) [muted]");

        // After the mute expires the marker disappears
        let reply = handler
            .handle_at(Command::ListAuthors, "42", None, 5_000)
            .await;
        assert_eq!(reply, "alice (rating 7)\nbob (rating 5)");
    }

    #[tokio::test]
    async fn mute_reply_names_the_deadline() {
        let (handler, _dir) = handler_with(FixedUpstream::default()).await;
        handler.watchlist.add_author("alice").await.unwrap();

        let command = Command::Mute {
            author: "alice".to_string(),
            duration_secs: 3_600,
        };
        let reply = handler.handle_at(command, "42", None, 0).await;
        assert_eq!(reply, "muted alice until 1970-01-01 01:00 UTC");
    }

    #[tokio::test]
    async fn rating_an_unknown_author_fails_cleanly() {
        let (handler, _dir) = handler_with(FixedUpstream::default()).await;

        let command = Command::Rate {
            author: "ghost".to_string(),
            delta: 1,
        };
        let reply = handler.handle(command, "42", None).await;
        assert_eq!(reply, "redditor not found: ghost");
    }

    #[tokio::test]
    async fn communities_list_with_their_prefix() {
        let (handler, _dir) = handler_with(FixedUpstream::default()).await;
        handler.watchlist.add_community("rust").await.unwrap();

        let reply = handler
            .handle(Command::AddCommunity("golang".to_string()), "42", None)
            .await;
        assert_eq!(reply, "watching /r/golang");

        let reply = handler.handle(Command::ListCommunities, "42", None).await;
        assert_eq!(reply, "/r/golang\n/r/rust");
    }
}
