use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::client::{TelegramClient, Update};
use super::commands::{parse_command, CommandHandler};
use super::ChatTransport;
use crate::db::WatchlistStore;
use crate::reddit::Upstream;

/// Cooldown after a failed update poll.
const POLL_ERROR_COOLDOWN: Duration = Duration::from_secs(10);

/// The command loop: long-polls the chat API for updates and answers
/// watchlist commands.
pub struct CommandBot {
    client: TelegramClient,
    handler: CommandHandler,
}

impl CommandBot {
    pub fn new(
        client: TelegramClient,
        watchlist: WatchlistStore,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self {
            client,
            handler: CommandHandler::new(watchlist, upstream),
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut offset = 0i64;

        loop {
            tokio::select! {
                updates = self.client.get_updates(offset) => {
                    match updates {
                        Ok(updates) => {
                            for update in updates {
                                offset = offset.max(update.update_id + 1);
                                self.handle_update(update).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!("update poll failed: {}", e);
                            tokio::time::sleep(POLL_ERROR_COOLDOWN).await;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("command bot stopping");
                    break;
                }
            }
        }
    }

    async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else { return };
        let Some(text) = message.text.as_deref() else { return };
        // Anything that is not a command is somebody else's conversation
        let Some(parsed) = parse_command(text) else { return };

        let chat_id = message.chat.id.to_string();
        let username = message.from.as_ref().and_then(|u| u.username.as_deref());

        let reply = match parsed {
            Ok(command) => self.handler.handle(command, &chat_id, username).await,
            Err(usage) => usage,
        };

        if let Err(e) = self.client.send_message(&chat_id, &reply).await {
            tracing::warn!("failed to reply to chat {}: {}", chat_id, e);
        }
    }
}
