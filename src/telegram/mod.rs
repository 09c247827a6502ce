mod bot;
mod client;
mod commands;

pub use bot::CommandBot;
pub use client::TelegramClient;

use async_trait::async_trait;

use crate::error::ChannelError;

/// Outbound side of the chat channel. The delivery loop only ever pushes
/// text at a chat id, so tests swap in a recording transport.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError>;
}
