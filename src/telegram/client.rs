use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::ChatTransport;
use crate::error::ChannelError;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";
/// Long-poll window for getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 25;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    offset: i64,
    timeout: u64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub text: Option<String>,
    pub chat: Chat,
    pub from: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub username: Option<String>,
}

/// Client for the Telegram bot API.
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: format!("{TELEGRAM_API_URL}/bot{token}"),
        }
    }

    /// Fetch updates after `offset`, long-polling the API.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, ChannelError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: POLL_TIMEOUT_SECS,
        };
        let response = self
            .client
            .post(format!("{}/getUpdates", self.base_url))
            // Must outlive the server-side long-poll window
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .json(&request)
            .send()
            .await?;

        let body: ApiResponse<Vec<Update>> = response.json().await?;
        if !body.ok {
            return Err(ChannelError::Api(
                body.description
                    .unwrap_or_else(|| "unknown API error".to_string()),
            ));
        }
        Ok(body.result.unwrap_or_default())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let request = SendMessageRequest { chat_id, text };
        let response = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&request)
            .send()
            .await?;

        // The API reports failures in the body, with the HTTP status along
        // for the ride
        let body: ApiResponse<serde_json::Value> = response.json().await?;
        if !body.ok {
            return Err(ChannelError::Api(
                body.description
                    .unwrap_or_else(|| "unknown API error".to_string()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_an_update_batch() {
        let raw = r#"{
            "ok": true,
            "result": [
                {
                    "update_id": 1001,
                    "message": {
                        "message_id": 7,
                        "text": "/add alice",
                        "chat": {"id": 42, "type": "private"},
                        "from": {"id": 9, "is_bot": false, "username": "carol"}
                    }
                },
                {"update_id": 1002}
            ]
        }"#;

        let body: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        assert!(body.ok);
        let updates = body.result.unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].update_id, 1001);

        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.text.as_deref(), Some("/add alice"));
        assert_eq!(message.chat.id, 42);
        assert_eq!(
            message.from.as_ref().unwrap().username.as_deref(),
            Some("carol")
        );
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn api_failures_carry_the_description() {
        let raw = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let body: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        assert!(!body.ok);
        assert_eq!(body.description.as_deref(), Some("Unauthorized"));
    }
}
