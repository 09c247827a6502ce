/// A Telegram chat that receives notifications. Registered when the user
/// first talks to the bot, soft-deleted on opt-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub id: i64,
    pub chat_id: String,
    pub username: Option<String>,
    pub active: bool,
}
