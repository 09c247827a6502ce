/// A redditor on the watchlist. Removal deactivates the row instead of
/// deleting it, so rating and mute history survive a later re-add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedAuthor {
    pub id: i64,
    pub name: String,
    pub active: bool,
    /// Epoch seconds. A value at or before "now" means not muted; mute state
    /// is always derived from this, never stored as a flag.
    pub muted_until: i64,
    pub rating: i64,
}

impl WatchedAuthor {
    pub fn is_muted(&self, now: i64) -> bool {
        self.muted_until > now
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedCommunity {
    pub id: i64,
    pub name: String,
    pub active: bool,
}
