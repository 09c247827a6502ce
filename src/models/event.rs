use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Comment,
    Submission,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Comment => "comment",
            EventKind::Submission => "submission",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "comment" => Some(EventKind::Comment),
            "submission" => Some(EventKind::Submission),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A matched upstream item about to be committed. `id` is the upstream
/// content id and acts as the primary key, so re-observing the same item
/// merges into the existing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub id: String,
    pub kind: EventKind,
    pub author: String,
    /// Comment body or submission title.
    pub content: String,
    pub url: String,
    pub created_utc: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: String,
    pub kind: EventKind,
    pub author: String,
    pub content: String,
    pub url: String,
    pub created_utc: i64,
    pub delivered: bool,
}
