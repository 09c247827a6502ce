mod event;
mod subscriber;
mod watchlist;

pub use event::{Event, EventKind, NewEvent};
pub use subscriber::Subscriber;
pub use watchlist::{WatchedAuthor, WatchedCommunity};
