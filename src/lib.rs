//! Watches reddit for activity by a configurable set of redditors and
//! delivers matching events to Telegram subscribers.

pub mod config;
pub mod db;
pub mod delivery;
pub mod error;
pub mod models;
pub mod reddit;
pub mod telegram;
pub mod watcher;

pub use error::{AppError, Result};
