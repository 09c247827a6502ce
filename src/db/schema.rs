pub const SCHEMA: &str = r#"
-- watched_authors table
CREATE TABLE IF NOT EXISTS watched_authors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    active INTEGER NOT NULL DEFAULT 1,
    muted_until INTEGER NOT NULL DEFAULT 0,
    rating INTEGER NOT NULL DEFAULT 5
);

-- watched_communities table
CREATE TABLE IF NOT EXISTS watched_communities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    active INTEGER NOT NULL DEFAULT 1
);

-- events table (keyed by the upstream content id, one row per item ever seen)
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    author TEXT NOT NULL,
    content TEXT NOT NULL,
    url TEXT NOT NULL,
    created_utc INTEGER NOT NULL,
    delivered INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_events_delivered ON events(delivered);
CREATE INDEX IF NOT EXISTS idx_events_created_utc ON events(created_utc);

-- subscribers table
CREATE TABLE IF NOT EXISTS subscribers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id TEXT NOT NULL UNIQUE,
    username TEXT,
    active INTEGER NOT NULL DEFAULT 1
);
"#;
