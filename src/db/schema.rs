/// Schema for the cache stores, the active generation and the pending action queue.
pub const SCHEMA: &str = r#"
-- Response snapshots, one row per (store, request)
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_name TEXT NOT NULL,
    request_key TEXT NOT NULL,
    request_description TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, request_key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_name ON cache_entries(cache_name);

-- The generation last activated, restored on restart
CREATE TABLE IF NOT EXISTS active_generation (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version TEXT NOT NULL,
    static_cache TEXT NOT NULL,
    dynamic_cache TEXT NOT NULL,
    activated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Deferred mutating actions, replayed in insertion order
CREATE TABLE IF NOT EXISTS pending_actions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    queued_at TEXT NOT NULL DEFAULT (datetime('now')),
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT
);
"#;
