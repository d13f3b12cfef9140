//! SQL schema for the forum SQLite gateway.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per record: `collection/key` in the document namespace.
-- Collections exist only as long as they have at least one record.
CREATE TABLE IF NOT EXISTS documents (
    collection  TEXT NOT NULL,
    key         TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    PRIMARY KEY (collection, key)
);

CREATE TABLE IF NOT EXISTS identities (
    uid           TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,   -- normalised: trimmed, lowercase
    password_hash TEXT NOT NULL,          -- argon2 PHC string
    created_at    TEXT NOT NULL           -- RFC 3339 UTC
);

-- The signed-in identity, if any. At most one row.
CREATE TABLE IF NOT EXISTS session (
    slot       INTEGER PRIMARY KEY CHECK (slot = 1),
    uid        TEXT NOT NULL REFERENCES identities(uid),
    started_at TEXT NOT NULL
);

PRAGMA user_version = 1;
";
