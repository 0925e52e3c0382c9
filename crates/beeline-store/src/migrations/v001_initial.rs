//! v001 -- Initial schema creation.
//!
//! Creates the seven core tables: `users`, `auth_accounts`, `contacts`,
//! `contact_requests`, `messages`, `invites`, and `notifications`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (public profile documents)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    uid          TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    email        TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    username     TEXT UNIQUE,                 -- lowercase, claimed after registration
    photo_url    TEXT,
    created_at   TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Auth accounts (the identity provider's own records)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS auth_accounts (
    uid           TEXT PRIMARY KEY NOT NULL,  -- matches users.uid
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,              -- Argon2id PHC string
    created_at    TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Contact requests
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contact_requests (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    from_uid   TEXT NOT NULL,
    to_uid     TEXT NOT NULL,
    pair_key   TEXT NOT NULL,                 -- sorted uid pair, same scheme as chat ids
    status     TEXT NOT NULL,                 -- pending | accepted | rejected
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- At most one live (pending or accepted) request per pair, in either
-- direction. Rejected requests stay behind as history and do not block
-- a later retry.
CREATE UNIQUE INDEX IF NOT EXISTS idx_requests_live_pair
    ON contact_requests(pair_key)
    WHERE status IN ('pending', 'accepted');

CREATE INDEX IF NOT EXISTS idx_requests_to_status
    ON contact_requests(to_uid, status);

CREATE INDEX IF NOT EXISTS idx_requests_from
    ON contact_requests(from_uid);

-- ----------------------------------------------------------------
-- Contacts (one directional edge per row; a mutual friendship is two rows)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    user_id      TEXT NOT NULL,               -- owner of this edge
    contact_id   TEXT NOT NULL,               -- the other party
    display_name TEXT NOT NULL,               -- denormalized snapshot
    photo_url    TEXT,
    chat_id      TEXT NOT NULL,
    last_chat_at TEXT,
    last_message TEXT,
    created_at   TEXT NOT NULL,

    UNIQUE (user_id, contact_id)
);

CREATE INDEX IF NOT EXISTS idx_contacts_user
    ON contacts(user_id, last_chat_at DESC);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id            TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    chat_id       TEXT NOT NULL,              -- sorted participant pair
    sender_uid    TEXT NOT NULL,
    recipient_uid TEXT NOT NULL,
    text          TEXT NOT NULL,
    status        TEXT NOT NULL,              -- sent | read
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts
    ON messages(chat_id, created_at ASC, id ASC);

-- ----------------------------------------------------------------
-- Invites
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS invites (
    id            TEXT PRIMARY KEY NOT NULL,  -- random url-safe token
    created_by    TEXT NOT NULL,
    creator_name  TEXT NOT NULL,
    creator_photo TEXT,
    status        TEXT NOT NULL,              -- pending | accepted
    created_at    TEXT NOT NULL,
    expires_at    TEXT NOT NULL,
    accepted_at   TEXT,
    accepted_by   TEXT
);

-- ----------------------------------------------------------------
-- Notifications
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS notifications (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    user_id    TEXT NOT NULL,                 -- recipient
    kind       TEXT NOT NULL,                 -- new-request | request-accepted
    actor_uid  TEXT NOT NULL,
    actor_name TEXT NOT NULL,
    is_read    INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_user
    ON notifications(user_id, is_read, created_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
