//! SQL schema for the MentorLink SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS profiles (
    user_id      TEXT PRIMARY KEY,
    display_name TEXT NOT NULL DEFAULT '',
    avatar_url   TEXT NOT NULL DEFAULT '',
    role         TEXT CHECK (role IN ('mentor', 'mentee')),
    field        TEXT NOT NULL DEFAULT '',
    bio          TEXT NOT NULL DEFAULT '',
    skills       TEXT NOT NULL DEFAULT '[]',   -- JSON array of strings
    email        TEXT NOT NULL DEFAULT '',
    phone        TEXT NOT NULL DEFAULT '',
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

-- One row per unordered pair: participant_lo < participant_hi, and the pair
-- is unique. Concurrent creators race on this constraint, not on a read.
CREATE TABLE IF NOT EXISTS chats (
    chat_id           TEXT PRIMARY KEY,
    participant_lo    TEXT NOT NULL,
    participant_hi    TEXT NOT NULL,
    participants_meta TEXT NOT NULL DEFAULT '{}',   -- JSON object keyed by user id
    last_message      TEXT NOT NULL DEFAULT '',
    last_updated      TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    UNIQUE (participant_lo, participant_hi),
    CHECK  (participant_lo < participant_hi)
);

CREATE TABLE IF NOT EXISTS requests (
    request_id        TEXT PRIMARY KEY,
    mentee_id         TEXT NOT NULL,
    mentor_id         TEXT NOT NULL,
    message           TEXT NOT NULL DEFAULT '',
    status            TEXT NOT NULL DEFAULT 'pending'
                      CHECK (status IN ('pending', 'accepted', 'declined')),
    created_at        TEXT NOT NULL,
    decided_at        TEXT,
    chat_id           TEXT REFERENCES chats(chat_id),
    mentee_name       TEXT NOT NULL DEFAULT '',
    mentee_avatar_url TEXT NOT NULL DEFAULT '',
    CHECK (mentee_id != mentor_id),
    CHECK (chat_id IS NULL OR status = 'accepted')
);

-- Messages are append-only.
CREATE TABLE IF NOT EXISTS messages (
    message_id TEXT PRIMARY KEY,
    chat_id    TEXT NOT NULL REFERENCES chats(chat_id),
    sender_id  TEXT NOT NULL,
    text       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS profiles_role_idx     ON profiles(role, field);
CREATE INDEX IF NOT EXISTS requests_mentor_idx   ON requests(mentor_id, status);
CREATE INDEX IF NOT EXISTS requests_mentee_idx   ON requests(mentee_id);
CREATE INDEX IF NOT EXISTS chats_hi_idx          ON chats(participant_hi);
CREATE INDEX IF NOT EXISTS messages_chat_idx     ON messages(chat_id, created_at);

PRAGMA user_version = 1;
";
