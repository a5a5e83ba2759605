use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking — no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "-- Migration 1: Reading room core schema

CREATE TABLE users (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL UNIQUE,
    is_admin INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE rooms (
    id TEXT PRIMARY KEY,
    host_id TEXT NOT NULL,
    title TEXT NOT NULL,
    book_ref TEXT,
    status TEXT NOT NULL DEFAULT 'waiting'
        CHECK (status IN ('waiting', 'playing', 'paused', 'finished')),
    capacity INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (host_id) REFERENCES users(id)
);

CREATE INDEX idx_rooms_status ON rooms(status);

-- Participant rows are never deleted: they are the audit record of who was
-- present when a room finished.
CREATE TABLE room_participants (
    id TEXT PRIMARY KEY,
    room_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    connection_status TEXT NOT NULL DEFAULT 'active'
        CHECK (connection_status IN ('active', 'exited', 'disconnected')),
    joined_at TEXT NOT NULL,
    disconnected_at TEXT,
    UNIQUE (room_id, user_id),
    FOREIGN KEY (room_id) REFERENCES rooms(id),
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX idx_participants_room ON room_participants(room_id, connection_status);
CREATE INDEX idx_participants_disconnected
    ON room_participants(connection_status, disconnected_at);

CREATE TABLE room_invitations (
    id TEXT PRIMARY KEY,
    room_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'accepted', 'rejected', 'expired')),
    created_at TEXT NOT NULL,
    responded_at TEXT,
    FOREIGN KEY (room_id) REFERENCES rooms(id),
    FOREIGN KEY (sender_id) REFERENCES users(id),
    FOREIGN KEY (receiver_id) REFERENCES users(id)
);

-- At most one pending invitation per (room, receiver), enforced at the
-- storage layer so two concurrent sends cannot both slip through.
CREATE UNIQUE INDEX idx_invitations_pending
    ON room_invitations(room_id, receiver_id) WHERE status = 'pending';

CREATE INDEX idx_invitations_receiver ON room_invitations(receiver_id, status);

-- AUTOINCREMENT id doubles as the pagination cursor: monotonic, assigned
-- at write time, never reused. Rows are immutable once written.
CREATE TABLE chat_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    room_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    message_type TEXT NOT NULL
        CHECK (message_type IN ('text', 'image', 'system')),
    content TEXT,
    image_ref TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (room_id) REFERENCES rooms(id),
    FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE INDEX idx_messages_room ON chat_messages(room_id, id);

CREATE TABLE bans (
    user_id TEXT PRIMARY KEY,
    reason TEXT NOT NULL DEFAULT '',
    expires_at TEXT,
    created_at TEXT NOT NULL
);
",
    )])
}
