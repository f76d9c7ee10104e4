//! v001 -- Initial schema creation.
//!
//! Creates `sites`, `platforms`, `periods`, `users`, `period_members` and
//! `login_sessions`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Sites (local tenants)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sites (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL                  -- RFC-3339
);

-- ----------------------------------------------------------------
-- Platforms (registered LMS instances)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS platforms (
    id               TEXT PRIMARY KEY NOT NULL,
    issuer           TEXT NOT NULL,
    client_id        TEXT NOT NULL,
    public_jwks_url  TEXT NOT NULL,
    oauth2_token_url TEXT NOT NULL,
    auth_login_url   TEXT NOT NULL,
    deployment_id    TEXT NOT NULL,
    site_id          TEXT NOT NULL,

    FOREIGN KEY (site_id) REFERENCES sites(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_platforms_issuer_client
    ON platforms(issuer, client_id);

-- ----------------------------------------------------------------
-- Periods (LTI contexts)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS periods (
    id         TEXT PRIMARY KEY NOT NULL,
    site_id    TEXT NOT NULL,
    lti_id     TEXT NOT NULL,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (site_id) REFERENCES sites(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_periods_site_lti ON periods(site_id, lti_id);

-- ----------------------------------------------------------------
-- Users (LTI identities)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,
    site_id       TEXT NOT NULL,
    lti_id        TEXT NOT NULL,
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,              -- hex BLAKE3 of a random secret
    first_name    TEXT NOT NULL,
    last_name     TEXT NOT NULL,
    role          TEXT NOT NULL,              -- STUDENT / TEACHER / GUEST
    created_at    TEXT NOT NULL,

    FOREIGN KEY (site_id) REFERENCES sites(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_users_site_lti ON users(site_id, lti_id);

-- ----------------------------------------------------------------
-- Period membership
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS period_members (
    user_id   TEXT NOT NULL,
    period_id TEXT NOT NULL,

    PRIMARY KEY (user_id, period_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (period_id) REFERENCES periods(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Login sessions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS login_sessions (
    id         TEXT PRIMARY KEY NOT NULL,
    user_id    TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at   TEXT,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_login_sessions_user ON login_sessions(user_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
