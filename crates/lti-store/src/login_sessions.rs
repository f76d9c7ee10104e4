//! Login session audit records.

use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use lti_shared::LoginSession;

use crate::database::Database;
use crate::error::Result;
use crate::rows::{opt_time_at, time_at, uuid_at};

impl Database {
    /// Open a new login session for `user_id`.
    pub fn open_login_session(&self, user_id: Uuid) -> Result<LoginSession> {
        let session = LoginSession {
            id: Uuid::new_v4(),
            user_id,
            started_at: Utc::now(),
            ended_at: None,
        };
        self.conn().execute(
            "INSERT INTO login_sessions (id, user_id, started_at) VALUES (?1, ?2, ?3)",
            params![
                session.id.to_string(),
                user_id.to_string(),
                session.started_at.to_rfc3339()
            ],
        )?;
        Ok(session)
    }

    /// Mark a login session as ended. Returns `true` if it was still open.
    pub fn close_login_session(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE login_sessions SET ended_at = ?2 WHERE id = ?1 AND ended_at IS NULL",
            params![id.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// All login sessions of a user, oldest first.
    pub fn list_login_sessions(&self, user_id: Uuid) -> Result<Vec<LoginSession>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, started_at, ended_at
             FROM login_sessions
             WHERE user_id = ?1
             ORDER BY started_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| {
            Ok(LoginSession {
                id: uuid_at(row, 0)?,
                user_id: uuid_at(row, 1)?,
                started_at: time_at(row, 2)?,
                ended_at: opt_time_at(row, 3)?,
            })
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }
}
