//! CRUD operations for [`User`] records.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use lti_shared::{Role, User};

use crate::database::Database;
use crate::error::Result;
use crate::rows::{time_at, uuid_at};

impl Database {
    /// Insert a user, or refresh the LMS-owned fields if the id exists.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, site_id, lti_id, username, password_hash,
                                first_name, last_name, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                 first_name = excluded.first_name,
                 last_name  = excluded.last_name,
                 role       = excluded.role",
            params![
                user.id.to_string(),
                user.site_id.to_string(),
                user.lti_id,
                user.username,
                user.password_hash,
                user.first_name,
                user.last_name,
                user.role.as_str(),
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up a user by its external id within a site.
    pub fn get_user_by_lti_id(&self, site_id: Uuid, lti_id: &str) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                "SELECT id, site_id, lti_id, username, password_hash,
                        first_name, last_name, role, created_at
                 FROM users
                 WHERE site_id = ?1 AND lti_id = ?2",
                params![site_id.to_string(), lti_id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Number of users in a site.
    pub fn count_users(&self, site_id: Uuid) -> Result<usize> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE site_id = ?1",
            params![site_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let role_str: String = row.get(7)?;
    let role = Role::parse(&role_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            format!("unknown role {role_str}").into(),
        )
    })?;

    Ok(User {
        id: uuid_at(row, 0)?,
        site_id: uuid_at(row, 1)?,
        lti_id: row.get(2)?,
        username: row.get(3)?,
        password_hash: row.get(4)?,
        first_name: row.get(5)?,
        last_name: row.get(6)?,
        role,
        created_at: time_at(row, 8)?,
    })
}
