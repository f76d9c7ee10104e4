//! Registration and lookup of [`Platform`] records.

use rusqlite::{params, OptionalExtension};

use lti_shared::Platform;

use crate::database::Database;
use crate::error::Result;
use crate::rows::uuid_at;

const PLATFORM_COLUMNS: &str = "id, issuer, client_id, public_jwks_url, oauth2_token_url, \
     auth_login_url, deployment_id, site_id";

impl Database {
    /// Register a platform. Fails if `(issuer, client_id)` already exists.
    pub fn register_platform(&self, platform: &Platform) -> Result<()> {
        self.conn().execute(
            "INSERT INTO platforms (id, issuer, client_id, public_jwks_url, oauth2_token_url,
                                    auth_login_url, deployment_id, site_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                platform.id.to_string(),
                platform.issuer,
                platform.client_id,
                platform.public_jwks_url,
                platform.oauth2_token_url,
                platform.auth_login_url,
                platform.deployment_id,
                platform.site_id.to_string(),
            ],
        )?;
        tracing::info!(issuer = %platform.issuer, client_id = %platform.client_id, "platform registered");
        Ok(())
    }

    /// Look up a platform by its `(issuer, client_id)` pair.
    pub fn get_platform(&self, issuer: &str, client_id: &str) -> Result<Option<Platform>> {
        let sql = format!("SELECT {PLATFORM_COLUMNS} FROM platforms WHERE issuer = ?1 AND client_id = ?2");
        let platform = self
            .conn()
            .query_row(&sql, params![issuer, client_id], row_to_platform)
            .optional()?;
        Ok(platform)
    }

    /// Rotate the JWKS URL of a platform. Returns `true` if a row changed.
    pub fn update_platform_jwks_url(
        &self,
        issuer: &str,
        client_id: &str,
        jwks_url: &str,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE platforms SET public_jwks_url = ?3 WHERE issuer = ?1 AND client_id = ?2",
            params![issuer, client_id, jwks_url],
        )?;
        Ok(affected > 0)
    }

    /// List all platforms ordered by issuer.
    pub fn list_platforms(&self) -> Result<Vec<Platform>> {
        let sql = format!("SELECT {PLATFORM_COLUMNS} FROM platforms ORDER BY issuer, client_id");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], row_to_platform)?;

        let mut platforms = Vec::new();
        for row in rows {
            platforms.push(row?);
        }
        Ok(platforms)
    }
}

fn row_to_platform(row: &rusqlite::Row<'_>) -> rusqlite::Result<Platform> {
    Ok(Platform {
        id: uuid_at(row, 0)?,
        issuer: row.get(1)?,
        client_id: row.get(2)?,
        public_jwks_url: row.get(3)?,
        oauth2_token_url: row.get(4)?,
        auth_login_url: row.get(5)?,
        deployment_id: row.get(6)?,
        site_id: uuid_at(row, 7)?,
    })
}
