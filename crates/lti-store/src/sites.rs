//! CRUD operations for [`Site`] records.

use rusqlite::params;
use uuid::Uuid;

use lti_shared::Site;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{time_at, uuid_at};

impl Database {
    /// Insert a new site.
    pub fn create_site(&self, site: &Site) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sites (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![site.id.to_string(), site.name, site.created_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Fetch a single site by UUID.
    pub fn get_site(&self, id: Uuid) -> Result<Site> {
        self.conn()
            .query_row(
                "SELECT id, name, created_at FROM sites WHERE id = ?1",
                params![id.to_string()],
                row_to_site,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all sites ordered by name.
    pub fn list_sites(&self) -> Result<Vec<Site>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, name, created_at FROM sites ORDER BY name ASC")?;
        let rows = stmt.query_map([], row_to_site)?;

        let mut sites = Vec::new();
        for row in rows {
            sites.push(row?);
        }
        Ok(sites)
    }
}

fn row_to_site(row: &rusqlite::Row<'_>) -> rusqlite::Result<Site> {
    Ok(Site {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        created_at: time_at(row, 2)?,
    })
}
