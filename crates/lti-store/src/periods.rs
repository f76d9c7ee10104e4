//! CRUD operations for [`Period`] records and period membership.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use lti_shared::Period;

use crate::database::Database;
use crate::error::Result;
use crate::rows::{time_at, uuid_at};

impl Database {
    /// Insert a period, or update its name if the id already exists.
    pub fn upsert_period(&self, period: &Period) -> Result<()> {
        self.conn().execute(
            "INSERT INTO periods (id, site_id, lti_id, name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![
                period.id.to_string(),
                period.site_id.to_string(),
                period.lti_id,
                period.name,
                period.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up a period by its external id within a site.
    pub fn get_period_by_lti_id(&self, site_id: Uuid, lti_id: &str) -> Result<Option<Period>> {
        let period = self
            .conn()
            .query_row(
                "SELECT id, site_id, lti_id, name, created_at
                 FROM periods
                 WHERE site_id = ?1 AND lti_id = ?2",
                params![site_id.to_string(), lti_id],
                row_to_period,
            )
            .optional()?;
        Ok(period)
    }

    /// Number of periods in a site.
    pub fn count_periods(&self, site_id: Uuid) -> Result<usize> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM periods WHERE site_id = ?1",
            params![site_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Add a user to a period. Returns `true` if the membership is new.
    pub fn add_period_member(&self, user_id: Uuid, period_id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO period_members (user_id, period_id) VALUES (?1, ?2)",
            params![user_id.to_string(), period_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Periods a user belongs to, ordered by name.
    pub fn list_periods_for_user(&self, user_id: Uuid) -> Result<Vec<Period>> {
        let mut stmt = self.conn().prepare(
            "SELECT p.id, p.site_id, p.lti_id, p.name, p.created_at
             FROM periods p
             JOIN period_members m ON m.period_id = p.id
             WHERE m.user_id = ?1
             ORDER BY p.name ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_period)?;

        let mut periods = Vec::new();
        for row in rows {
            periods.push(row?);
        }
        Ok(periods)
    }
}

fn row_to_period(row: &rusqlite::Row<'_>) -> rusqlite::Result<Period> {
    Ok(Period {
        id: uuid_at(row, 0)?,
        site_id: uuid_at(row, 1)?,
        lti_id: row.get(2)?,
        name: row.get(3)?,
        created_at: time_at(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lti_shared::{Site, User};

    fn db_with_site() -> (Database, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let site = Site {
            id: Uuid::new_v4(),
            name: "Main".into(),
            created_at: Utc::now(),
        };
        db.create_site(&site).unwrap();
        (db, site.id)
    }

    #[test]
    fn test_upsert_updates_name_only() {
        let (db, site_id) = db_with_site();
        let mut period = Period::new(site_id, "ctx1");
        period.name = "Algebra".into();
        db.upsert_period(&period).unwrap();

        period.name = "Algebra II".into();
        db.upsert_period(&period).unwrap();

        let found = db.get_period_by_lti_id(site_id, "ctx1").unwrap().unwrap();
        assert_eq!(found.id, period.id);
        assert_eq!(found.name, "Algebra II");
        assert_eq!(db.count_periods(site_id).unwrap(), 1);
    }

    #[test]
    fn test_duplicate_lti_id_rejected() {
        let (db, site_id) = db_with_site();
        db.upsert_period(&Period::new(site_id, "ctx1")).unwrap();
        assert!(db.upsert_period(&Period::new(site_id, "ctx1")).is_err());
    }

    #[test]
    fn test_membership_is_idempotent() {
        let (db, site_id) = db_with_site();
        let period = Period::new(site_id, "ctx1");
        db.upsert_period(&period).unwrap();
        let user = User::new(site_id, "u1");
        db.upsert_user(&user).unwrap();

        assert!(db.add_period_member(user.id, period.id).unwrap());
        assert!(!db.add_period_member(user.id, period.id).unwrap());

        let periods = db.list_periods_for_user(user.id).unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].lti_id, "ctx1");
    }
}
