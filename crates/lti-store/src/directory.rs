//! Adapter from a shared [`Database`] to the launch-path boundary traits.

use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use lti_shared::{Directory, Period, Platform, PlatformRegistry, User};

use crate::database::Database;
use crate::error::StoreError;

/// A [`Database`] behind a mutex, shareable across request handlers.
#[derive(Clone)]
pub struct SqliteDirectory {
    db: Arc<Mutex<Database>>,
}

impl SqliteDirectory {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` with exclusive access to the database.
    pub fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> crate::error::Result<T>,
    ) -> crate::error::Result<T> {
        let guard = self.lock()?;
        f(&*guard)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>, StoreError> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl PlatformRegistry for SqliteDirectory {
    fn find_platform(&self, issuer: &str, client_id: &str) -> lti_shared::Result<Option<Platform>> {
        Ok(self.with_db(|db| db.get_platform(issuer, client_id))?)
    }
}

impl Directory for SqliteDirectory {
    fn find_period(&self, site_id: Uuid, lti_id: &str) -> lti_shared::Result<Option<Period>> {
        Ok(self.with_db(|db| db.get_period_by_lti_id(site_id, lti_id))?)
    }

    fn save_period(&self, period: &Period) -> lti_shared::Result<()> {
        Ok(self.with_db(|db| db.upsert_period(period))?)
    }

    fn find_user(&self, site_id: Uuid, lti_id: &str) -> lti_shared::Result<Option<User>> {
        Ok(self.with_db(|db| db.get_user_by_lti_id(site_id, lti_id))?)
    }

    fn save_user(&self, user: &User) -> lti_shared::Result<()> {
        Ok(self.with_db(|db| db.upsert_user(user))?)
    }

    fn add_member(&self, user_id: Uuid, period_id: Uuid) -> lti_shared::Result<bool> {
        Ok(self.with_db(|db| db.add_period_member(user_id, period_id))?)
    }

    fn open_login_session(&self, user_id: Uuid) -> lti_shared::Result<Uuid> {
        Ok(self.with_db(|db| db.open_login_session(user_id))?.id)
    }

    fn close_login_session(&self, id: Uuid) -> lti_shared::Result<()> {
        self.with_db(|db| db.close_login_session(id))?;
        Ok(())
    }
}
