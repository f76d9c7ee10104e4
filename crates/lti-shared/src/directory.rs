//! Boundary traits for the local user/period/site storage.
//!
//! The launch path only talks to storage through these traits so the
//! orchestrator and validator can be constructed with any backing store.

use uuid::Uuid;

use crate::error::Result;
use crate::models::{Period, Platform, User};

/// Lookup of registered platforms.
pub trait PlatformRegistry: Send + Sync {
    fn find_platform(&self, issuer: &str, client_id: &str) -> Result<Option<Platform>>;
}

/// Persistence for provisioned periods, users and login sessions.
pub trait Directory: Send + Sync {
    fn find_period(&self, site_id: Uuid, lti_id: &str) -> Result<Option<Period>>;

    /// Insert or update by id.
    fn save_period(&self, period: &Period) -> Result<()>;

    fn find_user(&self, site_id: Uuid, lti_id: &str) -> Result<Option<User>>;

    /// Insert or update by id.
    fn save_user(&self, user: &User) -> Result<()>;

    /// Associate a user with a period. Returns `true` if newly added.
    fn add_member(&self, user_id: Uuid, period_id: Uuid) -> Result<bool>;

    /// Open a login session record and return its id.
    fn open_login_session(&self, user_id: Uuid) -> Result<Uuid>;

    fn close_login_session(&self, id: Uuid) -> Result<()>;
}
