//! # lti-store
//!
//! SQLite storage for registered platforms and the identities provisioned
//! from launches.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection` with typed CRUD helpers, and [`SqliteDirectory`],
//! which adapts a shared handle to the `Directory` and `PlatformRegistry`
//! traits used by the launch path.

pub mod database;
pub mod directory;
pub mod login_sessions;
pub mod migrations;
pub mod periods;
pub mod platforms;
pub mod sites;
pub mod users;

mod error;
mod rows;

pub use database::Database;
pub use directory::SqliteDirectory;
pub use error::StoreError;
