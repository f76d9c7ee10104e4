//! # lti-shared
//!
//! Domain types and primitives shared by every LTI crate: the error
//! taxonomy, launch claims, role mapping, per-session launch state, the
//! per-key lock used during provisioning, and RS256 token signing.

pub mod claims;
pub mod constants;
pub mod directory;
pub mod error;
pub mod keyed_lock;
pub mod keys;
pub mod models;
pub mod roles;
pub mod session;
pub mod signer;

pub use claims::LaunchClaims;
pub use directory::{Directory, PlatformRegistry};
pub use error::{LtiError, Result};
pub use keyed_lock::KeyedLock;
pub use models::{LoginSession, Period, Platform, PlatformKey, Role, Site, User};
pub use session::{
    LaunchSession, PendingDeepLink, PendingLogin, PendingResource, ScoreDeliveryRequest,
    ScoreSubmission, SessionIdentity,
};
pub use signer::TokenSigner;
