//! Domain records owned by the local directory.
//!
//! Every struct derives `Serialize` and `Deserialize` so the admin API can
//! hand them out as JSON without an extra DTO layer.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Site
// ---------------------------------------------------------------------------

/// A local tenant. Every platform maps to exactly one site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Site {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// A registered LMS. `(issuer, client_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Platform {
    pub id: Uuid,
    /// The platform's `iss` value.
    pub issuer: String,
    /// Client id the platform assigned to this tool.
    pub client_id: String,
    /// Where the platform publishes its verification keys.
    pub public_jwks_url: String,
    /// OAuth2 endpoint used for the client-credentials exchange.
    pub oauth2_token_url: String,
    /// OIDC authorization endpoint for third-party initiated login.
    pub auth_login_url: String,
    pub deployment_id: String,
    pub site_id: Uuid,
}

/// Cache key identifying a platform registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlatformKey {
    pub issuer: String,
    pub client_id: String,
}

impl Platform {
    pub fn key(&self) -> PlatformKey {
        PlatformKey {
            issuer: self.issuer.clone(),
            client_id: self.client_id.clone(),
        }
    }
}

impl std::fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.issuer, self.client_id)
    }
}

// ---------------------------------------------------------------------------
// Period (LTI context)
// ---------------------------------------------------------------------------

/// A course context. `(site_id, lti_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Period {
    pub id: Uuid,
    pub site_id: Uuid,
    pub lti_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Period {
    pub fn new(site_id: Uuid, lti_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            site_id,
            lti_id: lti_id.to_string(),
            name: String::new(),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// User (LTI identity)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Student,
    Teacher,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Teacher => "TEACHER",
            Role::Guest => "GUEST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STUDENT" => Some(Role::Student),
            "TEACHER" => Some(Role::Teacher),
            "GUEST" => Some(Role::Guest),
            _ => None,
        }
    }
}

/// An end user provisioned from launches. `(site_id, lti_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub site_id: Uuid,
    pub lti_id: String,
    /// Opaque generated username; LTI users never log in locally.
    pub username: String,
    /// BLAKE3 hash of a random password nobody knows.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build a placeholder user with generated credentials.
    pub fn new(site_id: Uuid, lti_id: &str) -> Self {
        let mut password = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut password);

        Self {
            id: Uuid::new_v4(),
            site_id,
            lti_id: lti_id.to_string(),
            username: format!("lti-{}", Uuid::new_v4().simple()),
            password_hash: blake3::hash(&password).to_hex().to_string(),
            first_name: String::new(),
            last_name: String::new(),
            role: Role::Guest,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Login session
// ---------------------------------------------------------------------------

/// Audit record opened every time a caller is signed in as a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}
