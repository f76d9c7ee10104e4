//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the tool can start with zero configuration
//! for local development. Without a private key the tool still validates
//! launches but cannot sign deep-linking responses or deliver scores.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./lti.db`
    pub database_path: PathBuf,

    /// Public base URL of this tool, used to build the OIDC redirect URI and
    /// the launch URL placed in deep-linking content items.
    /// Env: `TOOL_BASE_URL`
    /// Default: `http://localhost:8080`
    pub tool_base_url: String,

    /// PEM private key used to sign outbound tokens.
    /// Env: `TOOL_PRIVATE_KEY` (inline PEM) or `TOOL_PRIVATE_KEY_PATH`
    /// Default: none (signing disabled).
    pub tool_private_key: Option<String>,

    /// Key id advertised in token headers and the published JWKS.
    /// Env: `TOOL_KEY_ID`
    /// Default: derived from the public key.
    pub tool_key_id: Option<String>,

    /// Admin API bearer token. Required to access /admin/* endpoints.
    /// Env: `ADMIN_TOKEN`
    /// Default: empty (admin API disabled).
    pub admin_token: Option<String>,

    /// Application path resource launches land on.
    /// Env: `RESOURCE_PATH`
    /// Default: `/resource`
    pub resource_path: String,

    /// Application path of the deep-linking selection UI.
    /// Env: `DEEP_LINK_UI_PATH`
    /// Default: `/select`
    pub deep_link_ui_path: String,

    /// Sessions idle for longer than this are discarded.
    /// Env: `SESSION_IDLE_SECS`
    /// Default: `7200`
    pub session_idle: Duration,

    /// Accept launches that did not go through `/lti/login` in the same
    /// session. Only meant for local testing against a platform stub.
    /// Env: `ALLOW_UNSOLICITED_LAUNCH` (`true` / `1`)
    /// Default: `false`
    pub allow_unsolicited_launch: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: PathBuf::from("./lti.db"),
            tool_base_url: "http://localhost:8080".to_string(),
            tool_private_key: None,
            tool_key_id: None,
            admin_token: None,
            resource_path: "/resource".to_string(),
            deep_link_ui_path: "/select".to_string(),
            session_idle: Duration::from_secs(7200),
            allow_unsolicited_launch: false,
        }
    }
}

// Keeps the private key and admin token out of logs.
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("tool_base_url", &self.tool_base_url)
            .field("signing_key", &self.tool_private_key.is_some())
            .field("tool_key_id", &self.tool_key_id)
            .field("admin_enabled", &self.admin_token.is_some())
            .field("resource_path", &self.resource_path)
            .field("deep_link_ui_path", &self.deep_link_ui_path)
            .field("session_idle", &self.session_idle)
            .field("allow_unsolicited_launch", &self.allow_unsolicited_launch)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(url) = var("TOOL_BASE_URL") {
            match url::Url::parse(&url) {
                Ok(_) => config.tool_base_url = url.trim_end_matches('/').to_string(),
                Err(e) => {
                    tracing::warn!(value = %url, error = %e, "Invalid TOOL_BASE_URL, using default")
                }
            }
        }

        if let Some(pem) = var("TOOL_PRIVATE_KEY").filter(|pem| !pem.trim().is_empty()) {
            config.tool_private_key = Some(pem);
        } else if let Some(path) = var("TOOL_PRIVATE_KEY_PATH") {
            match std::fs::read_to_string(&path) {
                Ok(pem) => config.tool_private_key = Some(pem),
                Err(e) => tracing::warn!(
                    path = %path,
                    error = %e,
                    "Cannot read TOOL_PRIVATE_KEY_PATH; signing stays disabled"
                ),
            }
        }

        if let Some(kid) = var("TOOL_KEY_ID").filter(|kid| !kid.is_empty()) {
            config.tool_key_id = Some(kid);
        }

        if let Some(token) = var("ADMIN_TOKEN").filter(|token| !token.is_empty()) {
            config.admin_token = Some(token);
        }

        if let Some(path) = var("RESOURCE_PATH") {
            config.resource_path = path;
        }

        if let Some(path) = var("DEEP_LINK_UI_PATH") {
            config.deep_link_ui_path = path;
        }

        if let Some(val) = var("SESSION_IDLE_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.session_idle = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid SESSION_IDLE_SECS, using default"),
            }
        }

        if let Some(val) = var("ALLOW_UNSOLICITED_LAUNCH") {
            match val.to_ascii_lowercase().as_str() {
                "1" | "true" => config.allow_unsolicited_launch = true,
                "0" | "false" => config.allow_unsolicited_launch = false,
                _ => tracing::warn!(value = %val, "Invalid ALLOW_UNSOLICITED_LAUNCH, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    /// Where platforms post id tokens.
    pub fn launch_url(&self) -> String {
        format!("{}/lti/launch", self.tool_base_url)
    }
}
