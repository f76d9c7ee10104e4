//! OIDC third-party initiated login.
//!
//! The platform first sends the browser to the tool's login endpoint. The
//! tool remembers a fresh `state` and `nonce` in the session and redirects to
//! the platform's authorization endpoint, which answers with the id token
//! posted to the launch endpoint.

use rand::RngCore;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use lti_shared::{LaunchSession, LtiError, PendingLogin, Platform, Result};

/// Login initiation parameters sent by the platform (query or form).
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub iss: String,
    pub login_hint: String,
    pub target_link_uri: String,
    #[serde(default)]
    pub lti_message_hint: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

fn random_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Record a pending login in `session` and return the platform
/// authorization URL to redirect to.
pub fn begin_login(
    session: &mut LaunchSession,
    platform: &Platform,
    request: &LoginRequest,
    redirect_uri: &str,
) -> Result<String> {
    let mut url = Url::parse(&platform.auth_login_url)
        .map_err(|e| LtiError::Malformed(format!("bad platform auth url: {e}")))?;

    let pending = PendingLogin {
        state: random_token(),
        nonce: random_token(),
    };

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("scope", "openid")
            .append_pair("response_type", "id_token")
            .append_pair("response_mode", "form_post")
            .append_pair("prompt", "none")
            .append_pair("client_id", &platform.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("login_hint", &request.login_hint);
        if let Some(hint) = &request.lti_message_hint {
            query.append_pair("lti_message_hint", hint);
        }
        query
            .append_pair("state", &pending.state)
            .append_pair("nonce", &pending.nonce);
    }

    debug!(
        session = %session.id,
        platform = %platform.key(),
        target = %request.target_link_uri,
        "Login initiated"
    );
    session.pending_login = Some(pending);
    Ok(url.to_string())
}

/// Check the launch's `state` and `nonce` against the session's pending
/// login, consuming it.
///
/// A launch with no pending login is rejected unless `allow_unsolicited` is
/// set, so an id token replayed without the browser that started the login
/// does not sign anyone in.
pub fn verify_login(
    session: &mut LaunchSession,
    state: Option<&str>,
    nonce: Option<&str>,
    allow_unsolicited: bool,
) -> Result<()> {
    let Some(pending) = session.pending_login.take() else {
        if allow_unsolicited {
            warn!(session = %session.id, "Launch without login initiation; state not checked");
            return Ok(());
        }
        warn!(session = %session.id, "Launch without login initiation rejected");
        return Err(LtiError::StateMismatch);
    };

    if state == Some(pending.state.as_str()) && nonce == Some(pending.nonce.as_str()) {
        Ok(())
    } else {
        Err(LtiError::StateMismatch)
    }
}
