//! Launch orchestration.
//!
//! Turns a validated launch into local state: the context and user are
//! provisioned exactly once per external id, the session is bound to the
//! user, and the launch is routed by message type. Deep-linking responses
//! are assembled here too; the caller signs them.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use lti_shared::constants::{
    CLAIM_DEPLOYMENT_ID, CLAIM_DL_CONTENT_ITEMS, CLAIM_DL_DATA, CLAIM_MESSAGE_TYPE, CLAIM_VERSION,
    DEEP_LINK_RESPONSE_TTL_SECS, DEEP_LINK_SCORE_MAXIMUM, LTI_VERSION, MSG_DEEP_LINKING,
    MSG_DEEP_LINKING_RESPONSE, MSG_RESOURCE_LINK,
};
use lti_shared::roles::map_roles;
use lti_shared::{
    Directory, KeyedLock, LaunchClaims, LaunchSession, LtiError, PendingDeepLink,
    PendingResource, Period, Platform, Result, SessionIdentity, User,
};

use crate::resolver::ResourceResolver;

/// Where to send the browser after a successful launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// Resource launch: the application page for the resource.
    Redirect(String),
    /// Deep-linking request: the resource selection UI.
    SelectResources(String),
}

impl LaunchOutcome {
    pub fn url(&self) -> &str {
        match self {
            LaunchOutcome::Redirect(url) | LaunchOutcome::SelectResources(url) => url,
        }
    }
}

/// A resource picked in the selection UI.
#[derive(Debug, Clone, Deserialize)]
pub struct DeepLinkResource {
    pub title: String,
    #[serde(default)]
    pub custom: Map<String, Value>,
}

pub struct LaunchOrchestrator {
    directory: Arc<dyn Directory>,
    resolver: Arc<dyn ResourceResolver>,
    locks: KeyedLock,
    launch_url: String,
}

impl LaunchOrchestrator {
    /// `launch_url` is the tool endpoint platforms launch deep-linked
    /// resources at.
    pub fn new(
        directory: Arc<dyn Directory>,
        resolver: Arc<dyn ResourceResolver>,
        launch_url: String,
    ) -> Self {
        Self {
            directory,
            resolver,
            locks: KeyedLock::new(),
            launch_url,
        }
    }

    pub async fn handle_launch(
        &self,
        session: &mut LaunchSession,
        claims: &LaunchClaims,
        platform: &Platform,
    ) -> Result<LaunchOutcome> {
        match claims.message_type.as_str() {
            MSG_RESOURCE_LINK => {
                self.provision(session, claims, platform).await?;

                session.pending_resource =
                    claims.line_item_url().map(|line_item_url| PendingResource {
                        platform: platform.clone(),
                        line_item_url: line_item_url.to_string(),
                        subject: claims.sub.clone(),
                    });

                let custom = claims.custom.clone().unwrap_or_default();
                Ok(LaunchOutcome::Redirect(self.resolver.resource_url(&custom)?))
            }
            MSG_DEEP_LINKING => {
                let settings = claims.deep_linking_settings.as_ref().ok_or_else(|| {
                    LtiError::Malformed("deep-linking request without settings".into())
                })?;

                self.provision(session, claims, platform).await?;

                session.pending_deep_link = Some(PendingDeepLink {
                    issuer: claims.iss.clone(),
                    audience: claims
                        .client_id()
                        .unwrap_or(&platform.client_id)
                        .to_string(),
                    deployment_id: claims
                        .deployment_id
                        .clone()
                        .unwrap_or_else(|| platform.deployment_id.clone()),
                    return_url: settings.deep_link_return_url.clone(),
                    data: settings.data.clone(),
                });

                Ok(LaunchOutcome::SelectResources(self.resolver.selection_url()))
            }
            other => Err(LtiError::UnsupportedMessageType(other.to_string())),
        }
    }

    /// Build the unsigned deep-linking response for the session's pending
    /// request. Returns the platform return URL with the payload.
    pub fn build_deep_linking_response(
        &self,
        session: &mut LaunchSession,
        resources: &[DeepLinkResource],
    ) -> Result<(String, Value)> {
        let pending = session
            .pending_deep_link
            .take()
            .ok_or(LtiError::NoPendingState("deep-linking request"))?;

        let content_items: Vec<Value> = resources
            .iter()
            .map(|resource| {
                json!({
                    "type": "ltiResourceLink",
                    "title": resource.title,
                    "url": self.launch_url,
                    "custom": resource.custom,
                    "lineItem": {
                        "scoreMaximum": DEEP_LINK_SCORE_MAXIMUM,
                        "label": resource.title,
                    },
                })
            })
            .collect();

        let iat = Utc::now().timestamp();
        let mut payload = json!({
            "iss": pending.audience,
            "aud": pending.issuer,
            "iat": iat,
            "exp": iat + DEEP_LINK_RESPONSE_TTL_SECS,
            "nonce": Uuid::new_v4().simple().to_string(),
            CLAIM_DEPLOYMENT_ID: pending.deployment_id,
            CLAIM_MESSAGE_TYPE: MSG_DEEP_LINKING_RESPONSE,
            CLAIM_VERSION: LTI_VERSION,
            CLAIM_DL_CONTENT_ITEMS: content_items,
        });
        if let Some(data) = pending.data {
            payload[CLAIM_DL_DATA] = json!(data);
        }

        debug!(items = resources.len(), return_url = %pending.return_url, "Deep-linking response built");
        Ok((pending.return_url, payload))
    }

    async fn provision(
        &self,
        session: &mut LaunchSession,
        claims: &LaunchClaims,
        platform: &Platform,
    ) -> Result<()> {
        let context = claims.context()?;
        let site_id = platform.site_id;

        let period = self
            .locks
            .run_exclusively(&format!("period:{site_id}:{}", context.id), || async {
                let mut period = match self.directory.find_period(site_id, &context.id)? {
                    Some(period) => period,
                    None => {
                        info!(site = %site_id, context = %context.id, "Provisioning new period");
                        let mut period = Period::new(site_id, &context.id);
                        period.name = context.id.clone();
                        period
                    }
                };
                if let Some(title) = &context.title {
                    period.name = title.clone();
                }
                self.directory.save_period(&period)?;
                Ok::<_, LtiError>(period)
            })
            .await?;

        let user = self
            .locks
            .run_exclusively(&format!("user:{site_id}:{}", claims.sub), || async {
                let mut user = match self.directory.find_user(site_id, &claims.sub)? {
                    Some(user) => user,
                    None => {
                        info!(site = %site_id, user = %claims.sub, "Provisioning new user");
                        User::new(site_id, &claims.sub)
                    }
                };
                user.first_name = claims.given_name.clone().unwrap_or_default();
                user.last_name = claims.family_name.clone().unwrap_or_default();
                user.role = map_roles(&claims.roles);
                self.directory.save_user(&user)?;

                if self.directory.add_member(user.id, period.id)? {
                    debug!(user = %user.id, period = %period.id, "Added period member");
                }
                Ok::<_, LtiError>(user)
            })
            .await?;

        self.bind(session, &user, &period)
    }

    fn bind(&self, session: &mut LaunchSession, user: &User, period: &Period) -> Result<()> {
        if !session.is_signed_in_as(user.site_id, &user.lti_id) {
            if let Some(previous) = session.identity.take() {
                self.directory.close_login_session(previous.login_session_id)?;
                info!(session = %session.id, user = %previous.user_id, "Signed out previous user");
            }

            let login_session_id = self.directory.open_login_session(user.id)?;
            session.identity = Some(SessionIdentity {
                user_id: user.id,
                site_id: user.site_id,
                lti_id: user.lti_id.clone(),
                login_session_id,
            });
            info!(session = %session.id, user = %user.id, role = user.role.as_str(), "Signed in");
        }

        session.current_period = Some(period.id);
        session.current_site = Some(period.site_id);
        Ok(())
    }
}
