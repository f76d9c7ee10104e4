//! Per-session launch state.
//!
//! A [`LaunchSession`] is owned by exactly one caller session. The HTTP layer
//! checks it out, passes it `&mut` through the launch and grading code, and
//! stores it back; nothing here is shared across sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;
use uuid::Uuid;

use crate::error::{LtiError, Result};
use crate::models::Platform;

/// The local identity a session is signed in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: Uuid,
    pub site_id: Uuid,
    pub lti_id: String,
    pub login_session_id: Uuid,
}

/// OIDC login state awaiting the platform's launch POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub state: String,
    pub nonce: String,
}

/// State kept between a deep-linking request and the tool's response.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDeepLink {
    pub issuer: String,
    pub audience: String,
    pub deployment_id: String,
    pub return_url: String,
    pub data: Option<String>,
}

/// Line item captured from a resource launch, consumed by score submission.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingResource {
    pub platform: Platform,
    pub line_item_url: String,
    /// Platform-side user id (`sub`) the score is reported for.
    pub subject: String,
}

#[derive(Debug, Default)]
pub struct LaunchSession {
    pub id: Uuid,
    pub identity: Option<SessionIdentity>,
    pub current_period: Option<Uuid>,
    pub current_site: Option<Uuid>,
    pub pending_login: Option<PendingLogin>,
    pub pending_deep_link: Option<PendingDeepLink>,
    pub pending_resource: Option<PendingResource>,
}

impl LaunchSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            ..Self::default()
        }
    }

    pub fn is_signed_in_as(&self, site_id: Uuid, lti_id: &str) -> bool {
        self.identity
            .as_ref()
            .is_some_and(|i| i.site_id == site_id && i.lti_id == lti_id)
    }

    /// Take the pending line item and turn it into a delivery request.
    ///
    /// Fails with [`LtiError::NoPendingState`] when the last resource launch
    /// carried no gradable line item.
    pub fn take_score_request(
        &mut self,
        submission: &ScoreSubmission,
    ) -> Result<ScoreDeliveryRequest> {
        let pending = self
            .pending_resource
            .take()
            .ok_or(LtiError::NoPendingState("line item"))?;

        Ok(ScoreDeliveryRequest {
            url: scores_url(&pending.line_item_url)?,
            payload: submission.to_payload(&pending.subject, Utc::now()),
            platform: pending.platform,
        })
    }
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActivityProgress {
    Initialized,
    Started,
    InProgress,
    Submitted,
    #[default]
    Completed,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum GradingProgress {
    #[default]
    FullyGraded,
    Pending,
    PendingManual,
    Failed,
    NotReady,
}

/// A score reported by application code for the current session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreSubmission {
    pub score_given: f64,
    pub score_maximum: f64,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub activity_progress: ActivityProgress,
    #[serde(default)]
    pub grading_progress: GradingProgress,
}

impl ScoreSubmission {
    /// AGS score JSON for `user_id`.
    pub fn to_payload(&self, user_id: &str, timestamp: DateTime<Utc>) -> Value {
        let mut payload = json!({
            "userId": user_id,
            "scoreGiven": self.score_given,
            "scoreMaximum": self.score_maximum,
            "timestamp": timestamp.to_rfc3339(),
            "activityProgress": self.activity_progress,
            "gradingProgress": self.grading_progress,
        });
        if let Some(comment) = &self.comment {
            payload["comment"] = json!(comment);
        }
        payload
    }
}

/// One score to deliver. Consumed exactly once by the delivery worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreDeliveryRequest {
    pub platform: Platform,
    pub url: String,
    pub payload: Value,
}

/// The AGS scores endpoint for a line item: `{lineitem}/scores`, keeping
/// any query string.
pub fn scores_url(line_item_url: &str) -> Result<String> {
    let mut url = Url::parse(line_item_url)
        .map_err(|e| LtiError::Malformed(format!("bad line item url: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| LtiError::Malformed(format!("bad line item url: {line_item_url}")))?
        .pop_if_empty()
        .push("scores");
    Ok(url.to_string())
}
