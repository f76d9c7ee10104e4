//! Typed view of a validated launch token payload.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::constants::CLAIM_CONTEXT;
use crate::error::LtiError;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ContextClaim {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AgsEndpointClaim {
    #[serde(default)]
    pub lineitem: Option<String>,
    #[serde(default)]
    pub scope: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DeepLinkingSettings {
    pub deep_link_return_url: String,
    /// Opaque value the platform expects echoed back.
    #[serde(default)]
    pub data: Option<String>,
}

/// Claims of an inbound launch. Exists for the duration of one request.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LaunchClaims {
    pub iss: String,
    #[serde(deserialize_with = "one_or_many")]
    pub aud: Vec<String>,
    pub sub: String,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,

    #[serde(rename = "https://purl.imsglobal.org/spec/lti/claim/message_type")]
    pub message_type: String,
    #[serde(rename = "https://purl.imsglobal.org/spec/lti/claim/deployment_id", default)]
    pub deployment_id: Option<String>,
    #[serde(rename = "https://purl.imsglobal.org/spec/lti/claim/context", default)]
    pub context: Option<ContextClaim>,
    #[serde(rename = "https://purl.imsglobal.org/spec/lti/claim/roles", default)]
    pub roles: Vec<String>,
    #[serde(rename = "https://purl.imsglobal.org/spec/lti/claim/custom", default)]
    pub custom: Option<Map<String, Value>>,
    #[serde(rename = "https://purl.imsglobal.org/spec/lti-ags/claim/endpoint", default)]
    pub ags_endpoint: Option<AgsEndpointClaim>,
    #[serde(
        rename = "https://purl.imsglobal.org/spec/lti-dl/claim/deep_linking_settings",
        default
    )]
    pub deep_linking_settings: Option<DeepLinkingSettings>,
}

impl LaunchClaims {
    /// The first audience entry, which LTI defines as the tool's client id.
    pub fn client_id(&self) -> Option<&str> {
        self.aud.first().map(String::as_str)
    }

    pub fn line_item_url(&self) -> Option<&str> {
        self.ags_endpoint.as_ref()?.lineitem.as_deref()
    }

    pub fn context(&self) -> Result<&ContextClaim, LtiError> {
        self.context
            .as_ref()
            .ok_or_else(|| LtiError::Malformed(format!("missing {CLAIM_CONTEXT} claim")))
    }
}

impl TryFrom<Value> for LaunchClaims {
    type Error = LtiError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        serde_json::from_value(value).map_err(|e| LtiError::Malformed(e.to_string()))
    }
}

/// Accept `aud` as either a single string or an array.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}
