/// Claim names used in launch and deep-linking tokens
pub const CLAIM_MESSAGE_TYPE: &str = "https://purl.imsglobal.org/spec/lti/claim/message_type";
pub const CLAIM_VERSION: &str = "https://purl.imsglobal.org/spec/lti/claim/version";
pub const CLAIM_DEPLOYMENT_ID: &str = "https://purl.imsglobal.org/spec/lti/claim/deployment_id";
pub const CLAIM_CONTEXT: &str = "https://purl.imsglobal.org/spec/lti/claim/context";
pub const CLAIM_ROLES: &str = "https://purl.imsglobal.org/spec/lti/claim/roles";
pub const CLAIM_CUSTOM: &str = "https://purl.imsglobal.org/spec/lti/claim/custom";
pub const CLAIM_AGS_ENDPOINT: &str = "https://purl.imsglobal.org/spec/lti-ags/claim/endpoint";
pub const CLAIM_DL_SETTINGS: &str =
    "https://purl.imsglobal.org/spec/lti-dl/claim/deep_linking_settings";
pub const CLAIM_DL_DATA: &str = "https://purl.imsglobal.org/spec/lti-dl/claim/data";
pub const CLAIM_DL_CONTENT_ITEMS: &str = "https://purl.imsglobal.org/spec/lti-dl/claim/content_items";

/// Message types
pub const MSG_RESOURCE_LINK: &str = "LtiResourceLinkRequest";
pub const MSG_DEEP_LINKING: &str = "LtiDeepLinkingRequest";
pub const MSG_DEEP_LINKING_RESPONSE: &str = "LtiDeepLinkingResponse";

pub const LTI_VERSION: &str = "1.3.0";

/// OAuth2 client-credentials exchange
pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const CLIENT_ASSERTION_TYPE_JWT_BEARER: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
pub const AGS_SCOPE_SCORE: &str = "https://purl.imsglobal.org/spec/lti-ags/scope/score";
pub const SCORE_CONTENT_TYPE: &str = "application/vnd.ims.lis.v1.score+json";

/// Maximum score declared on every deep-linked line item
pub const DEEP_LINK_SCORE_MAXIMUM: f64 = 100.0;

/// Deep-linking response lifetime in seconds (1 hour)
pub const DEEP_LINK_RESPONSE_TTL_SECS: i64 = 3600;

/// Client assertion lifetime in seconds (5 minutes)
pub const CLIENT_ASSERTION_TTL_SECS: i64 = 300;

/// Clock skew tolerated on exp/nbf, in seconds
pub const VALIDATION_LEEWAY_SECS: u64 = 60;

/// RSA modulus size for generated tool keys
pub const RSA_KEY_BITS: usize = 2048;
