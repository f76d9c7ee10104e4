use thiserror::Error;

/// Errors produced while validating launches, provisioning identities,
/// signing tokens and delivering scores.
#[derive(Error, Debug)]
pub enum LtiError {
    #[error("Unknown platform: issuer={issuer} client_id={client_id}")]
    UnknownPlatform { issuer: String, client_id: String },

    #[error("Key source unavailable: {0}")]
    KeySourceUnavailable(String),

    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Token expired or not yet valid")]
    TokenExpired,

    #[error("Signing disabled: no tool private key configured")]
    SigningDisabled,

    #[error("Signing failed: {0}")]
    SigningFailure(String),

    #[error("Unsupported message type: {0}")]
    UnsupportedMessageType(String),

    #[error("No pending {0} for this session")]
    NoPendingState(&'static str),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Malformed launch: {0}")]
    Malformed(String),

    #[error("Login state or nonce mismatch")]
    StateMismatch,

    #[error("Directory error: {0}")]
    Directory(String),
}

impl LtiError {
    /// Whether the error must be surfaced as an authentication failure of
    /// the current launch.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            LtiError::UnknownPlatform { .. }
                | LtiError::SignatureInvalid(_)
                | LtiError::TokenExpired
                | LtiError::UnsupportedMessageType(_)
                | LtiError::Malformed(_)
                | LtiError::StateMismatch
        )
    }
}

pub type Result<T> = std::result::Result<T, LtiError>;
