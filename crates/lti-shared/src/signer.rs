//! RS256 signing of outbound tokens (deep-linking responses and OAuth2
//! client assertions).

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::RsaPublicKey;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{LtiError, Result};
use crate::keys;

struct SigningMaterial {
    encoding_key: EncodingKey,
    public_key: RsaPublicKey,
    kid: String,
}

/// Signs JSON payloads with the tool's private key.
///
/// Without a key every call to [`TokenSigner::sign`] fails with
/// [`LtiError::SigningDisabled`].
pub struct TokenSigner {
    material: Option<SigningMaterial>,
}

impl TokenSigner {
    /// Build a signer from an optional PEM private key.
    ///
    /// `kid` overrides the key id advertised in token headers; by default it
    /// is derived from the public key so it stays stable across restarts.
    pub fn new(private_key_pem: Option<&str>, kid: Option<String>) -> Result<Self> {
        let Some(pem) = private_key_pem else {
            warn!("No tool private key configured; token signing is DISABLED");
            return Ok(Self::disabled());
        };

        let private = keys::parse_private_key(pem)?;
        let public_key = private.to_public_key();
        let kid = match kid {
            Some(kid) => kid,
            None => keys::key_id(&public_key)?,
        };

        let der = private
            .to_pkcs1_der()
            .map_err(|e| LtiError::SigningFailure(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_der(der.as_bytes());

        info!(kid = %kid, "Token signing enabled");

        Ok(Self {
            material: Some(SigningMaterial {
                encoding_key,
                public_key,
                kid,
            }),
        })
    }

    pub fn disabled() -> Self {
        Self { material: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.material.is_some()
    }

    pub fn kid(&self) -> Option<&str> {
        self.material.as_ref().map(|m| m.kid.as_str())
    }

    /// Sign `payload` as a compact RS256 JWT.
    pub fn sign<T: Serialize>(&self, payload: &T) -> Result<String> {
        let material = self.material.as_ref().ok_or(LtiError::SigningDisabled)?;

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(material.kid.clone());

        jsonwebtoken::encode(&header, payload, &material.encoding_key)
            .map_err(|e| LtiError::SigningFailure(e.to_string()))
    }

    /// Public key set platforms use to verify our tokens.
    pub fn jwks(&self) -> Value {
        match &self.material {
            Some(m) => keys::jwks_document(&m.public_key, &m.kid),
            None => serde_json::json!({ "keys": [] }),
        }
    }
}
