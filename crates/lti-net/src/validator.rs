//! Verification of platform-issued launch tokens.
//!
//! The validator peeks at the unverified payload to find the issuer and
//! audience, resolves the registered [`Platform`], then verifies the
//! signature against that platform's published key set. Key sets are cached
//! per `(issuer, client_id)` and built at most once concurrently; a failed
//! build is not cached so the next launch retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use lti_shared::constants::VALIDATION_LEEWAY_SECS;
use lti_shared::{KeyedLock, LtiError, Platform, PlatformKey, PlatformRegistry, Result};

use crate::jwks::{RemoteKeySet, DEFAULT_MIN_REFRESH};

pub struct TokenValidator {
    registry: Arc<dyn PlatformRegistry>,
    http: reqwest::Client,
    min_refresh: Duration,
    sources: RwLock<HashMap<PlatformKey, Arc<RemoteKeySet>>>,
    construction: KeyedLock,
}

impl TokenValidator {
    pub fn new(registry: Arc<dyn PlatformRegistry>, http: reqwest::Client) -> Self {
        Self {
            registry,
            http,
            min_refresh: DEFAULT_MIN_REFRESH,
            sources: RwLock::new(HashMap::new()),
            construction: KeyedLock::new(),
        }
    }

    /// Override how often an unknown `kid` may trigger a key set refetch.
    pub fn with_min_refresh(mut self, min_refresh: Duration) -> Self {
        self.min_refresh = min_refresh;
        self
    }

    /// Verify `token` and return its claims with the platform that issued it.
    ///
    /// Errors:
    /// * [`LtiError::Malformed`] if the payload has no readable `iss`/`aud`
    /// * [`LtiError::UnknownPlatform`] if no platform is registered for them
    /// * [`LtiError::KeySourceUnavailable`] if the key set cannot be fetched
    /// * [`LtiError::TokenExpired`] if `exp`/`nbf` fail beyond the leeway
    /// * [`LtiError::SignatureInvalid`] for every other verification failure
    pub async fn validate(&self, token: &str) -> Result<(Value, Platform)> {
        let (issuer, client_id) = peek_issuer_and_audience(token)?;

        let platform = self
            .registry
            .find_platform(&issuer, &client_id)?
            .ok_or_else(|| LtiError::UnknownPlatform {
                issuer: issuer.clone(),
                client_id: client_id.clone(),
            })?;

        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| LtiError::SignatureInvalid(format!("bad header: {e}")))?;
        if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(LtiError::SignatureInvalid(format!(
                "symmetric algorithm {:?} not accepted",
                header.alg
            )));
        }

        let source = self.source_for(&platform).await?;
        let jwk = source.key_for(header.kid.as_deref()).await?;
        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| LtiError::SignatureInvalid(format!("unusable platform key: {e}")))?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = VALIDATION_LEEWAY_SECS;
        validation.validate_nbf = true;
        validation.set_audience(&[&platform.client_id]);
        validation.set_issuer(&[&platform.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let data = jsonwebtoken::decode::<Value>(token, &key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => LtiError::TokenExpired,
                _ => LtiError::SignatureInvalid(e.to_string()),
            }
        })?;

        debug!(platform = %platform.key(), "Launch token verified");
        Ok((data.claims, platform))
    }

    /// Drop the cached key set for a platform, e.g. after its JWKS URL
    /// changed. Returns `true` if one was cached.
    pub async fn invalidate(&self, issuer: &str, client_id: &str) -> bool {
        let key = PlatformKey {
            issuer: issuer.to_string(),
            client_id: client_id.to_string(),
        };
        let removed = self.sources.write().await.remove(&key).is_some();
        if removed {
            info!(platform = %key, "Dropped cached platform key set");
        }
        removed
    }

    /// Number of platforms with a cached key set.
    pub async fn cached_sources(&self) -> usize {
        self.sources.read().await.len()
    }

    async fn source_for(&self, platform: &Platform) -> Result<Arc<RemoteKeySet>> {
        let key = platform.key();
        if let Some(source) = self.cached(&key, platform).await {
            return Ok(source);
        }

        self.construction
            .run_exclusively(&key.to_string(), || async {
                // Another launch may have built it while we waited.
                if let Some(source) = self.cached(&key, platform).await {
                    return Ok(source);
                }

                let source = match RemoteKeySet::fetch(
                    &platform.public_jwks_url,
                    self.http.clone(),
                    self.min_refresh,
                )
                .await
                {
                    Ok(source) => Arc::new(source),
                    Err(e) => {
                        warn!(platform = %key, error = %e, "Platform key set unavailable");
                        return Err(e);
                    }
                };

                self.sources
                    .write()
                    .await
                    .insert(key.clone(), source.clone());
                Ok(source)
            })
            .await
    }

    // A cached source for a URL the platform no longer uses is stale.
    async fn cached(&self, key: &PlatformKey, platform: &Platform) -> Option<Arc<RemoteKeySet>> {
        self.sources
            .read()
            .await
            .get(key)
            .filter(|source| source.url() == platform.public_jwks_url)
            .cloned()
    }
}

/// Read `iss` and the first `aud` from an unverified token.
fn peek_issuer_and_audience(token: &str) -> Result<(String, String)> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| LtiError::Malformed("token is not a JWT".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| LtiError::Malformed(format!("token payload is not base64url: {e}")))?;
    let claims: Value = serde_json::from_slice(&bytes)
        .map_err(|e| LtiError::Malformed(format!("token payload is not JSON: {e}")))?;

    let issuer = claims
        .get("iss")
        .and_then(Value::as_str)
        .ok_or_else(|| LtiError::Malformed("token has no iss".into()))?;
    let audience = match claims.get("aud") {
        Some(Value::String(aud)) => Some(aud.as_str()),
        Some(Value::Array(auds)) => auds.first().and_then(Value::as_str),
        _ => None,
    }
    .ok_or_else(|| LtiError::Malformed("token has no aud".into()))?;

    Ok((issuer.to_string(), audience.to_string()))
}
