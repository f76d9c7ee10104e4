//! Remote JSON Web Key Sets.
//!
//! A [`RemoteKeySet`] is bound to one JWKS URL. It fetches the document once
//! on construction and refetches when a token names a key id it has not seen,
//! which is how platforms rotate keys. Refetches are rate limited.

use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use lti_shared::{LtiError, Result};

/// Minimum spacing between refetches triggered by unknown key ids.
pub const DEFAULT_MIN_REFRESH: Duration = Duration::from_secs(30);

struct CachedKeys {
    set: JwkSet,
    fetched_at: Instant,
}

pub struct RemoteKeySet {
    url: String,
    http: reqwest::Client,
    min_refresh: Duration,
    keys: RwLock<CachedKeys>,
    refresh_lock: Mutex<()>,
}

impl RemoteKeySet {
    /// Fetch the key set at `url`. Fails with
    /// [`LtiError::KeySourceUnavailable`] if the document cannot be loaded.
    pub async fn fetch(url: &str, http: reqwest::Client, min_refresh: Duration) -> Result<Self> {
        let set = fetch_jwks(&http, url).await?;
        info!(url = %url, keys = set.keys.len(), "Loaded platform key set");

        Ok(Self {
            url: url.to_string(),
            http,
            min_refresh,
            keys: RwLock::new(CachedKeys {
                set,
                fetched_at: Instant::now(),
            }),
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Select the key for a token header's `kid`.
    ///
    /// Without a `kid` the set must contain exactly one key. An unknown `kid`
    /// triggers at most one refetch per refresh interval.
    pub async fn key_for(&self, kid: Option<&str>) -> Result<Jwk> {
        if let Some(jwk) = self.lookup(kid).await? {
            return Ok(jwk);
        }

        let Some(kid) = kid else {
            return Err(LtiError::SignatureInvalid(
                "token has no kid and key set is ambiguous".into(),
            ));
        };

        self.refresh_if_stale().await?;

        self.lookup(Some(kid))
            .await?
            .ok_or_else(|| LtiError::SignatureInvalid(format!("no key with kid {kid}")))
    }

    async fn lookup(&self, kid: Option<&str>) -> Result<Option<Jwk>> {
        let keys = self.keys.read().await;
        Ok(match kid {
            Some(kid) => keys.set.find(kid).cloned(),
            None if keys.set.keys.len() == 1 => keys.set.keys.first().cloned(),
            None => None,
        })
    }

    async fn refresh_if_stale(&self) -> Result<()> {
        let _refreshing = self.refresh_lock.lock().await;

        if self.keys.read().await.fetched_at.elapsed() < self.min_refresh {
            debug!(url = %self.url, "Key set refreshed recently; not refetching");
            return Ok(());
        }

        let set = fetch_jwks(&self.http, &self.url).await?;
        info!(url = %self.url, keys = set.keys.len(), "Refreshed platform key set");

        let mut keys = self.keys.write().await;
        keys.set = set;
        keys.fetched_at = Instant::now();
        Ok(())
    }
}

async fn fetch_jwks(http: &reqwest::Client, url: &str) -> Result<JwkSet> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| LtiError::KeySourceUnavailable(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(LtiError::KeySourceUnavailable(format!(
            "{url}: HTTP {status}"
        )));
    }

    response
        .json::<JwkSet>()
        .await
        .map_err(|e| LtiError::KeySourceUnavailable(format!("{url}: invalid JWKS: {e}")))
}
