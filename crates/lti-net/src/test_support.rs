//! Fixtures shared by the unit tests: RSA keys, an in-memory platform
//! registry and small axum servers standing in for a platform.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use lti_shared::keys::{generate_keypair, GeneratedKeys};
use lti_shared::{Platform, PlatformRegistry, Result, TokenSigner};

pub const ISSUER: &str = "https://lms.example";
pub const CLIENT_ID: &str = "abc";

// RSA generation is slow in debug builds; generate each key once.
pub fn tool_keys() -> &'static GeneratedKeys {
    static KEYS: OnceLock<GeneratedKeys> = OnceLock::new();
    KEYS.get_or_init(|| generate_keypair().unwrap())
}

pub fn second_keys() -> &'static GeneratedKeys {
    static KEYS: OnceLock<GeneratedKeys> = OnceLock::new();
    KEYS.get_or_init(|| generate_keypair().unwrap())
}

pub fn signer_for(keys: &GeneratedKeys) -> TokenSigner {
    TokenSigner::new(Some(&keys.private_pem), None).unwrap()
}

pub fn platform(jwks_url: &str, token_url: &str) -> Platform {
    Platform {
        id: Uuid::new_v4(),
        issuer: ISSUER.into(),
        client_id: CLIENT_ID.into(),
        public_jwks_url: jwks_url.into(),
        oauth2_token_url: token_url.into(),
        auth_login_url: format!("{ISSUER}/auth"),
        deployment_id: "dep-1".into(),
        site_id: Uuid::new_v4(),
    }
}

#[derive(Default)]
pub struct MapRegistry {
    platforms: Mutex<HashMap<(String, String), Platform>>,
}

impl MapRegistry {
    pub fn with(platform: Platform) -> Arc<Self> {
        let registry = Arc::new(Self::default());
        registry.insert(platform);
        registry
    }

    pub fn insert(&self, platform: Platform) {
        self.platforms.lock().unwrap().insert(
            (platform.issuer.clone(), platform.client_id.clone()),
            platform,
        );
    }
}

impl PlatformRegistry for MapRegistry {
    fn find_platform(&self, issuer: &str, client_id: &str) -> Result<Option<Platform>> {
        Ok(self
            .platforms
            .lock()
            .unwrap()
            .get(&(issuer.to_string(), client_id.to_string()))
            .cloned())
    }
}

/// Serve `router` on an ephemeral localhost port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

struct JwksState {
    jwks: RwLock<Value>,
    hits: AtomicUsize,
}

pub struct JwksServer {
    addr: SocketAddr,
    state: Arc<JwksState>,
}

impl JwksServer {
    pub fn jwks_url(&self) -> String {
        format!("http://{}/jwks", self.addr)
    }

    pub async fn set_jwks(&self, jwks: Value) {
        *self.state.jwks.write().await = jwks;
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }
}

pub async fn spawn_jwks_server(jwks: Value) -> JwksServer {
    let state = Arc::new(JwksState {
        jwks: RwLock::new(jwks),
        hits: AtomicUsize::new(0),
    });

    let router = Router::new()
        .route("/jwks", get(serve_jwks))
        .with_state(state.clone());

    JwksServer {
        addr: serve(router).await,
        state,
    }
}

async fn serve_jwks(State(state): State<Arc<JwksState>>) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    Json(state.jwks.read().await.clone())
}
