use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{
        header::SET_COOKIE,
        HeaderMap, Method, StatusCode,
    },
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use lti_net::{ScoreDelivery, TokenValidator};
use lti_shared::{LaunchClaims, LaunchSession, LtiError, Platform, ScoreSubmission, Site, TokenSigner};
use lti_store::{SqliteDirectory, StoreError};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::launch::{DeepLinkResource, LaunchOrchestrator};
use crate::login::{self, LoginRequest};
use crate::sessions::{self, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub directory: SqliteDirectory,
    pub validator: Arc<TokenValidator>,
    pub orchestrator: Arc<LaunchOrchestrator>,
    pub signer: Arc<TokenSigner>,
    pub delivery: Arc<ScoreDelivery>,
    pub sessions: SessionStore,
}

pub fn build_router(state: AppState) -> Router {
    // Only the public key set is fetched cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS]);

    Router::new()
        .route("/health", get(health_check))
        .route("/.well-known/jwks.json", get(tool_jwks).layer(cors))
        .route("/lti/login", get(login_query).post(login_form))
        .route("/lti/launch", post(launch))
        .route("/lti/deep-link/response", post(deep_link_response))
        .route("/lti/score", post(submit_score))
        .route("/admin/platforms", get(admin_list_platforms).post(admin_register_platform))
        .route("/admin/platforms/jwks", post(admin_rotate_jwks))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    signing_enabled: bool,
}

#[derive(Deserialize)]
struct LaunchForm {
    id_token: String,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Deserialize)]
struct DeepLinkResponseRequest {
    resources: Vec<DeepLinkResource>,
}

#[derive(Serialize)]
struct ScoreQueuedResponse {
    queued: bool,
}

#[derive(Deserialize)]
struct RegisterPlatformRequest {
    issuer: String,
    client_id: String,
    public_jwks_url: String,
    oauth2_token_url: String,
    auth_login_url: String,
    deployment_id: String,
    /// Existing site to attach the platform to; a new site is created when
    /// absent.
    #[serde(default)]
    site_id: Option<Uuid>,
    #[serde(default)]
    site_name: Option<String>,
}

#[derive(Deserialize)]
struct RotateJwksRequest {
    issuer: String,
    client_id: String,
    public_jwks_url: String,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        signing_enabled: state.signer.is_enabled(),
    })
}

async fn tool_jwks(State(state): State<AppState>) -> Json<Value> {
    Json(state.signer.jwks())
}

// ─── Launch flow ───

async fn login_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(request): Query<LoginRequest>,
) -> Result<Response, ServerError> {
    start_login(state, headers, request).await
}

async fn login_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(request): Form<LoginRequest>,
) -> Result<Response, ServerError> {
    start_login(state, headers, request).await
}

async fn start_login(
    state: AppState,
    headers: HeaderMap,
    request: LoginRequest,
) -> Result<Response, ServerError> {
    let client_id = request
        .client_id
        .clone()
        .ok_or_else(|| ServerError::BadRequest("client_id is required".into()))?;
    let platform = find_platform(&state, &request.iss, &client_id)?;

    let mut session = state.sessions.checkout(sessions::session_id(&headers)).await;
    let result = login::begin_login(
        &mut session,
        &platform,
        &request,
        &state.config.launch_url(),
    );
    let session_id = session.id;
    state.sessions.store(session).await;

    let location = result?;
    Ok(redirect_with_session(session_id, &location))
}

async fn launch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LaunchForm>,
) -> Result<Response, ServerError> {
    let mut session = state.sessions.checkout(sessions::session_id(&headers)).await;
    let result = run_launch(&state, &mut session, &form).await;
    let session_id = session.id;
    state.sessions.store(session).await;

    let location = result?;
    Ok(redirect_with_session(session_id, &location))
}

async fn run_launch(
    state: &AppState,
    session: &mut LaunchSession,
    form: &LaunchForm,
) -> Result<String, LtiError> {
    let (claims, platform) = state.validator.validate(&form.id_token).await?;
    let claims = LaunchClaims::try_from(claims)?;

    login::verify_login(
        session,
        form.state.as_deref(),
        claims.nonce.as_deref(),
        state.config.allow_unsolicited_launch,
    )?;

    let outcome = state
        .orchestrator
        .handle_launch(session, &claims, &platform)
        .await?;
    info!(
        session = %session.id,
        platform = %platform.key(),
        message_type = %claims.message_type,
        "Launch accepted"
    );
    Ok(outcome.url().to_string())
}

async fn deep_link_response(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<DeepLinkResponseRequest>,
) -> Result<Html<String>, ServerError> {
    // Refuse before consuming the pending request so it can be retried.
    if !state.signer.is_enabled() {
        return Err(LtiError::SigningDisabled.into());
    }

    let mut session = state.sessions.checkout(sessions::session_id(&headers)).await;
    let result = state
        .orchestrator
        .build_deep_linking_response(&mut session, &request.resources);
    state.sessions.store(session).await;

    let (return_url, payload) = result?;
    let jwt = state.signer.sign(&payload)?;

    Ok(Html(auto_submit_form(&return_url, &jwt)))
}

async fn submit_score(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(submission): Json<ScoreSubmission>,
) -> Response {
    let mut session = state.sessions.checkout(sessions::session_id(&headers)).await;
    let queued = state.delivery.send_score(&mut session, &submission);
    state.sessions.store(session).await;

    (StatusCode::ACCEPTED, Json(ScoreQueuedResponse { queued })).into_response()
}

fn find_platform(state: &AppState, issuer: &str, client_id: &str) -> Result<Platform, ServerError> {
    state
        .directory
        .with_db(|db| db.get_platform(issuer, client_id))?
        .ok_or_else(|| {
            LtiError::UnknownPlatform {
                issuer: issuer.to_string(),
                client_id: client_id.to_string(),
            }
            .into()
        })
}

fn redirect_with_session(session_id: Uuid, location: &str) -> Response {
    (
        [(SET_COOKIE, sessions::session_cookie(session_id))],
        Redirect::to(location),
    )
        .into_response()
}

/// HTML page that immediately posts `jwt` back to the platform.
fn auto_submit_form(return_url: &str, jwt: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><body onload=\"document.forms[0].submit()\">\n\
         <form method=\"post\" action=\"{}\">\n\
         <input type=\"hidden\" name=\"JWT\" value=\"{}\">\n\
         <noscript><button type=\"submit\">Continue</button></noscript>\n\
         </form>\n</body></html>\n",
        escape_attr(return_url),
        escape_attr(jwt)
    )
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

// ─── Admin ───

fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.admin_token else {
        return Err(ServerError::Forbidden(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::Forbidden("Invalid admin token".into()));
    }

    Ok(())
}

async fn admin_list_platforms(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<Platform>>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    Ok(Json(state.directory.with_db(|db| db.list_platforms())?))
}

async fn admin_register_platform(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<RegisterPlatformRequest>,
) -> Result<Json<Platform>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    let platform = state.directory.with_db(|db| {
        if db.get_platform(&req.issuer, &req.client_id)?.is_some() {
            return Ok(None);
        }

        let site = match req.site_id {
            Some(id) => db.get_site(id)?,
            None => {
                let site = Site {
                    id: Uuid::new_v4(),
                    name: req.site_name.clone().unwrap_or_else(|| req.issuer.clone()),
                    created_at: Utc::now(),
                };
                db.create_site(&site)?;
                site
            }
        };

        let platform = Platform {
            id: Uuid::new_v4(),
            issuer: req.issuer.clone(),
            client_id: req.client_id.clone(),
            public_jwks_url: req.public_jwks_url.clone(),
            oauth2_token_url: req.oauth2_token_url.clone(),
            auth_login_url: req.auth_login_url.clone(),
            deployment_id: req.deployment_id.clone(),
            site_id: site.id,
        };
        db.register_platform(&platform)?;
        Ok(Some(platform))
    });

    let platform = match platform {
        Ok(Some(platform)) => platform,
        Ok(None) => {
            return Err(ServerError::BadRequest(format!(
                "platform {}#{} is already registered",
                req.issuer, req.client_id
            )))
        }
        Err(StoreError::NotFound) => {
            return Err(ServerError::NotFound("site does not exist".into()))
        }
        Err(e) => return Err(e.into()),
    };

    info!(platform = %platform.key(), site = %platform.site_id, "Admin registered platform");
    Ok(Json(platform))
}

async fn admin_rotate_jwks(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<RotateJwksRequest>,
) -> Result<Json<Value>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    let updated = state.directory.with_db(|db| {
        db.update_platform_jwks_url(&req.issuer, &req.client_id, &req.public_jwks_url)
    })?;
    if !updated {
        return Err(ServerError::NotFound(format!(
            "platform {}#{}",
            req.issuer, req.client_id
        )));
    }

    state.validator.invalidate(&req.issuer, &req.client_id).await;
    info!(issuer = %req.issuer, client_id = %req.client_id, "Admin rotated platform JWKS URL");
    Ok(Json(serde_json::json!({ "updated": true })))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::PathResolver;
    use axum::body::{to_bytes, Body};
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION};
    use axum::http::Request;
    use lti_shared::keys::{generate_keypair, GeneratedKeys};
    use lti_store::Database;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::OnceLock;
    use tower::ServiceExt;

    const ADMIN: &str = "admin-secret";

    fn platform_keys() -> &'static GeneratedKeys {
        static KEYS: OnceLock<GeneratedKeys> = OnceLock::new();
        KEYS.get_or_init(|| generate_keypair().unwrap())
    }

    fn tool_keys() -> &'static GeneratedKeys {
        static KEYS: OnceLock<GeneratedKeys> = OnceLock::new();
        KEYS.get_or_init(|| generate_keypair().unwrap())
    }

    async fn spawn_platform_jwks() -> String {
        let jwks = platform_keys().jwks.clone();
        let router = Router::new().route(
            "/jwks",
            get(move || {
                let jwks = jwks.clone();
                async move { Json(jwks) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/jwks")
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            admin_token: Some(ADMIN.into()),
            tool_base_url: "https://tool.example".into(),
            ..ServerConfig::default()
        }
    }

    fn app(signer: TokenSigner) -> Router {
        app_with_config(signer, test_config())
    }

    fn app_with_config(signer: TokenSigner, config: ServerConfig) -> Router {
        let directory = SqliteDirectory::new(Database::open_in_memory().unwrap());
        let http = reqwest::Client::new();
        let signer = Arc::new(signer);
        let resolver =
            PathResolver::new(&config.tool_base_url, &config.resource_path, &config.deep_link_ui_path)
                .unwrap();

        build_router(AppState {
            validator: Arc::new(TokenValidator::new(Arc::new(directory.clone()), http.clone())),
            orchestrator: Arc::new(LaunchOrchestrator::new(
                Arc::new(directory.clone()),
                Arc::new(resolver),
                config.launch_url(),
            )),
            delivery: Arc::new(ScoreDelivery::new(signer.clone(), http)),
            config: Arc::new(config),
            directory,
            signer,
            sessions: SessionStore::new(),
        })
    }

    fn signed_app() -> Router {
        app(TokenSigner::new(Some(&tool_keys().private_pem), None).unwrap())
    }

    async fn register(app: &Router, jwks_url: &str) {
        let body = json!({
            "issuer": "https://lms.example",
            "client_id": "abc",
            "public_jwks_url": jwks_url,
            "oauth2_token_url": "http://127.0.0.1:1/token",
            "auth_login_url": "https://lms.example/auth",
            "deployment_id": "dep-1",
        });
        let response = app
            .clone()
            .oneshot(
                Request::post("/admin/platforms")
                    .header(AUTHORIZATION, format!("Bearer {ADMIN}"))
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    fn cookie_of(response: &Response) -> String {
        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    fn id_token(message_type: &str, nonce: &str) -> String {
        let now = Utc::now().timestamp();
        let claims = json!({
            "iss": "https://lms.example",
            "aud": "abc",
            "sub": "u1",
            "iat": now,
            "exp": now + 300,
            "nonce": nonce,
            "https://purl.imsglobal.org/spec/lti/claim/message_type": message_type,
            "https://purl.imsglobal.org/spec/lti/claim/context": { "id": "ctx1", "title": "Algebra" },
            "https://purl.imsglobal.org/spec/lti/claim/roles": [
                "http://purl.imsglobal.org/vocab/lis/v2/membership#Learner"
            ],
            "https://purl.imsglobal.org/spec/lti-ags/claim/endpoint": {
                "lineitem": "http://127.0.0.1:1/lineitems/1"
            },
            "https://purl.imsglobal.org/spec/lti-dl/claim/deep_linking_settings": {
                "deep_link_return_url": "https://lms.example/dl/return"
            }
        });
        TokenSigner::new(Some(&platform_keys().private_pem), None)
            .unwrap()
            .sign(&claims)
            .unwrap()
    }

    fn form_body(pairs: &[(&str, &str)]) -> Body {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        Body::from(encoded)
    }

    async fn post_launch(app: &Router, cookie: &str, pairs: &[(&str, &str)]) -> Response {
        app.clone()
            .oneshot(
                Request::post("/lti/launch")
                    .header(COOKIE, cookie)
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(form_body(pairs))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn json_of(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Runs the login redirect and returns (cookie, state, nonce).
    async fn login(app: &Router) -> (String, String, String) {
        let response = app
            .clone()
            .oneshot(
                Request::get(
                    "/lti/login?iss=https%3A%2F%2Flms.example&login_hint=h1\
                     &target_link_uri=https%3A%2F%2Ftool.example%2Flti%2Flaunch&client_id=abc",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let location = url::Url::parse(response.headers()[LOCATION].to_str().unwrap()).unwrap();
        let query: HashMap<_, _> = location.query_pairs().into_owned().collect();
        assert_eq!(query["redirect_uri"], "https://tool.example/lti/launch");
        (cookie_of(&response), query["state"].clone(), query["nonce"].clone())
    }

    #[tokio::test]
    async fn test_login_launch_and_score() {
        let app = signed_app();
        register(&app, &spawn_platform_jwks().await).await;

        let (cookie, state, nonce) = login(&app).await;
        let token = id_token("LtiResourceLinkRequest", &nonce);

        let response = post_launch(&app, &cookie, &[("id_token", &token), ("state", &state)]).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "https://tool.example/resource");

        let score = app
            .clone()
            .oneshot(
                Request::post("/lti/score")
                    .header(COOKIE, &cookie)
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "score_given": 7.0, "score_maximum": 10.0 }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(score.status(), StatusCode::ACCEPTED);
        assert_eq!(json_of(score).await["queued"], true);
    }

    #[tokio::test]
    async fn test_state_mismatch_is_unauthorized() {
        let app = signed_app();
        register(&app, &spawn_platform_jwks().await).await;

        let (cookie, _state, nonce) = login(&app).await;
        let token = id_token("LtiResourceLinkRequest", &nonce);

        let response =
            post_launch(&app, &cookie, &[("id_token", &token), ("state", "forged")]).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_launch_without_login_is_unauthorized() {
        let app = signed_app();
        register(&app, &spawn_platform_jwks().await).await;

        // A valid id token posted without the cookie from /lti/login.
        let token = id_token("LtiResourceLinkRequest", "captured-nonce");
        let response =
            post_launch(&app, "", &[("id_token", &token), ("state", "captured-state")]).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(LOCATION).is_none());

        // The same token is refused for a session that completed a login too.
        let (cookie, state, _nonce) = login(&app).await;
        let response = post_launch(&app, &cookie, &[("id_token", &token), ("state", &state)]).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unsolicited_launch_when_enabled() {
        let config = ServerConfig {
            allow_unsolicited_launch: true,
            ..test_config()
        };
        let app = app_with_config(
            TokenSigner::new(Some(&tool_keys().private_pem), None).unwrap(),
            config,
        );
        register(&app, &spawn_platform_jwks().await).await;

        let token = id_token("LtiResourceLinkRequest", "n");
        let response = post_launch(&app, "", &[("id_token", &token)]).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "https://tool.example/resource");
    }

    #[tokio::test]
    async fn test_invalid_token_is_unauthorized() {
        let app = signed_app();
        register(&app, &spawn_platform_jwks().await).await;

        // Signed by the tool's key, which the platform JWKS does not hold.
        let now = Utc::now().timestamp();
        let forged = TokenSigner::new(Some(&tool_keys().private_pem), None)
            .unwrap()
            .sign(&json!({ "iss": "https://lms.example", "aud": "abc", "sub": "u1", "exp": now + 300 }))
            .unwrap();

        let response = post_launch(&app, "", &[("id_token", &forged)]).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(json_of(response).await["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_deep_link_response_form() {
        let app = signed_app();
        register(&app, &spawn_platform_jwks().await).await;

        let (cookie, state, nonce) = login(&app).await;
        let token = id_token("LtiDeepLinkingRequest", &nonce);
        let response = post_launch(&app, &cookie, &[("id_token", &token), ("state", &state)]).await;
        assert_eq!(response.headers()[LOCATION], "https://tool.example/select");

        let request = || {
            Request::post("/lti/deep-link/response")
                .header(COOKIE, &cookie)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "resources": [{ "title": "Quiz 1" }] }).to_string()))
                .unwrap()
        };

        let response = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = String::from_utf8(
            to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec(),
        )
        .unwrap();
        assert!(html.contains("action=\"https://lms.example/dl/return\""));
        assert!(html.contains("name=\"JWT\""));

        // The pending request was consumed.
        let response = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_deep_link_response_without_key_is_unavailable() {
        let app = app(TokenSigner::disabled());
        let response = app
            .oneshot(
                Request::post("/lti/deep-link/response")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "resources": [] }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_admin_requires_token() {
        let app = signed_app();
        let response = app
            .clone()
            .oneshot(
                Request::get("/admin/platforms")
                    .header(AUTHORIZATION, "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        register(&app, "https://lms.example/jwks").await;
        let response = app
            .clone()
            .oneshot(
                Request::get("/admin/platforms")
                    .header(AUTHORIZATION, format!("Bearer {ADMIN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(json_of(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rotating_jwks_url_recovers_launches() {
        let app = signed_app();
        register(&app, "http://127.0.0.1:1/jwks").await;

        let (cookie, state, nonce) = login(&app).await;
        let token = id_token("LtiResourceLinkRequest", &nonce);
        let form = [("id_token", token.as_str()), ("state", state.as_str())];

        // Key lookup fails before the pending login is checked, so it survives.
        let response = post_launch(&app, &cookie, &form).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = json!({
            "issuer": "https://lms.example",
            "client_id": "abc",
            "public_jwks_url": spawn_platform_jwks().await,
        });
        let response = app
            .clone()
            .oneshot(
                Request::post("/admin/platforms/jwks")
                    .header(AUTHORIZATION, format!("Bearer {ADMIN}"))
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = post_launch(&app, &cookie, &form).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_tool_jwks_published() {
        let app = signed_app();
        let response = app
            .oneshot(Request::get("/.well-known/jwks.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let jwks = json_of(response).await;
        assert_eq!(jwks["keys"][0]["kid"], tool_keys().kid.as_str());
    }

    #[test]
    fn test_escape_attr() {
        assert_eq!(escape_attr("a\"b&<c>"), "a&quot;b&amp;&lt;c&gt;");
    }
}
