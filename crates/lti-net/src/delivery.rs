//! Grade passback to platforms.
//!
//! Application code hands scores to [`ScoreDelivery::send_score`], which
//! returns immediately. A single background worker drains the queue: for each
//! request it signs a client assertion, trades it for an OAuth2 access token
//! at the platform's token endpoint, then posts the score. A failed request is
//! logged and dropped; the worker moves on to the next one.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use lti_shared::constants::{
    AGS_SCOPE_SCORE, CLIENT_ASSERTION_TTL_SECS, CLIENT_ASSERTION_TYPE_JWT_BEARER,
    GRANT_CLIENT_CREDENTIALS, SCORE_CONTENT_TYPE,
};
use lti_shared::{
    LaunchSession, LtiError, Result, ScoreDeliveryRequest, ScoreSubmission, TokenSigner,
};

/// OAuth2 client assertion (RFC 7523) identifying the tool to a platform.
#[derive(Debug, Serialize, Deserialize)]
struct ClientAssertion {
    iss: String,
    sub: String,
    aud: String,
    iat: i64,
    exp: i64,
    jti: String,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

struct DeliveryContext {
    signer: Arc<TokenSigner>,
    http: reqwest::Client,
}

struct Worker {
    queue: mpsc::UnboundedSender<ScoreDeliveryRequest>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct ScoreDelivery {
    ctx: Arc<DeliveryContext>,
    worker: Mutex<Option<Worker>>,
}

impl ScoreDelivery {
    pub fn new(signer: Arc<TokenSigner>, http: reqwest::Client) -> Self {
        Self {
            ctx: Arc::new(DeliveryContext { signer, http }),
            worker: Mutex::new(None),
        }
    }

    /// Queue a score for the line item the session's last resource launch
    /// carried. Returns `false`, queueing nothing, if there is none.
    pub fn send_score(&self, session: &mut LaunchSession, submission: &ScoreSubmission) -> bool {
        match session.take_score_request(submission) {
            Ok(request) => {
                self.enqueue(request);
                true
            }
            Err(e) => {
                warn!(session = %session.id, error = %e, "Score not sent");
                false
            }
        }
    }

    /// Queue a prepared request, starting the worker if it is not running.
    pub fn enqueue(&self, request: ScoreDeliveryRequest) {
        let mut worker = self.lock_worker();

        if worker
            .as_ref()
            .map_or(true, |w| w.handle.is_finished() || w.queue.is_closed())
        {
            *worker = Some(self.spawn_worker());
        }

        if let Some(w) = worker.as_ref() {
            if let Err(e) = w.queue.send(request) {
                error!(url = %e.0.url, "Delivery queue closed; score dropped");
            }
        }
    }

    /// Whether a worker task is currently alive.
    pub fn is_running(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Stop the worker after the request it is currently delivering.
    /// A later [`enqueue`](Self::enqueue) starts a fresh worker.
    pub async fn shutdown(&self) {
        let Some(worker) = self.lock_worker().take() else {
            return;
        };

        let _ = worker.shutdown.send(true);
        if let Err(e) = worker.handle.await {
            error!(error = %e, "Score delivery worker panicked");
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        // A panic while holding the guard leaves the Option intact.
        self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn_worker(&self) -> Worker {
        let (queue, mut requests) = mpsc::unbounded_channel::<ScoreDeliveryRequest>();
        let (shutdown, mut stop) = watch::channel(false);
        let ctx = self.ctx.clone();

        let handle = tokio::spawn(async move {
            info!("Score delivery worker started");
            loop {
                tokio::select! {
                    biased;

                    _ = stop.changed() => {
                        let dropped = requests.len();
                        if dropped > 0 {
                            warn!(dropped, "Score delivery stopped with requests pending");
                        }
                        break;
                    }

                    request = requests.recv() => {
                        let Some(request) = request else { break };
                        match deliver(&ctx, &request).await {
                            Ok(()) => info!(url = %request.url, "Score delivered"),
                            Err(e) => error!(
                                url = %request.url,
                                platform = %request.platform.key(),
                                error = %e,
                                "Score delivery failed"
                            ),
                        }
                    }
                }
            }
            info!("Score delivery worker stopped");
        });

        Worker {
            queue,
            shutdown,
            handle,
        }
    }
}

async fn deliver(ctx: &DeliveryContext, request: &ScoreDeliveryRequest) -> Result<()> {
    let token = fetch_access_token(ctx, request).await?;

    let response = ctx
        .http
        .post(&request.url)
        .bearer_auth(token)
        .header(reqwest::header::CONTENT_TYPE, SCORE_CONTENT_TYPE)
        .body(request.payload.to_string())
        .send()
        .await
        .map_err(|e| LtiError::DeliveryFailed(format!("score request: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(LtiError::DeliveryFailed(format!(
            "score endpoint returned HTTP {status}"
        )));
    }
    Ok(())
}

async fn fetch_access_token(ctx: &DeliveryContext, request: &ScoreDeliveryRequest) -> Result<String> {
    let platform = &request.platform;
    let now = Utc::now().timestamp();
    let assertion = ClientAssertion {
        iss: platform.client_id.clone(),
        sub: platform.client_id.clone(),
        aud: platform.oauth2_token_url.clone(),
        iat: now,
        exp: now + CLIENT_ASSERTION_TTL_SECS,
        jti: Uuid::new_v4().to_string(),
    };
    let signed = ctx
        .signer
        .sign(&assertion)
        .map_err(|e| LtiError::DeliveryFailed(format!("client assertion: {e}")))?;

    debug!(token_url = %platform.oauth2_token_url, "Requesting access token");

    let response = ctx
        .http
        .post(&platform.oauth2_token_url)
        .form(&[
            ("grant_type", GRANT_CLIENT_CREDENTIALS),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE_JWT_BEARER),
            ("client_assertion", signed.as_str()),
            ("scope", AGS_SCOPE_SCORE),
        ])
        .send()
        .await
        .map_err(|e| LtiError::DeliveryFailed(format!("token request: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(LtiError::DeliveryFailed(format!(
            "token endpoint returned HTTP {status}"
        )));
    }

    let token: AccessToken = response
        .json()
        .await
        .map_err(|e| LtiError::DeliveryFailed(format!("token response: {e}")))?;
    Ok(token.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{platform, serve, signer_for, tool_keys, CLIENT_ID};
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use jsonwebtoken::{Algorithm, DecodingKey, Validation};
    use lti_shared::PendingResource;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakePlatform {
        token_forms: Mutex<Vec<HashMap<String, String>>>,
        scores: Mutex<Vec<(HeaderMap, Value)>>,
        fail_tokens: AtomicUsize,
        fail_scores: AtomicUsize,
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn token_endpoint(
        State(state): State<Arc<FakePlatform>>,
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        state.token_forms.lock().unwrap().push(form);
        if take_failure(&state.fail_tokens) {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
        }
        (
            StatusCode::OK,
            Json(json!({ "access_token": "tok-1", "token_type": "Bearer", "expires_in": 3600 })),
        )
    }

    async fn score_endpoint(
        State(state): State<Arc<FakePlatform>>,
        headers: HeaderMap,
        body: String,
    ) -> StatusCode {
        if take_failure(&state.fail_scores) {
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        let body = serde_json::from_str(&body).unwrap();
        state.scores.lock().unwrap().push((headers, body));
        StatusCode::OK
    }

    async fn spawn_platform() -> (SocketAddr, Arc<FakePlatform>) {
        let state = Arc::new(FakePlatform::default());
        let router = Router::new()
            .route("/token", post(token_endpoint))
            .route("/lineitems/1/scores", post(score_endpoint))
            .with_state(state.clone());
        (serve(router).await, state)
    }

    fn session_for(addr: SocketAddr) -> LaunchSession {
        let mut session = LaunchSession::new();
        arm(&mut session, addr);
        session
    }

    fn arm(session: &mut LaunchSession, addr: SocketAddr) {
        session.pending_resource = Some(PendingResource {
            platform: platform("http://unused/jwks", &format!("http://{addr}/token")),
            line_item_url: format!("http://{addr}/lineitems/1"),
            subject: "u1".into(),
        });
    }

    fn submission(score: f64) -> ScoreSubmission {
        ScoreSubmission {
            score_given: score,
            score_maximum: 10.0,
            comment: None,
            activity_progress: Default::default(),
            grading_progress: Default::default(),
        }
    }

    fn delivery() -> ScoreDelivery {
        ScoreDelivery::new(Arc::new(signer_for(tool_keys())), reqwest::Client::new())
    }

    async fn wait_for_scores(state: &FakePlatform, expected: usize) {
        for _ in 0..200 {
            if state.scores.lock().unwrap().len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("expected {expected} delivered scores");
    }

    #[tokio::test]
    async fn test_score_delivered_with_bearer_token() {
        let (addr, state) = spawn_platform().await;
        let delivery = delivery();
        let mut session = session_for(addr);

        assert!(delivery.send_score(&mut session, &submission(8.0)));
        assert!(session.pending_resource.is_none());
        wait_for_scores(&state, 1).await;

        let forms = state.token_forms.lock().unwrap().clone();
        let form = &forms[0];
        assert_eq!(form["grant_type"], GRANT_CLIENT_CREDENTIALS);
        assert_eq!(form["client_assertion_type"], CLIENT_ASSERTION_TYPE_JWT_BEARER);
        assert_eq!(form["scope"], AGS_SCOPE_SCORE);

        let token_url = format!("http://{addr}/token");
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&token_url]);
        let key = DecodingKey::from_rsa_pem(tool_keys().public_pem.as_bytes()).unwrap();
        let assertion =
            jsonwebtoken::decode::<ClientAssertion>(&form["client_assertion"], &key, &validation)
                .unwrap()
                .claims;
        assert_eq!(assertion.iss, CLIENT_ID);
        assert_eq!(assertion.sub, CLIENT_ID);
        assert_eq!(assertion.exp - assertion.iat, CLIENT_ASSERTION_TTL_SECS);

        let scores = state.scores.lock().unwrap();
        let (headers, body) = &scores[0];
        assert_eq!(headers["authorization"], "Bearer tok-1");
        assert_eq!(headers["content-type"], SCORE_CONTENT_TYPE);
        assert_eq!(body["userId"], "u1");
        assert_eq!(body["scoreGiven"], 8.0);
        assert_eq!(body["activityProgress"], "Completed");
        assert_eq!(body["gradingProgress"], "FullyGraded");
    }

    #[tokio::test]
    async fn test_without_line_item_nothing_is_queued() {
        let delivery = delivery();
        let mut session = LaunchSession::new();

        assert!(!delivery.send_score(&mut session, &submission(1.0)));
        assert!(!delivery.is_running());
    }

    #[tokio::test]
    async fn test_failed_token_exchange_does_not_stop_worker() {
        let (addr, state) = spawn_platform().await;
        state.fail_tokens.store(1, Ordering::SeqCst);
        let delivery = delivery();
        let mut session = session_for(addr);

        assert!(delivery.send_score(&mut session, &submission(3.0)));
        arm(&mut session, addr);
        assert!(delivery.send_score(&mut session, &submission(4.0)));

        wait_for_scores(&state, 1).await;
        let scores = state.scores.lock().unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].1["scoreGiven"], 4.0);
        assert_eq!(state.token_forms.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_score_post_does_not_stop_worker() {
        let (addr, state) = spawn_platform().await;
        state.fail_scores.store(1, Ordering::SeqCst);
        let delivery = delivery();
        let mut session = session_for(addr);

        delivery.send_score(&mut session, &submission(5.0));
        arm(&mut session, addr);
        delivery.send_score(&mut session, &submission(6.0));

        wait_for_scores(&state, 1).await;
        assert_eq!(state.scores.lock().unwrap()[0].1["scoreGiven"], 6.0);
        assert!(delivery.is_running());
    }

    #[tokio::test]
    async fn test_disabled_signer_drops_request() {
        let (addr, state) = spawn_platform().await;
        let delivery = ScoreDelivery::new(Arc::new(TokenSigner::disabled()), reqwest::Client::new());
        let mut session = session_for(addr);

        assert!(delivery.send_score(&mut session, &submission(2.0)));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(state.token_forms.lock().unwrap().is_empty());
        assert!(delivery.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_then_lazy_restart() {
        let (addr, state) = spawn_platform().await;
        let delivery = delivery();
        let mut session = session_for(addr);

        delivery.send_score(&mut session, &submission(7.0));
        wait_for_scores(&state, 1).await;
        assert!(delivery.is_running());

        delivery.shutdown().await;
        assert!(!delivery.is_running());

        arm(&mut session, addr);
        delivery.send_score(&mut session, &submission(9.0));
        assert!(delivery.is_running());
        wait_for_scores(&state, 2).await;
    }
}
