//! In-memory launch sessions keyed by the `lti_session` cookie.
//!
//! Sessions stay in the store while in use. A handler checks one out, which
//! locks it for the duration of the request, works on it through `&mut`, and
//! stores it back before responding. Requests sharing a cookie therefore run
//! one after another against the same session. Idle sessions are purged by a
//! background task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use lti_shared::LaunchSession;

pub const SESSION_COOKIE: &str = "lti_session";

/// Exclusive access to one session for the length of a request.
pub type SessionGuard = OwnedMutexGuard<LaunchSession>;

struct StoredSession {
    session: Arc<Mutex<LaunchSession>>,
    last_seen: Instant,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, StoredSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the session with `id`, or start a new one. Waits while another
    /// request holds the same session.
    pub async fn checkout(&self, id: Option<Uuid>) -> SessionGuard {
        let handle = {
            let mut sessions = self.sessions.lock().await;
            let now = Instant::now();
            match id.and_then(|id| sessions.get_mut(&id)) {
                Some(stored) => {
                    stored.last_seen = now;
                    stored.session.clone()
                }
                None => {
                    let session = LaunchSession::new();
                    let id = session.id;
                    debug!(session = %id, "New launch session");
                    let handle = Arc::new(Mutex::new(session));
                    sessions.insert(
                        id,
                        StoredSession {
                            session: handle.clone(),
                            last_seen: now,
                        },
                    );
                    handle
                }
            }
        };
        handle.lock_owned().await
    }

    /// Release a checked out session, marking it as just used.
    pub async fn store(&self, session: SessionGuard) {
        let id = session.id;
        let handle = OwnedMutexGuard::mutex(&session).clone();
        drop(session);

        self.sessions
            .lock()
            .await
            .entry(id)
            .and_modify(|stored| stored.last_seen = Instant::now())
            .or_insert_with(|| StoredSession {
                session: handle,
                last_seen: Instant::now(),
            });
    }

    /// Drop sessions unused for longer than `max_idle`. Sessions checked out
    /// by a request are kept. Returns how many were dropped.
    pub async fn purge_stale(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        let now = Instant::now();
        sessions.retain(|_, stored| {
            now.duration_since(stored.last_seen) < max_idle
                || Arc::strong_count(&stored.session) > 1
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// The session id carried by the request's cookies, if any.
pub fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

/// `Set-Cookie` value for a session. `SameSite=None` is required because
/// launches arrive as cross-site form posts from the platform.
pub fn session_cookie(id: Uuid) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; Secure; SameSite=None")
}
