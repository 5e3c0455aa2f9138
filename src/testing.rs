// Scripted fake backend shared by unit tests

use crate::error::{ApiError, ApiResult};
use crate::http::{ApiRequest, ApiResponse, HttpClient};
use crate::session::{SessionManager, TokenLifetimes};
use crate::tokens::{MemoryTokenStorage, TokenStore};
use async_trait::async_trait;
use http::{Method, StatusCode};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
enum Reply {
    Respond(StatusCode, Value),
    Fail(String),
}

/// Replies are queued per (method, path) and consumed in order. Unscripted
/// routes answer 404. A held route parks its next request until released.
#[derive(Default)]
pub(crate) struct FakeBackend {
    replies: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    requests: Mutex<Vec<ApiRequest>>,
    gates: Mutex<HashMap<(Method, String), Arc<Notify>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, method: Method, path: &str, status: u16, body: Value) {
        let status = StatusCode::from_u16(status).expect("valid status code");
        self.push(method, path, Reply::Respond(status, body));
    }

    pub fn fail(&self, method: Method, path: &str, message: &str) {
        self.push(method, path, Reply::Fail(message.to_string()));
    }

    fn push(&self, method: Method, path: &str, reply: Reply) {
        self.replies
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    /// Park the next request to this route until `notify_one` is called on
    /// the returned handle
    pub fn hold(&self, method: Method, path: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().insert((method, path.to_string()), gate.clone());
        gate
    }

    /// Wait until `count` requests have reached this route
    pub async fn wait_for(&self, method: Method, path: &str, count: usize) {
        while self.calls(method.clone(), path) < count {
            tokio::task::yield_now().await;
        }
    }

    pub fn calls(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self, method: Method, path: &str) -> Option<ApiRequest> {
        self.requests
            .lock()
            .iter()
            .rev()
            .find(|r| r.method == method && r.path == path)
            .cloned()
    }
}

#[async_trait]
impl HttpClient for FakeBackend {
    async fn send(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        self.requests.lock().push(request.clone());

        // Let concurrent callers interleave like real I/O would
        tokio::task::yield_now().await;

        let gate = self
            .gates
            .lock()
            .remove(&(request.method.clone(), request.path.clone()));
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let reply = self
            .replies
            .lock()
            .get_mut(&(request.method.clone(), request.path.clone()))
            .and_then(|queue| queue.pop_front());

        match reply {
            Some(Reply::Respond(status, body)) => Ok(ApiResponse::new(status, body.to_string().into_bytes())),
            Some(Reply::Fail(message)) => Err(ApiError::Transport(message)),
            None => Ok(ApiResponse::new(
                StatusCode::NOT_FOUND,
                json!({ "detail": format!("no reply scripted for {} {}", request.method, request.path) })
                    .to_string()
                    .into_bytes(),
            )),
        }
    }
}

pub(crate) fn session_with(backend: &Arc<FakeBackend>) -> Arc<SessionManager> {
    let tokens = TokenStore::new(Box::new(MemoryTokenStorage::new()));
    Arc::new(SessionManager::new(backend.clone(), tokens, TokenLifetimes::default()))
}

pub(crate) fn tokens_json(access: &str, refresh: &str) -> Value {
    json!({ "access_token": access, "refresh_token": refresh, "token_type": "bearer" })
}

pub(crate) fn user_json(id: i64, email: &str) -> Value {
    json!({ "id": id, "email": email, "is_active": true, "created_at": "2025-01-01T00:00:00" })
}

pub(crate) fn task_json(id: i64, title: &str, priority: Option<&str>) -> Value {
    json!({
        "id": id,
        "title": title,
        "description": null,
        "completed": false,
        "user_id": 1,
        "created_at": format!("2025-01-{:02}T09:00:00", (id % 28) + 1),
        "priority": priority,
    })
}
