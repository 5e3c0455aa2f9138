// End-to-end flows through the public facade against an in-process backend

use async_trait::async_trait;
use http::{Method, StatusCode};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use todo_client::http::RequestBody;
use todo_client::{
    ApiError, ApiRequest, ApiResponse, ApiResult, ClientConfig, ExportFormat, HttpClient, MemoryTokenStorage,
    Navigation, NewTask, Priority, SessionEvent, SortKey, TaskQuery, TodoClient,
};

/// Minimal stateful backend: one account, todos kept in a vector, access
/// tokens numbered so tests can revoke the current one.
#[derive(Default)]
struct Backend {
    state: Mutex<BackendState>,
}

#[derive(Default)]
struct BackendState {
    todos: Vec<Value>,
    next_id: i64,
    token_generation: u32,
    revoked_up_to: u32,
    refreshes: u32,
}

impl Backend {
    fn revoke_current_token(&self) {
        let mut state = self.state.lock();
        state.revoked_up_to = state.token_generation;
    }

    fn issue_tokens(state: &mut BackendState) -> Value {
        state.token_generation += 1;
        json!({
            "access_token": format!("access-{}", state.token_generation),
            "refresh_token": format!("refresh-{}", state.token_generation),
            "token_type": "bearer",
        })
    }

    fn authorized(state: &BackendState, bearer: Option<&str>) -> bool {
        bearer
            .and_then(|b| b.strip_prefix("access-"))
            .and_then(|n| n.parse::<u32>().ok())
            .is_some_and(|n| n > state.revoked_up_to && n <= state.token_generation)
    }

    fn handle(&self, request: &ApiRequest) -> (StatusCode, Value) {
        let mut state = self.state.lock();
        let method = request.method.clone();
        let path = request.path.as_str();

        match (method, path) {
            (Method::POST, "/auth/login") => match &request.body {
                RequestBody::Form(pairs) if pairs.iter().any(|(k, v)| k == "password" && v == "secret") => {
                    (StatusCode::OK, Self::issue_tokens(&mut state))
                }
                _ => (StatusCode::UNAUTHORIZED, json!({"detail": "Incorrect email or password"})),
            },
            (Method::POST, "/auth/refresh") => {
                state.refreshes += 1;
                (StatusCode::OK, Self::issue_tokens(&mut state))
            }
            _ if !Self::authorized(&state, request.bearer.as_deref()) => {
                (StatusCode::UNAUTHORIZED, json!({"detail": "Could not validate credentials"}))
            }
            (Method::GET, "/auth/me") => (
                StatusCode::OK,
                json!({"id": 1, "email": "me@example.com", "is_active": true, "created_at": "2025-01-01T00:00:00"}),
            ),
            (Method::GET, "/todos/") => (StatusCode::OK, Value::Array(state.todos.clone())),
            (Method::POST, "/todos/") => {
                let RequestBody::Json(body) = &request.body else {
                    return (StatusCode::UNPROCESSABLE_ENTITY, json!({"detail": "expected json"}));
                };
                state.next_id += 1;
                let todo = json!({
                    "id": state.next_id,
                    "title": body["title"],
                    "description": body["description"],
                    "priority": body["priority"],
                    "due_date": body["due_date"],
                    "completed": false,
                    "user_id": 1,
                    "created_at": format!("2025-02-{:02}T10:00:00", state.next_id),
                });
                state.todos.push(todo.clone());
                (StatusCode::OK, todo)
            }
            (method, path) => {
                let id = path.strip_prefix("/todos/").and_then(|s| s.parse::<i64>().ok());
                let index = id.and_then(|id| state.todos.iter().position(|t| t["id"] == id));
                match (method, index) {
                    (Method::PUT, Some(i)) => {
                        if let RequestBody::Json(Value::Object(patch)) = &request.body {
                            for (key, value) in patch {
                                state.todos[i][key.as_str()] = value.clone();
                            }
                        }
                        (StatusCode::OK, state.todos[i].clone())
                    }
                    (Method::DELETE, Some(i)) => (StatusCode::OK, state.todos.remove(i)),
                    _ => (StatusCode::NOT_FOUND, json!({"detail": "Todo not found"})),
                }
            }
        }
    }
}

#[async_trait]
impl HttpClient for Backend {
    async fn send(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        let (status, body) = self.handle(request);
        Ok(ApiResponse::new(status, body.to_string().into_bytes()))
    }
}

fn client(backend: &Arc<Backend>) -> TodoClient {
    TodoClient::new(
        &ClientConfig::default(),
        backend.clone(),
        Box::new(MemoryTokenStorage::new()),
    )
}

#[tokio::test]
async fn test_anonymous_start_redirects_to_login() {
    let backend = Arc::new(Backend::default());
    let client = client(&backend);

    assert_eq!(client.session().guard().await, Navigation::Redirect("/login"));
    assert!(client.session().is_ready());

    let err = client.tasks().fetch_all().await.unwrap_err();
    assert_eq!(err, ApiError::NotAuthenticated);
}

#[tokio::test]
async fn test_wrong_password_surfaces_backend_detail() {
    let backend = Arc::new(Backend::default());
    let client = client(&backend);

    let err = client.session().login("me@example.com", "nope").await.unwrap_err();
    assert_eq!(err.message_or("Login failed"), "Incorrect email or password");
    assert!(!client.session().is_authenticated());
}

#[tokio::test]
async fn test_create_search_toggle_delete() {
    let backend = Arc::new(Backend::default());
    let client = client(&backend);
    client.session().login("me@example.com", "secret").await.unwrap();
    let tasks = client.tasks();

    tasks
        .create_task(&NewTask::new("Buy groceries").priority(Priority::P1))
        .await
        .unwrap();
    tasks
        .create_task(&NewTask::new("Write report").description("quarterly numbers"))
        .await
        .unwrap();
    tasks.fetch_all().await.unwrap();
    assert_eq!(tasks.total(), 2);

    let hits = tasks.query(&TaskQuery::new().text("grocceries"));
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Buy groceries");

    let by_priority = tasks.query(&TaskQuery::new().sort(SortKey::Priority));
    let titles: Vec<&str> = by_priority.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Buy groceries", "Write report"]);

    let done = tasks.toggle_complete(1).await.unwrap();
    assert!(done.completed);
    assert_eq!(tasks.completed().len(), 1);

    tasks.delete(2).await.unwrap();
    assert_eq!(tasks.total(), 1);

    let err = tasks.delete(2).await.unwrap_err();
    assert_eq!(err.message_or("Failed to delete todo"), "Todo not found");
    assert_eq!(tasks.total(), 1);
}

#[tokio::test]
async fn test_revoked_token_is_refreshed_transparently() {
    let backend = Arc::new(Backend::default());
    let client = client(&backend);
    client.session().login("me@example.com", "secret").await.unwrap();
    client.tasks().create_task(&NewTask::new("a")).await.unwrap();

    backend.revoke_current_token();
    let fetched = client.tasks().fetch_all().await.unwrap();

    assert_eq!(fetched, 1);
    assert!(client.session().is_authenticated());
    assert_eq!(backend.state.lock().refreshes, 1);
}

#[tokio::test]
async fn test_logout_clears_everything() {
    let backend = Arc::new(Backend::default());
    let client = client(&backend);
    let mut events = client.session().events();
    client.session().login("me@example.com", "secret").await.unwrap();
    client.tasks().create_task(&NewTask::new("a")).await.unwrap();

    client.session().logout();

    assert!(client.tasks().is_empty());
    assert!(client.session().access_token().is_none());
    assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedIn { user_id: 1 });
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::LoggedOut { redirect_to: "/login" }
    );
}

#[tokio::test]
async fn test_export_of_fetched_tasks() {
    let backend = Arc::new(Backend::default());
    let client = client(&backend);
    client.session().login("me@example.com", "secret").await.unwrap();
    client
        .tasks()
        .create_task(&NewTask::new("Call \"Bob\", today").description("line one\nline two"))
        .await
        .unwrap();

    let snapshot = client.tasks().snapshot();
    let csv = ExportFormat::Csv.render(&snapshot);
    let cards = ExportFormat::Flashcards.render(&snapshot);

    assert!(csv.contains("\"Call \"\"Bob\"\", today\""));
    assert_eq!(
        cards.lines().nth(1),
        Some("\"Call \"\"Bob\"\", today\"\tline one<br>line two")
    );
}
