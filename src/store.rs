// Remote collection store: confirm-then-apply CRUD over a session-authorized backend

use crate::error::{ApiError, ApiResult};
use crate::http::ApiRequest;
use crate::models::{Category, CategoryPatch, NewCategory, NewTag, NewTask, Tag, Task, TaskPatch};
use crate::query::{self, TaskQuery};
use crate::record::{Collection, Record};
use crate::session::{SessionListener, SessionManager};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Snapshot of a store's observable state
#[derive(Debug, Clone)]
pub struct StoreState<T: Record> {
    pub items: Collection<T>,
    pub loading: bool,
    pub last_error: Option<String>,
}

impl<T: Record> Default for StoreState<T> {
    fn default() -> Self {
        Self {
            items: Collection::new(),
            loading: false,
            last_error: None,
        }
    }
}

/// In-memory set of server-owned records.
///
/// Every mutation waits for the backend to confirm before touching local
/// state; a failed call leaves the set exactly as it was and records a
/// human-readable message on `last_error`.
pub struct Store<T: Record> {
    session: Arc<SessionManager>,
    state: RwLock<StoreState<T>>,
}

pub type TaskStore = Store<Task>;
pub type CategoryStore = Store<Category>;
pub type TagStore = Store<Tag>;

impl<T: Record> Store<T> {
    /// Create a store and register it to be cleared when the session ends
    pub fn new(session: Arc<SessionManager>) -> Arc<Self> {
        let store = Arc::new(Self {
            session: session.clone(),
            state: RwLock::new(StoreState::default()),
        });
        let listener: Arc<dyn SessionListener> = store.clone();
        session.add_listener(Arc::downgrade(&listener));
        store
    }

    // ========================================================================
    // Read-only views
    // ========================================================================

    pub fn snapshot(&self) -> Vec<T> {
        self.state.read().items.as_slice().to_vec()
    }

    pub fn state(&self) -> StoreState<T> {
        self.state.read().clone()
    }

    pub fn get(&self, id: i64) -> Option<T> {
        self.state.read().items.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().items.is_empty()
    }

    pub fn loading(&self) -> bool {
        self.state.read().loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.read().last_error.clone()
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.items.clear();
        state.loading = false;
        state.last_error = None;
    }

    // ========================================================================
    // Backend operations
    // ========================================================================

    /// Replace the whole set with the server's list. On failure the previous
    /// set is kept.
    pub async fn fetch_all(&self) -> ApiResult<usize> {
        let (_, plural) = T::nouns();
        {
            let mut state = self.state.write();
            state.loading = true;
            state.last_error = None;
        }

        let result = self.session.call::<Vec<T>>(ApiRequest::get(T::collection_path())).await;

        let mut state = self.state.write();
        state.loading = false;
        match result {
            Ok(records) => {
                state.items.replace_all(records);
                debug!(collection = plural, count = state.items.len(), "fetch_all: replaced collection");
                Ok(state.items.len())
            }
            Err(e) => {
                let message = e.message_or(&format!("Failed to fetch {}", plural));
                warn!(collection = plural, error = %e, "fetch_all: failed");
                state.last_error = Some(message);
                Err(e)
            }
        }
    }

    /// Create on the server, then insert the returned record
    pub async fn create<B: Serialize>(&self, body: &B) -> ApiResult<T> {
        let (noun, _) = T::nouns();
        let result = async {
            let request = ApiRequest::post(T::collection_path()).json(body)?;
            self.session.call::<T>(request).await
        }
        .await;

        let record = self.settle(result, &format!("Failed to create {}", noun))?;
        info!(collection = T::collection_path(), id = record.id(), "Record created");
        self.state.write().items.insert(record.clone());
        Ok(record)
    }

    /// Send a partial update, then replace the local copy by id
    pub async fn update<B: Serialize>(&self, id: i64, patch: &B) -> ApiResult<T> {
        let (noun, _) = T::nouns();
        let result = async {
            let request = ApiRequest::put(T::item_path(id)).json(patch)?;
            self.session.call::<T>(request).await
        }
        .await;

        let record = self.settle(result, &format!("Failed to update {}", noun))?;
        if !self.state.write().items.replace(record.clone()) {
            debug!(id, "update: record not held locally, nothing to replace");
        }
        Ok(record)
    }

    /// Delete on the server, then drop the local copy. Returns the deleted
    /// record as reported by the server.
    pub async fn delete(&self, id: i64) -> ApiResult<T> {
        self.delete_request(id, ApiRequest::delete(T::item_path(id))).await
    }

    async fn delete_request(&self, id: i64, request: ApiRequest) -> ApiResult<T> {
        let (noun, _) = T::nouns();
        let result = self.session.call::<T>(request).await;

        let deleted = self.settle(result, &format!("Failed to delete {}", noun))?;
        self.state.write().items.remove(id);
        info!(collection = T::collection_path(), id, "Record deleted");
        Ok(deleted)
    }

    /// Set or clear `last_error` from the outcome and hand the result back
    fn settle<R>(&self, result: ApiResult<R>, fallback: &str) -> ApiResult<R> {
        let message = result.as_ref().err().map(|e| {
            warn!(error = %e, "{}", fallback);
            e.message_or(fallback)
        });
        self.state.write().last_error = message;
        result
    }
}

impl<T: Record> SessionListener for Store<T> {
    fn on_session_end(&self) {
        debug!(collection = T::collection_path(), "Session ended, clearing store");
        self.clear();
    }
}

// ============================================================================
// Tasks
// ============================================================================

impl Store<Task> {
    pub async fn create_task(&self, task: &NewTask) -> ApiResult<Task> {
        self.create(task).await
    }

    pub async fn update_task(&self, id: i64, patch: &TaskPatch) -> ApiResult<Task> {
        self.update(id, patch).await
    }

    /// Flip `completed`; fails without a request when `id` is not held
    pub async fn toggle_complete(&self, id: i64) -> ApiResult<Task> {
        let current = match self.get(id) {
            Some(task) => task,
            None => {
                let err = ApiError::Precondition("Todo not found".to_string());
                self.state.write().last_error = Some(err.to_string());
                return Err(err);
            }
        };
        self.update(id, &TaskPatch::completed(!current.completed)).await
    }

    /// Run the query engine over the current snapshot
    pub fn query(&self, params: &TaskQuery) -> Vec<Task> {
        let state = self.state.read();
        query::query(state.items.as_slice(), params).into_iter().cloned().collect()
    }

    pub fn completed(&self) -> Vec<Task> {
        self.filtered(|t| t.completed)
    }

    pub fn incomplete(&self) -> Vec<Task> {
        self.filtered(|t| !t.completed)
    }

    pub fn total(&self) -> usize {
        self.len()
    }

    /// `(pending, completed)`
    pub fn by_status(&self) -> (Vec<Task>, Vec<Task>) {
        self.snapshot().into_iter().partition(|t| !t.completed)
    }

    /// Incomplete first, newest first within each group
    pub fn dashboard(&self) -> Vec<Task> {
        let mut tasks = self.snapshot();
        tasks.sort_by(|a, b| {
            a.completed
                .cmp(&b.completed)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        tasks
    }

    fn filtered(&self, keep: impl Fn(&Task) -> bool) -> Vec<Task> {
        self.state.read().items.iter().filter(|t| keep(t)).cloned().collect()
    }
}

// ============================================================================
// Categories and tags
// ============================================================================

impl Store<Category> {
    pub async fn create_category(&self, name: &str, color: &str) -> ApiResult<Category> {
        self.create(&NewCategory {
            name: name.to_string(),
            color: color.to_string(),
        })
        .await
    }

    pub async fn update_category(&self, id: i64, patch: &CategoryPatch) -> ApiResult<Category> {
        self.update(id, patch).await
    }

    /// Delete, moving the category's tasks to `reassign_to` when given
    pub async fn delete_category(&self, id: i64, reassign_to: Option<i64>) -> ApiResult<Category> {
        let mut request = ApiRequest::delete(Category::item_path(id));
        if let Some(target) = reassign_to {
            request = request.query("new_category_id", target);
        }
        self.delete_request(id, request).await
    }
}

impl Store<Tag> {
    pub async fn create_tag(&self, name: &str) -> ApiResult<Tag> {
        self.create(&NewTag { name: name.to_string() }).await
    }
}
