// Process-wide facade wiring the session and the record stores together

use crate::config::ClientConfig;
use crate::http::{HttpClient, ReqwestClient};
use crate::session::SessionManager;
use crate::store::{CategoryStore, TagStore, TaskStore};
use crate::tokens::{SqliteTokenStorage, TokenStorage, TokenStore};
use eyre::Result;
use std::sync::Arc;
use tracing::info;

/// One session plus the task, category and tag stores bound to it.
///
/// The stores register with the session on construction, so a logout
/// empties all of them before `logout()` returns.
pub struct TodoClient {
    session: Arc<SessionManager>,
    tasks: Arc<TaskStore>,
    categories: Arc<CategoryStore>,
    tags: Arc<TagStore>,
}

impl TodoClient {
    pub fn new(config: &ClientConfig, http: Arc<dyn HttpClient>, storage: Box<dyn TokenStorage>) -> Self {
        let tokens = TokenStore::new(storage);
        let session = Arc::new(SessionManager::new(http, tokens, config.token_lifetimes()));
        Self {
            tasks: TaskStore::new(session.clone()),
            categories: CategoryStore::new(session.clone()),
            tags: TagStore::new(session.clone()),
            session,
        }
    }

    /// Production wiring: reqwest transport and SQLite token storage under
    /// `config.data_dir`
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let storage = SqliteTokenStorage::open(config.tokens_path())?;
        Ok(Self::with_storage(config, Box::new(storage)))
    }

    /// Reqwest transport with caller-supplied token storage
    pub fn with_storage(config: &ClientConfig, storage: Box<dyn TokenStorage>) -> Self {
        info!(api_base = %config.api_base, "Creating client");
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new(config.api_base.clone()));
        Self::new(config, http, storage)
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn tasks(&self) -> &Arc<TaskStore> {
        &self.tasks
    }

    pub fn categories(&self) -> &Arc<CategoryStore> {
        &self.categories
    }

    pub fn tags(&self) -> &Arc<TagStore> {
        &self.tags
    }
}
