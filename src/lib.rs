// todo-client - Session-aware client for the todo REST backend

pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod fuzzy;
pub mod http;
pub mod models;
pub mod query;
pub mod record;
pub mod session;
pub mod store;
pub mod tokens;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use client::TodoClient;
pub use config::ClientConfig;
pub use error::{ApiError, ApiResult};
pub use export::{ExportFormat, suggested_filename, to_csv, to_flashcards};
pub use fuzzy::{EditDistanceScorer, Scorer, SubsequenceScorer};
pub use crate::http::{ApiRequest, ApiResponse, HttpClient, ReqwestClient};
pub use models::{Category, NewTask, Priority, Tag, Task, TaskPatch, User, now_ms};
pub use query::{SortKey, TaskQuery};
pub use record::{Collection, Record};
pub use session::{Navigation, Session, SessionEvent, SessionManager, SessionPhase};
pub use store::{CategoryStore, Store, TagStore, TaskStore};
pub use tokens::{MemoryTokenStorage, SqliteTokenStorage, TokenStorage};
