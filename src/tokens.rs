// Token store: access/refresh credentials with independent expiries

use crate::models::now_ms;
use eyre::{Context, Result, eyre};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Which credential a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// Fixed storage key
    pub fn key(self) -> &'static str {
        match self {
            TokenKind::Access => "access_token",
            TokenKind::Refresh => "refresh_token",
        }
    }
}

/// Persisted token value with its absolute expiry (ms since epoch)
#[derive(Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub value: String,
    pub expires_at: i64,
}

impl StoredToken {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

impl std::fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Durable key/value backend for tokens
pub trait TokenStorage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<StoredToken>>;
    fn save(&self, key: &str, token: &StoredToken) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// SQLite-backed token storage
pub struct SqliteTokenStorage {
    db: Mutex<Connection>,
}

impl SqliteTokenStorage {
    /// Open or create the token database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create token directory")?;
        }

        let db = Connection::open(path).context("Failed to open token database")?;
        let storage = Self { db: Mutex::new(db) };
        storage.create_schema()?;
        Ok(storage)
    }

    /// In-memory SQLite, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let storage = Self { db: Mutex::new(db) };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<()> {
        debug!("Creating token schema");
        self.db.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tokens (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl TokenStorage for SqliteTokenStorage {
    fn load(&self, key: &str) -> Result<Option<StoredToken>> {
        let db = self.db.lock();
        let row = db
            .query_row(
                "SELECT value, expires_at FROM tokens WHERE name = ?1",
                [key],
                |row| {
                    Ok(StoredToken {
                        value: row.get(0)?,
                        expires_at: row.get(1)?,
                    })
                },
            )
            .optional()
            .context("Failed to read token")?;
        Ok(row)
    }

    fn save(&self, key: &str, token: &StoredToken) -> Result<()> {
        self.db
            .lock()
            .execute(
                "INSERT OR REPLACE INTO tokens (name, value, expires_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![key, token.value, token.expires_at],
            )
            .context("Failed to write token")?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db
            .lock()
            .execute("DELETE FROM tokens WHERE name = ?1", [key])
            .context("Failed to delete token")?;
        Ok(())
    }
}

/// Process-local storage, gone when the process exits
#[derive(Default)]
pub struct MemoryTokenStorage {
    entries: Mutex<HashMap<String, StoredToken>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self, key: &str) -> Result<Option<StoredToken>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, token: &StoredToken) -> Result<()> {
        self.entries.lock().insert(key.to_string(), token.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Opaque token get/set over a storage backend, honoring expiry
pub struct TokenStore {
    storage: Box<dyn TokenStorage>,
}

impl TokenStore {
    pub fn new(storage: Box<dyn TokenStorage>) -> Self {
        Self { storage }
    }

    /// Current value, or `None` when absent or expired. Expired entries are purged.
    pub fn get(&self, kind: TokenKind) -> Option<String> {
        let stored = match self.storage.load(kind.key()) {
            Ok(stored) => stored?,
            Err(e) => {
                warn!(key = kind.key(), error = ?e, "Failed to load token");
                return None;
            }
        };

        if stored.is_expired(now_ms()) {
            debug!(key = kind.key(), "Token expired in storage, purging");
            if let Err(e) = self.storage.remove(kind.key()) {
                warn!(key = kind.key(), error = ?e, "Failed to purge expired token");
            }
            return None;
        }

        Some(stored.value)
    }

    /// Persist `value` for `ttl`; `None` removes the persisted entry
    pub fn set(&self, kind: TokenKind, value: Option<&str>, ttl: Duration) -> Result<()> {
        match value {
            Some(value) => {
                let ttl_ms = i64::try_from(ttl.as_millis()).map_err(|_| eyre!("Token TTL too large: {:?}", ttl))?;
                let token = StoredToken {
                    value: value.to_string(),
                    expires_at: now_ms().saturating_add(ttl_ms),
                };
                self.storage.save(kind.key(), &token)
            }
            None => self.storage.remove(kind.key()),
        }
    }
}
