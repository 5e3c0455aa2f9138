// Generic record trait and the in-memory collection backing each remote store

use crate::models::{Category, Tag, Task};
use serde::de::DeserializeOwned;

/// Core trait that any server-owned record must implement
pub trait Record: DeserializeOwned + Clone + Send + Sync + 'static {
    /// Server-assigned identifier
    fn id(&self) -> i64;

    /// Collection endpoint with trailing slash, e.g. "/todos/"
    fn collection_path() -> &'static str
    where
        Self: Sized;

    /// Singular and plural nouns used in fallback error messages
    fn nouns() -> (&'static str, &'static str)
    where
        Self: Sized;

    /// Whether newly created records go to the head of the collection
    fn newest_first() -> bool
    where
        Self: Sized,
    {
        false
    }

    /// Endpoint for a single record
    fn item_path(id: i64) -> String
    where
        Self: Sized,
    {
        format!("{}{}", Self::collection_path(), id)
    }
}

impl Record for Task {
    fn id(&self) -> i64 {
        self.id
    }

    fn collection_path() -> &'static str {
        "/todos/"
    }

    fn nouns() -> (&'static str, &'static str) {
        ("todo", "todos")
    }

    fn newest_first() -> bool {
        true
    }
}

impl Record for Category {
    fn id(&self) -> i64 {
        self.id
    }

    fn collection_path() -> &'static str {
        "/categories/"
    }

    fn nouns() -> (&'static str, &'static str) {
        ("category", "categories")
    }
}

impl Record for Tag {
    fn id(&self) -> i64 {
        self.id
    }

    fn collection_path() -> &'static str {
        "/tags/"
    }

    fn nouns() -> (&'static str, &'static str) {
        ("tag", "tags")
    }
}

/// Order-preserving set of records, unique by id
#[derive(Debug, Clone)]
pub struct Collection<T: Record> {
    items: Vec<T>,
}

impl<T: Record> Default for Collection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Record> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything; a repeated id keeps its first position and last value
    pub fn replace_all(&mut self, records: Vec<T>) {
        let mut items: Vec<T> = Vec::with_capacity(records.len());
        for record in records {
            match items.iter_mut().find(|r| r.id() == record.id()) {
                Some(existing) => *existing = record,
                None => items.push(record),
            }
        }
        self.items = items;
    }

    /// Insert a fresh record, evicting any stale copy with the same id
    pub fn insert(&mut self, record: T) {
        self.items.retain(|r| r.id() != record.id());
        if T::newest_first() {
            self.items.insert(0, record);
        } else {
            self.items.push(record);
        }
    }

    /// Replace in place by id; returns false when the id is not held
    pub fn replace(&mut self, record: T) -> bool {
        match self.items.iter_mut().find(|r| r.id() == record.id()) {
            Some(existing) => {
                *existing = record;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: i64) -> Option<T> {
        let index = self.items.iter().position(|r| r.id() == id)?;
        Some(self.items.remove(index))
    }

    pub fn get(&self, id: i64) -> Option<&T> {
        self.items.iter().find(|r| r.id() == id)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}
