// Query engine: fuzzy text search, priority filter and stable multi-key sort

use crate::fuzzy::{EditDistanceScorer, Scorer};
use crate::models::{Priority, Task};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Presentation order requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Ascending due date, undated last
    Due,
    /// Ascending creation time
    Created,
    /// P1, P2, P3, then unset
    Priority,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Due => write!(f, "due"),
            SortKey::Created => write!(f, "created"),
            SortKey::Priority => write!(f, "priority"),
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "due" => Ok(SortKey::Due),
            "created" => Ok(SortKey::Created),
            "priority" => Ok(SortKey::Priority),
            other => Err(format!("unknown sort key: {} (expected due, created or priority)", other)),
        }
    }
}

/// Search, filter and sort parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskQuery {
    pub text: String,
    pub priorities: HashSet<Priority>,
    pub sort: Option<SortKey>,
}

impl TaskQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priorities.insert(priority);
        self
    }

    pub fn priorities(mut self, priorities: impl IntoIterator<Item = Priority>) -> Self {
        self.priorities.extend(priorities);
        self
    }

    pub fn sort(mut self, sort: SortKey) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// Run `query` with the default typo-tolerant scorer
pub fn query<'a>(tasks: &'a [Task], query: &TaskQuery) -> Vec<&'a Task> {
    query_with(tasks, query, &EditDistanceScorer::default())
}

/// Filter by text, then by priority, then sort.
///
/// Text matches come back best-first; a sort key replaces that relevance
/// order. Without text or sort the input order is kept.
pub fn query_with<'a>(tasks: &'a [Task], query: &TaskQuery, scorer: &dyn Scorer) -> Vec<&'a Task> {
    let text = query.text.trim();

    let mut result: Vec<&Task> = if text.is_empty() {
        tasks.iter().collect()
    } else {
        let mut scored: Vec<(f64, &Task)> = tasks
            .iter()
            .filter_map(|task| relevance(task, text, scorer).map(|score| (score, task)))
            .collect();
        // Stable: equally relevant tasks keep input order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.into_iter().map(|(_, task)| task).collect()
    };

    if !query.priorities.is_empty() {
        result.retain(|task| task.priority.is_some_and(|p| query.priorities.contains(&p)));
    }

    if let Some(key) = query.sort {
        result.sort_by(|a, b| compare(a, b, key));
    }

    result
}

/// Best score over title, description, category name and tag names
pub fn relevance(task: &Task, text: &str, scorer: &dyn Scorer) -> Option<f64> {
    let fields = std::iter::once(task.title.as_str())
        .chain(task.description.as_deref())
        .chain(task.category.as_ref().map(|c| c.name.as_str()))
        .chain(task.tags.iter().map(|t| t.name.as_str()));

    fields
        .filter_map(|field| scorer.score(text, field))
        .fold(None, |best: Option<f64>, score| Some(best.map_or(score, |b| b.max(score))))
}

/// Ordering for one sort key; unset values sort last
pub fn compare(a: &Task, b: &Task, key: SortKey) -> Ordering {
    match key {
        SortKey::Due => last_if_none(a.due_date, b.due_date),
        SortKey::Created => a.created_at.cmp(&b.created_at),
        SortKey::Priority => last_if_none(a.priority, b.priority),
    }
}

fn last_if_none<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
