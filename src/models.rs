// Data models for the todo backend

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Authenticated account, replaced wholesale on every `/auth/me` fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub is_active: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Task priority; `P1` is the most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    P1,
    P2,
    P3,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::P1 => write!(f, "P1"),
            Priority::P2 => write!(f, "P2"),
            Priority::P3 => write!(f, "P3"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "P1" => Ok(Priority::P1),
            "P2" => Ok(Priority::P2),
            "P3" => Ok(Priority::P3),
            other => Err(format!("unknown priority: {} (expected P1, P2 or P3)", other)),
        }
    }
}

/// Reference to a category owned by the category store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Reference to a tag owned by the tag store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRef {
    pub id: i64,
    pub name: String,
}

/// Task record as returned by `/todos/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(rename = "user_id")]
    pub owner_id: i64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub category: Option<CategoryRef>,
    #[serde(default)]
    pub tags: Vec<TagRef>,
}

/// Body of `POST /todos/`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
}

impl NewTask {
    /// New task with the backend's default priority (`P3`)
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            priority: Priority::P3,
            due_date: None,
            category_id: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn due(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }
}

/// Body of `PUT /todos/{id}`; unset fields are left alone by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
}

impl TaskPatch {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Category as owned by the category store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub todo_count: Option<u32>,
}

fn default_color() -> String {
    "#ffffff".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCategory {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTag {
    pub name: String,
}

/// Reply of `/auth/login` and `/auth/refresh`
#[derive(Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Helper function to get current timestamp in milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Backend timestamps come with or without an offset depending on the database;
/// offset-less values are taken as UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => super::serialize(dt, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw))),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_now_ms() {
        let ts = now_ms();
        // Should be reasonable timestamp (after year 2020)
        assert!(ts > 1_600_000_000_000);
    }

    #[test]
    fn test_priority_ordering_and_parse() {
        assert!(Priority::P1 < Priority::P2);
        assert!(Priority::P2 < Priority::P3);
        assert_eq!("p2".parse::<Priority>().unwrap(), Priority::P2);
        assert!("P4".parse::<Priority>().is_err());
        assert_eq!(serde_json::to_string(&Priority::P1).unwrap(), "\"P1\"");
    }

    #[test]
    fn test_task_deserialization_from_backend() {
        let json = r##"{
            "id": 7,
            "title": "Buy milk",
            "description": null,
            "completed": false,
            "user_id": 1,
            "created_at": "2025-03-01T10:15:00.123456",
            "updated_at": null,
            "due_date": "2025-03-05",
            "priority": "P1",
            "category": {"id": 2, "name": "Home", "color": "#ff0000"},
            "tags": [{"id": 1, "name": "errand"}]
        }"##;

        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.id, 7);
        assert_eq!(task.owner_id, 1);
        assert_eq!(task.priority, Some(Priority::P1));
        assert_eq!(task.created_at.hour(), 10);
        assert_eq!(task.due_date.unwrap().day(), 5);
        assert_eq!(task.category.unwrap().name, "Home");
        assert_eq!(task.tags.len(), 1);
    }

    #[test]
    fn test_task_minimal_fields() {
        let json = r#"{"id": 1, "title": "t", "completed": true, "user_id": 3,
                       "created_at": "2025-01-01T00:00:00+03:00"}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert!(task.priority.is_none());
        assert!(task.tags.is_empty());
        assert_eq!(task.created_at.hour(), 21);
    }

    #[test]
    fn test_patch_skips_unset_fields() {
        let patch = TaskPatch::completed(true);
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#"{"completed":true}"#);
        assert!(TaskPatch::default().is_empty());
    }

    #[test]
    fn test_token_pair_debug_is_redacted() {
        let pair = TokenPair {
            access_token: "secret-a".into(),
            refresh_token: "secret-r".into(),
        };
        let out = format!("{:?}", pair);
        assert!(!out.contains("secret"));
    }
}
