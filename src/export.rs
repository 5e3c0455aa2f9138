// Export transformer: tasks to delimited text and flashcards

use crate::models::Task;
use chrono::{NaiveDate, SecondsFormat};
use std::borrow::Cow;

/// Column headers of the tabular export
pub const TABULAR_HEADER: [&str; 7] = [
    "Title",
    "Description",
    "Completed",
    "Priority",
    "Due Date",
    "Created At",
    "Updated At",
];

/// Inline marker replacing line breaks in flashcard fields
pub const LINE_BREAK_MARKER: &str = "<br>";

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Flashcards,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Flashcards => "tsv",
        }
    }

    pub fn render(self, tasks: &[Task]) -> String {
        match self {
            ExportFormat::Csv => to_csv(tasks),
            ExportFormat::Flashcards => to_flashcards(tasks),
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "flashcards" | "anki" | "tsv" => Ok(ExportFormat::Flashcards),
            other => Err(format!("unknown export format: {} (expected csv or flashcards)", other)),
        }
    }
}

/// File name a download would be saved under, e.g. `todos_2025-03-01.csv`
pub fn suggested_filename(format: ExportFormat, date: NaiveDate) -> String {
    let stem = match format {
        ExportFormat::Csv => "todos",
        ExportFormat::Flashcards => "anki",
    };
    format!("{}_{}.{}", stem, date.format("%Y-%m-%d"), format.extension())
}

/// Quote a field when it contains the delimiter, a quote or a line break.
/// Embedded quotes are doubled.
pub fn escape_field(value: &str, delimiter: char) -> Cow<'_, str> {
    let needs_quotes = value.contains(|c: char| c == delimiter || c == '"' || c == '\n' || c == '\r');
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Comma-separated export with CRLF line endings and a header row
pub fn to_csv(tasks: &[Task]) -> String {
    to_delimited(tasks, ',')
}

/// Tabular export with a custom delimiter
pub fn to_delimited(tasks: &[Task], delimiter: char) -> String {
    let separator = delimiter.to_string();
    let mut lines = Vec::with_capacity(tasks.len() + 1);
    lines.push(TABULAR_HEADER.join(separator.as_str()));

    for task in tasks {
        let created = task.created_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let updated = task
            .updated_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        let due = task.due_date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
        let priority = task.priority.map(|p| p.to_string()).unwrap_or_default();
        let completed = task.completed.to_string();

        let fields = [
            task.title.as_str(),
            task.description.as_deref().unwrap_or(""),
            completed.as_str(),
            priority.as_str(),
            due.as_str(),
            created.as_str(),
            updated.as_str(),
        ];
        let row: Vec<Cow<'_, str>> = fields.iter().map(|f| escape_field(f, delimiter)).collect();
        lines.push(row.join(separator.as_str()));
    }

    lines.join("\r\n")
}

/// Two-column Front/Back flashcards, tab-separated, one card per line
pub fn to_flashcards(tasks: &[Task]) -> String {
    let mut lines = Vec::with_capacity(tasks.len() + 1);
    lines.push("Front\tBack".to_string());

    for task in tasks {
        let front = flatten_line_breaks(&task.title);
        let back = flatten_line_breaks(task.description.as_deref().unwrap_or(""));
        lines.push(format!("{}\t{}", escape_field(&front, '\t'), escape_field(&back, '\t')));
    }

    lines.join("\n")
}

fn flatten_line_breaks(value: &str) -> String {
    value.replace('\r', "").replace('\n', LINE_BREAK_MARKER)
}
