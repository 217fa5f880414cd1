//! Board entities: tasks and the columns they sit in.
use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{migrate::TASK_SCHEMA_VERSION, DevkitError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        };
        f.write_str(name)
    }
}

impl FromStr for Priority {
    type Err = DevkitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(DevkitError::InvalidFormat {
                message: format!("unknown priority '{}'", other),
            }),
        }
    }
}

/// A card on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    /// HTML body
    pub description: String,
    /// Id of the column the task sits in
    pub status: String,
    pub tags: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u32,
}

impl Task {
    pub fn from_draft(id: String, now: DateTime<Utc>, draft: TaskDraft) -> Self {
        Task {
            id,
            title: draft.title,
            description: draft.description,
            status: draft.status,
            tags: draft.tags,
            start_date: draft.start_date,
            end_date: draft.end_date,
            priority: draft.priority,
            created_at: now,
            updated_at: now,
            schema_version: TASK_SCHEMA_VERSION,
        }
    }

    /// Shallow-merges the present fields of `patch`.
    pub fn apply_patch(&mut self, patch: TaskPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(start_date) = patch.start_date {
            self.start_date = start_date;
        }
        if let Some(end_date) = patch.end_date {
            self.end_date = end_date;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
    }
}

/// Fields needed to create a task.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub status: String,
    pub tags: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub priority: Priority,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: status.into(),
            ..Self::default()
        }
    }
}

/// Partial task update. Dates use a nested option so they can be cleared.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
    pub priority: Option<Priority>,
}

/// A lane on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Style class token, e.g. `bg-blue-100`
    #[serde(default)]
    pub color: String,
}

impl Column {
    pub fn new(id: impl Into<String>, title: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            color: color.into(),
        }
    }
}

/// The columns a fresh board starts with.
pub fn default_columns() -> Vec<Column> {
    vec![
        Column::new("todo", "To Do", "bg-gray-100"),
        Column::new("inprogress", "In Progress", "bg-yellow-100"),
        Column::new("done", "Done", "bg-green-100"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!(Priority::default().to_string(), "medium");
    }

    #[test]
    fn patch_can_clear_dates() {
        let now = Utc::now();
        let mut task = Task::from_draft(
            "1".into(),
            now,
            TaskDraft {
                start_date: NaiveDate::from_ymd_opt(2024, 1, 2),
                ..TaskDraft::new("t", "todo")
            },
        );
        task.apply_patch(TaskPatch {
            start_date: Some(None),
            priority: Some(Priority::Low),
            ..TaskPatch::default()
        });
        assert_eq!(task.start_date, None);
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(task.title, "t");
    }

    #[test]
    fn default_columns_are_seeded_in_order() {
        let ids: Vec<String> = default_columns().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, ["todo", "inprogress", "done"]);
    }
}
