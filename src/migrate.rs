//! Load-time migration of persisted tasks.
//!
//! Older builds wrote tasks without tags, priority or timestamps, and wrote
//! empty strings for unset dates. Every stored task is read in the loose
//! [`StoredTask`] shape and brought up to [`TASK_SCHEMA_VERSION`] once, when
//! the board loads.
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::{Priority, Task};

/// Schema version stamped on every task written by this crate.
pub const TASK_SCHEMA_VERSION: u32 = 1;

/// Column a task lands in when it was stored without one.
const FALLBACK_STATUS: &str = "todo";

/// A task as found in storage, any version.
///
/// Fields are kept as raw JSON so that a value of an unexpected type (a
/// numeric id, a priority written as a number) degrades to a default
/// instead of failing the whole record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoredTask {
    pub id: Option<Value>,
    pub title: Option<Value>,
    pub description: Option<Value>,
    pub status: Option<Value>,
    pub tags: Option<Value>,
    pub start_date: Option<Value>,
    pub end_date: Option<Value>,
    pub priority: Option<Value>,
    pub created_at: Option<Value>,
    pub updated_at: Option<Value>,
    pub schema_version: Option<Value>,
}

/// Result of reading a stored task array.
#[derive(Debug, Clone, Default)]
pub struct MigratedTasks {
    /// Tasks brought up to the current schema, in stored order.
    pub tasks: Vec<Task>,
    /// Entries that could not be read as a task, exactly as stored.
    pub unreadable: Vec<Value>,
}

/// Brings one stored task up to the current schema.
///
/// Returns `None` for records that have no id and therefore cannot be
/// addressed.
pub fn migrate_task(stored: StoredTask, now: DateTime<Utc>) -> Option<Task> {
    let id = text(stored.id).filter(|id| !id.trim().is_empty())?;
    let version = stored
        .schema_version
        .as_ref()
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if version < u64::from(TASK_SCHEMA_VERSION) {
        debug!("Migrating task {} from schema v{}", id, version);
    }

    let created_at = parse_timestamp(stored.created_at.as_ref()).unwrap_or(now);
    let updated_at = parse_timestamp(stored.updated_at.as_ref())
        .unwrap_or(now)
        .max(created_at);

    let priority = match text(stored.priority) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Task {} has unknown priority '{}', using medium", id, raw);
            Priority::Medium
        }),
        None => Priority::Medium,
    };

    let tags = match stored.tags {
        Some(Value::Array(items)) => items.into_iter().filter_map(|t| text(Some(t))).collect(),
        Some(Value::String(tag)) if !tag.trim().is_empty() => vec![tag],
        _ => Vec::new(),
    };

    Some(Task {
        title: text(stored.title).unwrap_or_default(),
        description: text(stored.description).unwrap_or_default(),
        status: text(stored.status).unwrap_or_else(|| FALLBACK_STATUS.to_string()),
        tags,
        start_date: parse_date(stored.start_date.as_ref()),
        end_date: parse_date(stored.end_date.as_ref()),
        priority,
        created_at,
        updated_at,
        schema_version: TASK_SCHEMA_VERSION,
        id,
    })
}

/// Parses a stored task array, migrating each entry.
///
/// Entries that are not objects or lack an id are kept aside, untouched, in
/// [`MigratedTasks::unreadable`] so that they can be written back.
pub fn migrate_tasks(raw: &str, now: DateTime<Utc>) -> serde_json::Result<MigratedTasks> {
    let values: Vec<Value> = serde_json::from_str(raw)?;
    let mut migrated = MigratedTasks::default();

    for value in values {
        let task = serde_json::from_value::<StoredTask>(value.clone())
            .ok()
            .and_then(|stored| migrate_task(stored, now));
        match task {
            Some(task) => migrated.tasks.push(task),
            None => {
                warn!("Keeping stored task entry that cannot be read: {}", value);
                migrated.unreadable.push(value);
            }
        }
    }

    if !migrated.unreadable.is_empty() {
        warn!(
            "{} of {} stored tasks could not be read",
            migrated.unreadable.len(),
            migrated.unreadable.len() + migrated.tasks.len()
        );
    }
    Ok(migrated)
}

/// Strings as-is, numbers and booleans in their JSON spelling.
fn text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// RFC 3339 strings or epoch milliseconds.
fn parse_timestamp(raw: Option<&Value>) -> Option<DateTime<Utc>> {
    match raw? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|t| t.with_timezone(&Utc))
            .ok(),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// Accepts `YYYY-MM-DD` and full timestamps; empty strings mean unset.
fn parse_date(raw: Option<&Value>) -> Option<NaiveDate> {
    let raw = raw?;
    if let Some(s) = raw.as_str() {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Some(date);
        }
    }
    parse_timestamp(Some(raw)).map(|t| t.date_naive()).or_else(|| {
        warn!("Ignoring unparseable date {}", raw);
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn legacy_task_gets_defaults() {
        let raw = r#"[{"id":"1","title":"old","description":"","status":"done","startDate":""}]"#;
        let tasks = migrate_tasks(raw, now()).unwrap().tasks;

        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert!(task.tags.is_empty());
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.created_at, now());
        assert_eq!(task.updated_at, now());
        assert_eq!(task.start_date, None);
        assert_eq!(task.status, "done");
        assert_eq!(task.schema_version, TASK_SCHEMA_VERSION);
    }

    #[test]
    fn current_task_passes_through() {
        let raw = r#"[{
            "id": "1700000000000",
            "title": "ship",
            "description": "<p>x</p>",
            "status": "inprogress",
            "tags": ["release"],
            "startDate": "2024-02-01",
            "endDate": "2024-02-10T00:00:00.000Z",
            "priority": "high",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-05T00:00:00Z",
            "schemaVersion": 1
        }]"#;
        let task = migrate_tasks(raw, now()).unwrap().tasks.remove(0);

        assert_eq!(task.tags, ["release"]);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.start_date, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(task.end_date, NaiveDate::from_ymd_opt(2024, 2, 10));
        assert_eq!(
            task.created_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn entries_without_ids_or_shape_are_kept_aside() {
        let raw = r#"[{"title":"no id"}, 42, {"id":"2","tags":null}]"#;
        let migrated = migrate_tasks(raw, now()).unwrap();
        assert_eq!(migrated.tasks.len(), 1);
        assert_eq!(migrated.tasks[0].id, "2");
        assert_eq!(migrated.tasks[0].status, "todo");
        assert_eq!(
            migrated.unreadable,
            vec![serde_json::json!({"title": "no id"}), serde_json::json!(42)]
        );
    }

    #[test]
    fn loosely_typed_fields_are_coerced() {
        let raw = r#"[{
            "id": 1700000000000,
            "title": "numeric id",
            "status": "done",
            "priority": 3,
            "tags": ["ok", 7, null, {"x": 1}],
            "createdAt": 1700000000000,
            "updatedAt": "garbage",
            "startDate": 1706745600000,
            "schemaVersion": "1"
        }]"#;
        let migrated = migrate_tasks(raw, now()).unwrap();
        assert!(migrated.unreadable.is_empty());

        let task = &migrated.tasks[0];
        assert_eq!(task.id, "1700000000000");
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.tags, ["ok", "7"]);
        assert_eq!(task.created_at, Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());
        assert_eq!(task.updated_at, now());
        assert_eq!(task.start_date, NaiveDate::from_ymd_opt(2024, 2, 1));
    }

    #[test]
    fn non_array_is_an_error() {
        assert!(migrate_tasks("{}", now()).is_err());
    }
}
