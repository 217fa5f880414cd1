//! Task board: columns, tasks and the drag gesture that moves tasks around.
//!
//! Board mutations are computed on a copy, written to storage and only then
//! committed to the in-memory collections, so a failed write leaves the
//! board as it was.
use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use serde::Serialize;
use serde_json::Value;

use crate::{
    default_columns,
    ids::{next_update_time, Clock, IdGenerator, SystemClock},
    migrate::{migrate_tasks, MigratedTasks},
    Column, KeyValueStore, Result, Task, TaskDraft, TaskPatch, WriteOp, COLUMNS_KEY, TASKS_KEY,
};

/// Where the drag gesture currently is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        active_task: String,
    },
}

/// What the dragged task is hovering over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    Column(String),
    Task(String),
}

/// The board and its persistence.
pub struct Board {
    port: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ids: IdGenerator,
    tasks: Vec<Task>,
    columns: Vec<Column>,
    /// Stored entries that could not be read, written back after the
    /// readable ones on every save.
    unreadable_tasks: Vec<Value>,
    unreadable_columns: Vec<Value>,
    drag: DragState,
}

impl Board {
    /// Loads the board from `port`, stamping changes with the wall clock.
    pub fn load(port: Arc<dyn KeyValueStore>) -> Self {
        Self::load_with_clock(port, Arc::new(SystemClock))
    }

    /// Loads the board from `port`.
    ///
    /// Missing or unreadable columns fall back to the default set, missing or
    /// unreadable tasks to an empty board. Stored tasks are migrated to the
    /// current schema.
    pub fn load_with_clock(port: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();

        let migrated = match read_key(port.as_ref(), TASKS_KEY) {
            Some(raw) => migrate_tasks(&raw, now).unwrap_or_else(|e| {
                warn!("Stored tasks are corrupt, starting empty: {}", e);
                MigratedTasks::default()
            }),
            None => MigratedTasks::default(),
        };
        let MigratedTasks {
            tasks,
            unreadable: unreadable_tasks,
        } = migrated;

        let (columns, unreadable_columns) = match read_key(port.as_ref(), COLUMNS_KEY) {
            Some(raw) => read_columns(&raw).unwrap_or_else(|e| {
                warn!("Stored columns are corrupt, using defaults: {}", e);
                (default_columns(), Vec::new())
            }),
            None => (default_columns(), Vec::new()),
        };

        let ids = IdGenerator::new();
        ids.observe(tasks.iter().map(|t| t.id.as_str()));
        ids.observe(columns.iter().map(|c| c.id.as_str()));
        ids.observe(
            unreadable_tasks
                .iter()
                .chain(&unreadable_columns)
                .filter_map(|v| v.get("id").and_then(Value::as_str)),
        );

        info!(
            "Loaded board with {} columns and {} tasks",
            columns.len(),
            tasks.len()
        );

        Self {
            port,
            clock,
            ids,
            tasks,
            columns,
            unreadable_tasks,
            unreadable_columns,
            drag: DragState::Idle,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn column(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Tasks of one column, in board order.
    pub fn tasks_in(&self, column_id: &str) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.status == column_id).collect()
    }

    pub fn drag_state(&self) -> &DragState {
        &self.drag
    }

    /// The task being dragged, if a gesture is in progress.
    pub fn active_task(&self) -> Option<&Task> {
        match &self.drag {
            DragState::Dragging { active_task } => self.task(active_task),
            DragState::Idle => None,
        }
    }

    pub fn add_column(&mut self, title: &str, color: &str) -> Result<Column> {
        let column = Column::new(self.ids.next_id(self.clock.now()), title, color);

        let mut columns = self.columns.clone();
        columns.push(column.clone());
        self.commit_columns(columns)?;

        info!("Added column {} ({})", column.id, column.title);
        Ok(column)
    }

    /// Renames or recolors a column.
    pub fn update_column(
        &mut self,
        id: &str,
        title: Option<&str>,
        color: Option<&str>,
    ) -> Result<Option<Column>> {
        let mut columns = self.columns.clone();
        let Some(column) = columns.iter_mut().find(|c| c.id == id) else {
            debug!("Cannot update column {}: not found", id);
            return Ok(None);
        };
        if let Some(title) = title {
            column.title = title.to_string();
        }
        if let Some(color) = color {
            column.color = color.to_string();
        }
        let updated = column.clone();

        self.commit_columns(columns)?;
        info!("Updated column {}", id);
        Ok(Some(updated))
    }

    /// Deletes a column together with every task in it.
    ///
    /// Both collections are written in one batch.
    pub fn delete_column(&mut self, id: &str) -> Result<bool> {
        if self.column(id).is_none() {
            debug!("Cannot delete column {}: not found", id);
            return Ok(false);
        }

        let columns: Vec<Column> = self.columns.iter().filter(|c| c.id != id).cloned().collect();
        let tasks: Vec<Task> = self.tasks.iter().filter(|t| t.status != id).cloned().collect();
        let removed_tasks = self.tasks.len() - tasks.len();

        let batch = vec![
            WriteOp::set(TASKS_KEY, encode(&tasks, &self.unreadable_tasks)?),
            WriteOp::set(COLUMNS_KEY, encode(&columns, &self.unreadable_columns)?),
        ];
        self.port.apply_batch(batch).map_err(|e| {
            error!("Failed to persist deletion of column {}: {}", id, e);
            e
        })?;

        self.tasks = tasks;
        self.columns = columns;
        if self.active_task().is_none() {
            self.drag = DragState::Idle;
        }

        info!("Deleted column {} and {} of its tasks", id, removed_tasks);
        Ok(true)
    }

    /// Appends a new task to the end of the board.
    pub fn add_task(&mut self, draft: TaskDraft) -> Result<Task> {
        if self.column(&draft.status).is_none() {
            warn!("Adding task to unknown column '{}'", draft.status);
        }

        let now = self.clock.now();
        let task = Task::from_draft(self.ids.next_id(now), now, draft);

        let mut tasks = self.tasks.clone();
        tasks.push(task.clone());
        self.commit_tasks(tasks)?;

        info!("Added task {} to {}", task.id, task.status);
        Ok(task)
    }

    pub fn update_task(&mut self, id: &str, patch: TaskPatch) -> Result<Option<Task>> {
        let now = self.clock.now();
        let mut tasks = self.tasks.clone();
        let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
            debug!("Cannot update task {}: not found", id);
            return Ok(None);
        };
        task.apply_patch(patch);
        task.updated_at = next_update_time(now, task.updated_at);
        let updated = task.clone();

        self.commit_tasks(tasks)?;
        info!("Updated task {}", id);
        Ok(Some(updated))
    }

    pub fn delete_task(&mut self, id: &str) -> Result<bool> {
        let tasks: Vec<Task> = self.tasks.iter().filter(|t| t.id != id).cloned().collect();
        if tasks.len() == self.tasks.len() {
            debug!("Cannot delete task {}: not found", id);
            return Ok(false);
        }

        self.commit_tasks(tasks)?;
        if self.active_task().is_none() {
            self.drag = DragState::Idle;
        }
        info!("Deleted task {}", id);
        Ok(true)
    }

    /// Puts a task into another column without changing its position.
    ///
    /// Returns `false` when the task or column is unknown or the task is
    /// already there.
    pub fn move_task(&mut self, id: &str, column_id: &str) -> Result<bool> {
        if self.column(column_id).is_none() {
            debug!("Cannot move task {}: column {} not found", id, column_id);
            return Ok(false);
        }
        match self.task(id) {
            Some(task) if task.status != column_id => {}
            Some(_) => return Ok(false),
            None => {
                debug!("Cannot move task {}: not found", id);
                return Ok(false);
            }
        }

        let patch = TaskPatch {
            status: Some(column_id.to_string()),
            ..TaskPatch::default()
        };
        Ok(self.update_task(id, patch)?.is_some())
    }

    /// Maps a raw drop id onto a task or column. Tasks win on a clash.
    pub fn resolve_target(&self, id: &str) -> Option<DropTarget> {
        if self.task(id).is_some() {
            Some(DropTarget::Task(id.to_string()))
        } else if self.column(id).is_some() {
            Some(DropTarget::Column(id.to_string()))
        } else {
            None
        }
    }

    /// Starts dragging `task_id`. Unknown tasks leave the board idle.
    pub fn drag_start(&mut self, task_id: &str) -> bool {
        if self.task(task_id).is_none() {
            debug!("Ignoring drag start on unknown task {}", task_id);
            return false;
        }
        trace!("Drag started on task {}", task_id);
        self.drag = DragState::Dragging {
            active_task: task_id.to_string(),
        };
        true
    }

    /// Applies the dragged task hovering over `target`.
    ///
    /// Changes are persisted right away; there is no separate commit on
    /// drop. Returns whether anything changed.
    pub fn drag_over(&mut self, target: &DropTarget) -> Result<bool> {
        let DragState::Dragging { active_task } = &self.drag else {
            return Ok(false);
        };
        let Some(active_index) = self.tasks.iter().position(|t| &t.id == active_task) else {
            return Ok(false);
        };

        let mut tasks = self.tasks.clone();
        match target {
            DropTarget::Column(column_id) => {
                if self.column(column_id).is_none() || tasks[active_index].status == *column_id {
                    return Ok(false);
                }
                tasks[active_index].status = column_id.clone();
            }
            DropTarget::Task(over_id) => {
                if over_id == active_task {
                    return Ok(false);
                }
                let Some(over_index) = tasks.iter().position(|t| &t.id == over_id) else {
                    return Ok(false);
                };
                if tasks[active_index].status != tasks[over_index].status {
                    tasks[active_index].status = tasks[over_index].status.clone();
                }
                array_move(&mut tasks, active_index, over_index);
            }
        }

        trace!("Drag over {:?} applied", target);
        self.commit_tasks(tasks)?;
        Ok(true)
    }

    /// Ends the gesture on a drop. Changes made while hovering stay.
    pub fn drag_end(&mut self) {
        trace!("Drag ended");
        self.drag = DragState::Idle;
    }

    /// Ends the gesture on a cancel. Nothing is rolled back.
    pub fn drag_cancel(&mut self) {
        trace!("Drag cancelled");
        self.drag = DragState::Idle;
    }

    fn commit_tasks(&mut self, tasks: Vec<Task>) -> Result<()> {
        let json = encode(&tasks, &self.unreadable_tasks)?;
        self.port.set(TASKS_KEY, &json).map_err(|e| {
            error!("Failed to persist tasks: {}", e);
            e
        })?;
        self.tasks = tasks;
        Ok(())
    }

    fn commit_columns(&mut self, columns: Vec<Column>) -> Result<()> {
        let json = encode(&columns, &self.unreadable_columns)?;
        self.port.set(COLUMNS_KEY, &json).map_err(|e| {
            error!("Failed to persist columns: {}", e);
            e
        })?;
        self.columns = columns;
        Ok(())
    }
}

/// Decodes stored columns one by one. Entries without a usable id are
/// returned separately, as stored.
fn read_columns(raw: &str) -> serde_json::Result<(Vec<Column>, Vec<Value>)> {
    let values: Vec<Value> = serde_json::from_str(raw)?;
    let mut columns = Vec::with_capacity(values.len());
    let mut unreadable = Vec::new();
    for value in values {
        match serde_json::from_value::<Column>(value.clone()) {
            Ok(column) if !column.id.trim().is_empty() => columns.push(column),
            _ => {
                warn!("Keeping stored column entry that cannot be read: {}", value);
                unreadable.push(value);
            }
        }
    }
    Ok((columns, unreadable))
}

/// Serializes `items` followed by the entries that could not be read.
fn encode<T: Serialize>(items: &[T], unreadable: &[Value]) -> Result<String> {
    let mut values = items
        .iter()
        .map(serde_json::to_value)
        .collect::<serde_json::Result<Vec<Value>>>()?;
    values.extend(unreadable.iter().cloned());
    Ok(serde_json::to_string(&values)?)
}

/// Moves the element at `from` to `to`, shifting the ones in between.
fn array_move<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from == to || from >= items.len() || to >= items.len() {
        return;
    }
    let item = items.remove(from);
    items.insert(to, item);
}

fn read_key(port: &dyn KeyValueStore, key: &str) -> Option<String> {
    match port.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to read {}: {}", key, e);
            None
        }
    }
}
