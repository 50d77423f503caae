use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Prefix marking a locally-minted id that has not been confirmed durable by
/// the remote repository yet.
pub const TEMP_ID_PREFIX: &str = "temp-";

pub fn temp_id(n: i64) -> String {
    format!("{TEMP_ID_PREFIX}{n}")
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Importance {
    Normal,
    Urgent,
}

/// A work item as the remote repository stores it. Ids are remote-issued
/// except for offline-created tasks, which carry a `temp-<n>` id until the
/// sync engine reconciles them into a durable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub due_date: DateTime<Utc>,
    pub completed_date: Option<DateTime<Utc>>,
    pub importance: Importance,
    pub images: Vec<String>,
    pub is_repeating: bool,
    pub repeat_every_days: Option<u32>,
    pub assignee_id: Option<String>,
}

impl Task {
    pub fn has_temp_id(&self) -> bool {
        is_temp_id(&self.id)
    }
}

/// An edit to a nullable field. Tagged so that "field omitted" and "field
/// cleared" survive a serialization round-trip as distinct values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum FieldEdit<T> {
    Set(T),
    Clear,
}

impl<T: Clone> FieldEdit<T> {
    pub fn applied(&self) -> Option<T> {
        match self {
            FieldEdit::Set(value) => Some(value.clone()),
            FieldEdit::Clear => None,
        }
    }
}

impl<T: Clone> From<&Option<T>> for FieldEdit<T> {
    fn from(value: &Option<T>) -> Self {
        match value {
            Some(v) => FieldEdit::Set(v.clone()),
            None => FieldEdit::Clear,
        }
    }
}

/// Partial update to a task, with explicit presence tracking: a `None` field
/// is untouched. Queued offline creates carry a full-record patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<FieldEdit<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Importance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_repeating: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_every_days: Option<FieldEdit<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<FieldEdit<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Overlays every present field onto `task`.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(edit) = &self.completed_date {
            task.completed_date = edit.applied();
        }
        if let Some(importance) = self.importance {
            task.importance = importance;
        }
        if let Some(images) = &self.images {
            task.images = images.clone();
        }
        if let Some(is_repeating) = self.is_repeating {
            task.is_repeating = is_repeating;
        }
        if let Some(edit) = &self.repeat_every_days {
            task.repeat_every_days = edit.applied();
        }
        if let Some(edit) = &self.assignee_id {
            task.assignee_id = edit.applied();
        }
    }

    /// Full-record patch, used as the queued payload for an offline create.
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: Some(task.title.clone()),
            description: Some(task.description.clone()),
            status: Some(task.status),
            due_date: Some(task.due_date),
            completed_date: Some(FieldEdit::from(&task.completed_date)),
            importance: Some(task.importance),
            images: Some(task.images.clone()),
            is_repeating: Some(task.is_repeating),
            repeat_every_days: Some(FieldEdit::from(&task.repeat_every_days)),
            assignee_id: Some(FieldEdit::from(&task.assignee_id)),
        }
    }

    /// Materializes a task from a full-record patch. Returns `None` when any
    /// required field is absent, which means the payload was not produced by
    /// [`TaskPatch::from_task`].
    pub fn build_task(&self, id: impl Into<String>) -> Option<Task> {
        Some(Task {
            id: id.into(),
            title: self.title.clone()?,
            description: self.description.clone()?,
            status: self.status?,
            due_date: self.due_date?,
            completed_date: self.completed_date.as_ref().and_then(FieldEdit::applied),
            importance: self.importance?,
            images: self.images.clone()?,
            is_repeating: self.is_repeating?,
            repeat_every_days: self.repeat_every_days.as_ref().and_then(FieldEdit::applied),
            assignee_id: self.assignee_id.as_ref().and_then(FieldEdit::applied),
        })
    }
}

/// A local mutation not yet confirmed by the remote repository. `seq` is the
/// total order key, monotonic across process restarts.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub seq: i64,
    pub task_id: String,
    pub kind: ChangeKind,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    Update(TaskPatch),
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Update(_) => "update",
            ChangeKind::Delete => "delete",
        }
    }
}
