use chrono::{DateTime, Duration, Utc};
use outpost_core::{
    FieldEdit, FilterKey, Importance, Task, TaskPatch, TaskRepository, TaskStatus,
};

use crate::errors::{StoreError, StoreResult};
use crate::queue::DrainReport;
use crate::sync_engine::{SyncEngine, SyncState};

/// Everything a caller supplies to create a task; the engine fills in the id
/// and the bookkeeping fields.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub importance: Importance,
    pub images: Vec<String>,
    pub is_repeating: bool,
    pub repeat_every_days: Option<u32>,
    pub assignee_id: Option<String>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, due_date: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            due_date,
            importance: Importance::Normal,
            images: Vec::new(),
            is_repeating: false,
            repeat_every_days: None,
            assignee_id: None,
        }
    }

    fn validate(&self) -> StoreResult<()> {
        if self.title.trim().is_empty() {
            return Err(StoreError::InvalidTask("title must not be blank".to_string()));
        }
        match (self.is_repeating, self.repeat_every_days) {
            (true, None) | (true, Some(0)) => Err(StoreError::InvalidTask(
                "a repeating task needs a positive repeat interval".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn into_task(self) -> Task {
        Task {
            id: String::new(),
            title: self.title,
            description: self.description,
            status: TaskStatus::Todo,
            due_date: self.due_date,
            completed_date: None,
            importance: self.importance,
            images: self.images,
            is_repeating: self.is_repeating,
            repeat_every_days: self.repeat_every_days,
            assignee_id: self.assignee_id,
        }
    }
}

/// The patch that completes a task.
///
/// A repeating task never finishes: completion rolls its due date forward by
/// the repeat interval and puts it back in `Todo`, leaving `completed_date`
/// untouched. A one-shot task moves to `Done` and records when.
pub fn completion_patch(task: &Task, now: DateTime<Utc>) -> TaskPatch {
    match (task.is_repeating, task.repeat_every_days) {
        (true, Some(days)) => TaskPatch {
            status: Some(TaskStatus::Todo),
            due_date: Some(now + Duration::days(i64::from(days))),
            ..TaskPatch::default()
        },
        _ => TaskPatch {
            status: Some(TaskStatus::Done),
            completed_date: Some(FieldEdit::Set(now)),
            ..TaskPatch::default()
        },
    }
}

/// Pushes the due date out by `days`, anchored on the task's current due
/// date rather than on the clock.
pub fn delay_patch(task: &Task, days: u32) -> TaskPatch {
    TaskPatch {
        due_date: Some(task.due_date + Duration::days(i64::from(days))),
        ..TaskPatch::default()
    }
}

/// The caller-facing surface. Wraps the engine with the task-level business
/// rules so consumers never hand-build patches for the common operations.
pub struct TaskStore<R: TaskRepository> {
    engine: SyncEngine<R>,
}

impl<R: TaskRepository> TaskStore<R> {
    pub fn new(engine: SyncEngine<R>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &SyncEngine<R> {
        &self.engine
    }

    pub fn state(&self) -> SyncState {
        self.engine.state()
    }

    pub async fn tasks(&self) -> StoreResult<Vec<Task>> {
        self.engine.tasks().await
    }

    pub async fn tasks_for(&self, filter: FilterKey) -> StoreResult<Vec<Task>> {
        self.engine.tasks_for(filter).await
    }

    pub async fn create_task(&self, draft: TaskDraft) -> StoreResult<Task> {
        draft.validate()?;
        self.engine.create_task(draft.into_task()).await
    }

    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> StoreResult<()> {
        self.engine.update_task(id, patch).await
    }

    pub async fn delete_task(&self, id: &str) -> StoreResult<()> {
        self.engine.delete_task(id).await
    }

    pub async fn complete_task(&self, id: &str) -> StoreResult<()> {
        self.complete_task_at(id, Utc::now()).await
    }

    pub async fn complete_task_at(&self, id: &str, now: DateTime<Utc>) -> StoreResult<()> {
        let task = self.engine.find_task(id).await?;
        self.engine.update_task(id, completion_patch(&task, now)).await
    }

    pub async fn delay_task(&self, id: &str, days: u32) -> StoreResult<()> {
        let task = self.engine.find_task(id).await?;
        self.engine.update_task(id, delay_patch(&task, days)).await
    }

    /// Status changes route through the completion rules; in particular,
    /// reopening a finished task clears its completion timestamp.
    pub async fn set_status(&self, id: &str, status: TaskStatus) -> StoreResult<()> {
        if status == TaskStatus::Done {
            return self.complete_task(id).await;
        }
        let task = self.engine.find_task(id).await?;
        let mut patch = TaskPatch {
            status: Some(status),
            ..TaskPatch::default()
        };
        if task.status == TaskStatus::Done {
            patch.completed_date = Some(FieldEdit::Clear);
        }
        self.engine.update_task(id, patch).await
    }

    pub async fn select_task(&self, id: &str) -> StoreResult<()> {
        self.engine.select_task(id).await
    }

    pub async fn selected_task(&self) -> StoreResult<Option<String>> {
        self.engine.selected_task().await
    }

    pub async fn set_active_filter(&self, filter: FilterKey) -> StoreResult<()> {
        self.engine.set_active_filter(filter).await
    }

    pub async fn active_filter(&self) -> FilterKey {
        self.engine.active_filter().await
    }

    pub async fn connectivity_lost(&self) {
        self.engine.connectivity_lost().await;
    }

    pub async fn connectivity_restored(&self) -> StoreResult<DrainReport> {
        self.engine.connectivity_restored().await
    }

    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_task(is_repeating: bool, repeat_every_days: Option<u32>) -> Task {
        Task {
            id: "t1".to_string(),
            title: "Feed the chickens".to_string(),
            description: String::new(),
            status: TaskStatus::Todo,
            due_date: Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap(),
            completed_date: None,
            importance: Importance::Normal,
            images: vec![],
            is_repeating,
            repeat_every_days,
            assignee_id: None,
        }
    }

    #[test]
    fn completing_a_repeating_task_rolls_the_due_date_forward() {
        let task = base_task(true, Some(3));
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 14, 0, 0).unwrap();

        let patch = completion_patch(&task, now);
        assert_eq!(patch.status, Some(TaskStatus::Todo));
        assert_eq!(patch.due_date, Some(now + Duration::days(3)));
        assert!(patch.completed_date.is_none());
    }

    #[test]
    fn completing_a_one_shot_task_records_the_timestamp() {
        let task = base_task(false, None);
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 14, 0, 0).unwrap();

        let patch = completion_patch(&task, now);
        assert_eq!(patch.status, Some(TaskStatus::Done));
        assert_eq!(patch.completed_date, Some(FieldEdit::Set(now)));
        assert!(patch.due_date.is_none());
    }

    #[test]
    fn repeating_flag_without_interval_falls_back_to_one_shot_completion() {
        let task = base_task(true, None);
        let now = Utc::now();
        let patch = completion_patch(&task, now);
        assert_eq!(patch.status, Some(TaskStatus::Done));
    }

    #[test]
    fn delay_is_anchored_on_the_current_due_date() {
        let task = base_task(false, None);
        let patch = delay_patch(&task, 2);
        assert_eq!(
            patch.due_date,
            Some(Utc.with_ymd_and_hms(2024, 1, 12, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn draft_validation_rejects_bad_repeat_intervals() {
        let due = Utc::now();
        let mut draft = TaskDraft::new("Water the garden", due);
        draft.is_repeating = true;
        assert!(matches!(
            draft.validate(),
            Err(StoreError::InvalidTask(_))
        ));

        draft.repeat_every_days = Some(0);
        assert!(draft.validate().is_err());

        draft.repeat_every_days = Some(7);
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn draft_validation_rejects_blank_titles() {
        let draft = TaskDraft::new("   ", Utc::now());
        assert!(matches!(
            draft.validate(),
            Err(StoreError::InvalidTask(_))
        ));
    }
}
