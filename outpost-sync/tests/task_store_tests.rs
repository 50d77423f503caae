mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{due_today, sample_task, MockRepository};
use outpost_core::{FilterKey, TaskStatus};
use outpost_sync::{StoreError, SyncConfig, SyncEngine, TaskDraft, TaskStore};

async fn store(repo: MockRepository) -> TaskStore<MockRepository> {
    common::init_tracing();
    let engine = SyncEngine::new(repo, SyncConfig::new("sqlite::memory:"))
        .await
        .unwrap();
    TaskStore::new(engine)
}

#[tokio::test]
async fn completing_a_repeating_task_reschedules_it() {
    let repo = MockRepository::new();
    let mut task = due_today("r1");
    task.is_repeating = true;
    task.repeat_every_days = Some(3);
    repo.seed(task);

    let store = store(repo.clone()).await;
    store.set_active_filter(FilterKey::All).await.unwrap();
    store.tasks().await.unwrap();

    let now = Utc.with_ymd_and_hms(2024, 1, 10, 14, 0, 0).unwrap();
    store.complete_task_at("r1", now).await.unwrap();

    let remote = repo.task("r1").unwrap();
    assert_eq!(remote.status, TaskStatus::Todo);
    assert_eq!(
        remote.due_date,
        Utc.with_ymd_and_hms(2024, 1, 13, 14, 0, 0).unwrap()
    );
    assert_eq!(remote.completed_date, None);
}

#[tokio::test]
async fn completing_a_one_shot_task_finishes_it() {
    let repo = MockRepository::new();
    repo.seed(due_today("r1"));

    let store = store(repo.clone()).await;
    store.set_active_filter(FilterKey::All).await.unwrap();
    store.tasks().await.unwrap();

    let now = Utc.with_ymd_and_hms(2024, 1, 10, 14, 0, 0).unwrap();
    store.complete_task_at("r1", now).await.unwrap();

    let remote = repo.task("r1").unwrap();
    assert_eq!(remote.status, TaskStatus::Done);
    assert_eq!(remote.completed_date, Some(now));
}

#[tokio::test]
async fn delaying_extends_from_the_current_due_date() {
    let repo = MockRepository::new();
    repo.seed(sample_task("r1", 1));

    let store = store(repo.clone()).await;
    store.set_active_filter(FilterKey::All).await.unwrap();
    store.tasks().await.unwrap();

    store.delay_task("r1", 2).await.unwrap();

    let remote = repo.task("r1").unwrap();
    assert_eq!(
        remote.due_date,
        Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn reopening_a_finished_task_clears_its_completion_timestamp() {
    let repo = MockRepository::new();
    let mut task = due_today("r1");
    task.status = TaskStatus::Done;
    task.completed_date = Some(Utc::now() - Duration::hours(1));
    repo.seed(task);

    let store = store(repo.clone()).await;
    store.set_active_filter(FilterKey::All).await.unwrap();
    store.tasks().await.unwrap();

    store.set_status("r1", TaskStatus::InProgress).await.unwrap();

    let remote = repo.task("r1").unwrap();
    assert_eq!(remote.status, TaskStatus::InProgress);
    assert_eq!(remote.completed_date, None);
}

#[tokio::test]
async fn created_drafts_get_remote_ids_while_connected() {
    let repo = MockRepository::new();
    let store = store(repo.clone()).await;
    store.set_active_filter(FilterKey::All).await.unwrap();
    store.tasks().await.unwrap();

    let draft = TaskDraft::new("Stack firewood", Utc::now());
    let created = store.create_task(draft).await.unwrap();

    assert!(!created.has_temp_id());
    assert_eq!(repo.task(&created.id).unwrap().title, "Stack firewood");
    assert_eq!(store.tasks().await.unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_drafts_never_reach_the_remote() {
    let repo = MockRepository::new();
    let store = store(repo.clone()).await;

    let mut draft = TaskDraft::new("Water the garden", Utc::now());
    draft.is_repeating = true;

    let err = store.create_task(draft).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTask(_)));
    assert_eq!(repo.task_count(), 0);
}

#[tokio::test]
async fn deleting_the_selected_task_clears_the_selection() {
    let repo = MockRepository::new();
    repo.seed(due_today("r1"));

    let store = store(repo.clone()).await;
    store.set_active_filter(FilterKey::All).await.unwrap();
    store.tasks().await.unwrap();

    store.select_task("r1").await.unwrap();
    assert_eq!(store.selected_task().await.unwrap().as_deref(), Some("r1"));

    store.delete_task("r1").await.unwrap();
    assert_eq!(store.selected_task().await.unwrap(), None);
}

#[tokio::test]
async fn offline_completion_shows_locally_before_the_drain() {
    let repo = MockRepository::new();
    repo.seed(due_today("r1"));

    let store = store(repo.clone()).await;
    store.set_active_filter(FilterKey::All).await.unwrap();
    store.tasks().await.unwrap();

    store.connectivity_lost().await;
    store.complete_task("r1").await.unwrap();

    // The cached view reflects the completion; the remote does not yet.
    let local = store.tasks().await.unwrap();
    assert_eq!(local[0].status, TaskStatus::Done);
    assert_eq!(repo.task("r1").unwrap().status, TaskStatus::Todo);

    let report = store.connectivity_restored().await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(repo.task("r1").unwrap().status, TaskStatus::Done);
}
