#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

use chrono::{TimeZone, Utc};
use outpost_core::{
    FilterKey, Importance, RemoteFault, RepositoryError, Task, TaskPage, TaskPatch,
    TaskRepository, TaskStatus,
};

static TRACING: Once = Once::new();

/// Opt-in test logging via `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Default)]
struct RemoteState {
    tasks: HashMap<String, Task>,
    next_id: u64,
    /// Every call fails as if the network were down.
    unreachable: bool,
    /// Updates (only) are rejected with this fault.
    update_fault: Option<RemoteFault>,
    /// Listings (only) are rejected with this fault.
    list_fault: Option<RemoteFault>,
    /// Every call stalls this long before answering.
    stall: Option<std::time::Duration>,
    /// The next `list` call parks until this fires.
    list_gate: Option<tokio::sync::oneshot::Receiver<()>>,
    page_size: usize,
    calls: Vec<String>,
}

/// In-process stand-in for the remote repository, with failure injection and
/// a call log so tests can assert on replay order.
#[derive(Clone)]
pub struct MockRepository {
    state: Arc<Mutex<RemoteState>>,
}

impl MockRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RemoteState {
                page_size: usize::MAX,
                ..RemoteState::default()
            })),
        }
    }

    pub fn seed(&self, task: Task) {
        let mut state = self.state.lock().unwrap();
        state.tasks.insert(task.id.clone(), task);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    pub fn set_update_fault(&self, fault: Option<RemoteFault>) {
        self.state.lock().unwrap().update_fault = fault;
    }

    pub fn set_list_fault(&self, fault: Option<RemoteFault>) {
        self.state.lock().unwrap().list_fault = fault;
    }

    pub fn set_stall(&self, stall: Option<std::time::Duration>) {
        self.state.lock().unwrap().stall = stall;
    }

    /// Parks the next `list` call until the returned sender fires, so a test
    /// can run a second refresh to completion while the first is in flight.
    pub fn gate_next_list(&self) -> tokio::sync::oneshot::Sender<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.state.lock().unwrap().list_gate = Some(rx);
        tx
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.state.lock().unwrap().page_size = page_size;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.state.lock().unwrap().tasks.get(id).cloned()
    }

    pub fn task_count(&self) -> usize {
        self.state.lock().unwrap().tasks.len()
    }
}

impl TaskRepository for MockRepository {
    async fn list(
        &self,
        filter: FilterKey,
        cursor: Option<&str>,
    ) -> Result<TaskPage, RepositoryError> {
        let (stall, gate) = {
            let mut state = self.state.lock().unwrap();
            (state.stall, state.list_gate.take())
        };
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("list:{filter}"));
        if state.unreachable {
            return Err(RepositoryError::Connectivity);
        }
        if let Some(fault) = &state.list_fault {
            return Err(RepositoryError::Remote(fault.clone()));
        }

        let now = Utc::now();
        let mut matching: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| filter.matches(t, now))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));

        let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (start + state.page_size).min(matching.len());
        let has_more = end < matching.len();
        Ok(TaskPage {
            tasks: matching[start..end].to_vec(),
            next_cursor: has_more.then(|| end.to_string()),
            has_more,
        })
    }

    async fn create(&self, task: &Task) -> Result<String, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("create".to_string());
        if state.unreachable {
            return Err(RepositoryError::Connectivity);
        }
        state.next_id += 1;
        let id = format!("r{}", state.next_id);
        let mut stored = task.clone();
        stored.id = id.clone();
        state.tasks.insert(id.clone(), stored);
        Ok(id)
    }

    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("update:{id}"));
        if state.unreachable {
            return Err(RepositoryError::Connectivity);
        }
        if let Some(fault) = &state.update_fault {
            return Err(RepositoryError::Remote(fault.clone()));
        }
        let task = state
            .tasks
            .get_mut(id)
            .ok_or(RepositoryError::Remote(RemoteFault::NotFound))?;
        patch.apply_to(task);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete:{id}"));
        if state.unreachable {
            return Err(RepositoryError::Connectivity);
        }
        state
            .tasks
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::Remote(RemoteFault::NotFound))
    }
}

pub fn sample_task(id: &str, day: u32) -> Task {
    Task {
        id: id.to_string(),
        title: format!("Task {id}"),
        description: String::new(),
        status: TaskStatus::Todo,
        due_date: Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap(),
        completed_date: None,
        importance: Importance::Normal,
        images: vec![],
        is_repeating: false,
        repeat_every_days: None,
        assignee_id: None,
    }
}

pub fn due_today(id: &str) -> Task {
    Task {
        due_date: Utc::now(),
        ..sample_task(id, 1)
    }
}
