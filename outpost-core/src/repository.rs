use std::future::Future;

use thiserror::Error;

use crate::filters::FilterKey;
use crate::models::{Task, TaskPatch};

/// Sub-kinds of a remote rejection, kept separate from connectivity loss so
/// callers can distinguish "retry later" from "fix the request".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteFault {
    #[error("authentication rejected")]
    Auth,
    #[error("record not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("rate limited")]
    RateLimited,
    #[error("server fault (status {0})")]
    Server(u16),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("no network path to the remote repository")]
    Connectivity,
    #[error("remote repository rejected the call: {0}")]
    Remote(RemoteFault),
}

impl RepositoryError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, RepositoryError::Connectivity)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::Remote(RemoteFault::NotFound))
    }
}

/// One page of a cursor-driven listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// The remote source of truth for task records. Filtering and sorting happen
/// server-side; `list` pages through results with an opaque cursor.
///
/// `update` takes a partial record: queued payloads are applied field-wise
/// over whatever the remote's current state is at replay time, which is what
/// makes replaying independent pending changes in order well-defined.
pub trait TaskRepository: Send + Sync {
    fn list(
        &self,
        filter: FilterKey,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<TaskPage, RepositoryError>> + Send;

    /// Creates a durable record and returns its remote-issued id.
    fn create(&self, task: &Task) -> impl Future<Output = Result<String, RepositoryError>> + Send;

    fn update(
        &self,
        id: &str,
        patch: &TaskPatch,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}
