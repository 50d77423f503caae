pub mod filters;
pub mod models;
pub mod repository;
pub mod time;

pub use filters::FilterKey;
pub use models::{
    is_temp_id, temp_id, ChangeKind, FieldEdit, Importance, PendingChange, Task, TaskPatch,
    TaskStatus, TEMP_ID_PREFIX,
};
pub use repository::{RemoteFault, RepositoryError, TaskPage, TaskRepository};
