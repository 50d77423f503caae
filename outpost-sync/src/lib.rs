//! Offline-capable synchronization engine for task records.
//!
//! The engine keeps per-filter snapshots in a TTL-bounded cache, buffers
//! mutations made while disconnected in a durable seq-ordered queue, and
//! replays that queue in order when connectivity returns. [`TaskStore`] is
//! the caller-facing surface; [`SyncEngine`] underneath owns the policy of
//! when to talk to the remote and when to trust local state.

pub mod cache;
pub mod config;
pub mod database;
pub mod errors;
pub mod events;
pub mod queue;
pub mod sync_engine;
pub mod task_store;

mod queries;

pub use cache::{CacheEntry, CacheStore, CacheTtl};
pub use config::SyncConfig;
pub use database::ClientDatabase;
pub use errors::{StoreError, StoreResult};
pub use events::{EventDispatcher, SyncEvent};
pub use queue::{Applied, DrainReport, PendingQueue};
pub use sync_engine::{SyncEngine, SyncState};
pub use task_store::{completion_patch, delay_patch, TaskDraft, TaskStore};
