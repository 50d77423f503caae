use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use outpost_core::{FilterKey, Task, TaskPatch};

/// How long a snapshot counts as fresh. `Unbounded` is the deliberate "trust
/// local state indefinitely while disconnected" mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTtl {
    Minutes5,
    Hours12,
    Unbounded,
}

impl CacheTtl {
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            CacheTtl::Minutes5 => Some(Duration::minutes(5)),
            CacheTtl::Hours12 => Some(Duration::hours(12)),
            CacheTtl::Unbounded => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub snapshot: Vec<Task>,
    pub fetched_at: DateTime<Utc>,
}

/// Per-filter snapshots with bounded freshness. A `put` is always a full
/// replacement for its key; snapshots are never merged incrementally.
#[derive(Debug)]
pub struct CacheStore {
    ttl: CacheTtl,
    entries: HashMap<FilterKey, CacheEntry>,
}

impl CacheStore {
    pub fn new(ttl: CacheTtl) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> CacheTtl {
        self.ttl
    }

    pub fn put(&mut self, filter: FilterKey, snapshot: Vec<Task>) {
        self.put_at(filter, snapshot, Utc::now());
    }

    pub fn put_at(&mut self, filter: FilterKey, snapshot: Vec<Task>, fetched_at: DateTime<Utc>) {
        self.entries.insert(
            filter,
            CacheEntry {
                snapshot,
                fetched_at,
            },
        );
    }

    /// The snapshot for `filter`, only if still fresh. Absence is not an
    /// error; stale entries are withheld rather than served as authoritative.
    pub fn get(&self, filter: FilterKey) -> Option<&[Task]> {
        self.get_at(filter, Utc::now())
    }

    pub fn get_at(&self, filter: FilterKey, now: DateTime<Utc>) -> Option<&[Task]> {
        let entry = self.entries.get(&filter)?;
        match self.ttl.as_duration() {
            Some(ttl) if now - entry.fetched_at >= ttl => None,
            _ => Some(&entry.snapshot),
        }
    }

    pub fn fetched_at(&self, filter: FilterKey) -> Option<DateTime<Utc>> {
        self.entries.get(&filter).map(|e| e.fetched_at)
    }

    pub fn entries(&self) -> impl Iterator<Item = (FilterKey, &CacheEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    // ---- snapshot maintenance for optimistic offline mutations ----

    /// Removes the task from every snapshot.
    pub fn remove_task(&mut self, id: &str) {
        for entry in self.entries.values_mut() {
            entry.snapshot.retain(|task| task.id != id);
        }
    }

    /// Overlays `patch` on the task wherever it appears.
    pub fn apply_patch(&mut self, id: &str, patch: &TaskPatch) {
        for entry in self.entries.values_mut() {
            for task in entry.snapshot.iter_mut().filter(|t| t.id == id) {
                patch.apply_to(task);
            }
        }
    }

    /// Appends the task to every snapshot whose filter it matches.
    pub fn insert_task(&mut self, task: &Task, now: DateTime<Utc>) {
        for (filter, entry) in self.entries.iter_mut() {
            if filter.matches(task, now) && !entry.snapshot.iter().any(|t| t.id == task.id) {
                entry.snapshot.push(task.clone());
            }
        }
    }

    /// Rewrites a temporary id to its durable form in every snapshot.
    pub fn rewrite_task_id(&mut self, old_id: &str, new_id: &str) {
        for entry in self.entries.values_mut() {
            for task in entry.snapshot.iter_mut().filter(|t| t.id == old_id) {
                task.id = new_id.to_string();
            }
        }
    }
}
