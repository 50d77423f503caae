use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use outpost_core::{ChangeKind, PendingChange};

use crate::database::ClientDatabase;
use crate::errors::{StoreError, StoreResult};

/// What a drain's apply callback reports for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Done,
    /// An offline create was reconciled: the remote issued `new_id` and every
    /// remaining reference to the old temporary id must be rewritten.
    Rewritten { new_id: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: usize,
    pub retained: usize,
    /// (seq, task_id) of entries that hit the max-attempts threshold.
    pub dead_lettered: Vec<(i64, String)>,
}

/// Append-only, seq-ordered queue of local mutations awaiting replay.
///
/// Draining is not reentrant: a second drain while one is in flight is
/// rejected with [`StoreError::DrainInProgress`] rather than interleaved.
pub struct PendingQueue {
    db: Arc<ClientDatabase>,
    draining: AtomicBool,
    max_attempts: u32,
}

impl PendingQueue {
    pub fn new(db: Arc<ClientDatabase>, max_attempts: u32) -> Self {
        Self {
            db,
            draining: AtomicBool::new(false),
            max_attempts,
        }
    }

    pub async fn enqueue(&self, task_id: &str, kind: ChangeKind) -> StoreResult<PendingChange> {
        let created_at = Utc::now();
        let seq = self.db.enqueue_change(task_id, &kind, created_at).await?;
        tracing::debug!("queued {} for task {} as seq {}", kind.as_str(), task_id, seq);
        Ok(PendingChange {
            seq,
            task_id: task_id.to_string(),
            kind,
            created_at,
            attempts: 0,
        })
    }

    pub async fn entries(&self) -> StoreResult<Vec<PendingChange>> {
        self.db.load_pending_changes().await
    }

    pub async fn failed_entries(&self) -> StoreResult<Vec<PendingChange>> {
        self.db.load_failed_changes().await
    }

    pub async fn len(&self) -> StoreResult<usize> {
        Ok(self.db.count_pending_changes().await? as usize)
    }

    pub async fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.db.count_pending_changes().await? == 0)
    }

    /// Drops every queued change for a task. Used when a task that only ever
    /// existed locally is deleted before its create was replayed.
    pub async fn cancel_task(&self, task_id: &str) -> StoreResult<u64> {
        let dropped = self.db.delete_changes_for_task(task_id).await?;
        if dropped > 0 {
            tracing::debug!("cancelled {} queued changes for {}", dropped, task_id);
        }
        Ok(dropped)
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Replays entries oldest-first. Successful entries are removed; failed
    /// entries are preserved in their original relative order, and any later
    /// entry for the same task is skipped so per-task replay order stays
    /// strictly increasing. A connectivity failure aborts the drain without
    /// consuming attempts; other failures count toward the max-attempts
    /// threshold, past which the entry is dead-lettered.
    pub async fn drain<F, Fut>(&self, mut apply: F) -> StoreResult<DrainReport>
    where
        F: FnMut(PendingChange) -> Fut,
        Fut: Future<Output = StoreResult<Applied>>,
    {
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StoreError::DrainInProgress);
        }
        let result = self.drain_inner(&mut apply).await;
        self.draining.store(false, Ordering::SeqCst);
        result
    }

    async fn drain_inner<F, Fut>(&self, apply: &mut F) -> StoreResult<DrainReport>
    where
        F: FnMut(PendingChange) -> Fut,
        Fut: Future<Output = StoreResult<Applied>>,
    {
        let mut entries = self.db.load_pending_changes().await?;
        if entries.is_empty() {
            return Ok(DrainReport::default());
        }
        tracing::info!("draining {} pending changes", entries.len());

        let mut report = DrainReport::default();
        let mut blocked: HashSet<String> = HashSet::new();
        let mut index = 0;
        while index < entries.len() {
            let change = entries[index].clone();
            index += 1;

            if blocked.contains(&change.task_id) {
                report.retained += 1;
                continue;
            }

            match apply(change.clone()).await {
                Ok(Applied::Done) => {
                    self.db.remove_change(change.seq).await?;
                    report.applied += 1;
                }
                Ok(Applied::Rewritten { new_id }) => {
                    self.db.remove_change(change.seq).await?;
                    self.db.rewrite_task_id(&change.task_id, &new_id).await?;
                    for later in entries[index..].iter_mut() {
                        if later.task_id == change.task_id {
                            later.task_id = new_id.clone();
                        }
                    }
                    report.applied += 1;
                }
                Err(err) if err.is_connectivity() => {
                    tracing::warn!(
                        "drain aborted at seq {}: remote unreachable ({} applied so far)",
                        change.seq,
                        report.applied
                    );
                    return Err(err);
                }
                Err(err) => {
                    let attempts = change.attempts + 1;
                    self.db.increment_attempts(change.seq).await?;
                    blocked.insert(change.task_id.clone());

                    if attempts >= self.max_attempts {
                        self.db.mark_change_failed(change.seq).await?;
                        tracing::error!(
                            "giving up on seq {} for task {} after {} attempts: {}",
                            change.seq,
                            change.task_id,
                            attempts,
                            err
                        );
                        report.dead_lettered.push((change.seq, change.task_id));
                    } else {
                        tracing::warn!(
                            "replay failed for task {} (attempt {}/{}): {}",
                            change.task_id,
                            attempts,
                            self.max_attempts,
                            err
                        );
                        report.retained += 1;
                    }
                }
            }
        }

        tracing::info!(
            "drain complete: {} applied, {} retained, {} dead-lettered",
            report.applied,
            report.retained,
            report.dead_lettered.len()
        );
        Ok(report)
    }
}
