use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use outpost_core::{
    is_temp_id, temp_id, ChangeKind, FilterKey, PendingChange, RepositoryError, Task, TaskPatch,
    TaskRepository,
};
use tokio::sync::Mutex;

use crate::cache::CacheStore;
use crate::config::SyncConfig;
use crate::database::{state_keys, ClientDatabase};
use crate::errors::{StoreError, StoreResult};
use crate::events::EventDispatcher;
use crate::queue::{Applied, DrainReport, PendingQueue};

/// Where the engine currently stands with respect to the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncState {
    /// Connected, no pending changes outstanding.
    Synced = 0,
    /// Connected and replaying the queue or refreshing snapshots.
    Syncing = 1,
    /// Disconnected, but the active filter has a cached snapshot to serve.
    CachedOffline = 2,
    /// Disconnected with nothing cached for the active filter.
    Unavailable = 3,
}

impl SyncState {
    fn from_u8(raw: u8) -> SyncState {
        match raw {
            0 => SyncState::Synced,
            1 => SyncState::Syncing,
            2 => SyncState::CachedOffline,
            _ => SyncState::Unavailable,
        }
    }
}

/// Orchestrates the cache, queue, and remote repository.
///
/// All mutations route through here so the rules stay in one place: apply
/// remotely when connected, buffer locally when not, and never both. The
/// engine runs no background tasks; connectivity transitions are driven by
/// the caller via [`SyncEngine::connectivity_restored`] and
/// [`SyncEngine::connectivity_lost`], or inferred from a remote call failing.
pub struct SyncEngine<R: TaskRepository> {
    repo: R,
    db: Arc<ClientDatabase>,
    cache: Mutex<CacheStore>,
    queue: PendingQueue,
    events: Arc<EventDispatcher>,
    state: AtomicU8,
    connected: AtomicBool,
    // One generation counter per filter; a refresh only installs its result
    // if no newer refresh for the same filter started after it.
    refresh_generations: [AtomicU64; 3],
    active_filter: Mutex<FilterKey>,
    config: SyncConfig,
}

impl<R: TaskRepository> SyncEngine<R> {
    /// Opens (or creates) the local database, restores persisted cache
    /// snapshots and the active filter, and starts in the `Synced` state.
    /// Nothing is fetched until the first read or explicit refresh.
    pub async fn new(repo: R, config: SyncConfig) -> StoreResult<Self> {
        config.validate()?;

        let db = Arc::new(ClientDatabase::new(&config.database_url).await?);
        db.init_schema().await?;

        let mut cache = CacheStore::new(config.cache_ttl);
        for (filter, snapshot, fetched_at) in db.load_cache_entries().await? {
            cache.put_at(filter, snapshot, fetched_at);
        }

        let active_filter = match db.get_state(state_keys::ACTIVE_FILTER).await? {
            Some(raw) => raw.parse().unwrap_or(config.active_filter),
            None => config.active_filter,
        };

        let queue = PendingQueue::new(Arc::clone(&db), config.max_replay_attempts);
        let pending = queue.len().await?;
        tracing::info!(
            "engine ready: filter {}, {} cached snapshots restored, {} changes pending",
            active_filter,
            cache.entries().count(),
            pending
        );

        Ok(Self {
            repo,
            db,
            cache: Mutex::new(cache),
            queue,
            events: Arc::new(EventDispatcher::new()),
            state: AtomicU8::new(SyncState::Synced as u8),
            connected: AtomicBool::new(true),
            refresh_generations: Default::default(),
            active_filter: Mutex::new(active_filter),
            config,
        })
    }

    pub fn events(&self) -> Arc<EventDispatcher> {
        Arc::clone(&self.events)
    }

    pub fn state(&self) -> SyncState {
        SyncState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: SyncState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    // ---- connectivity ----

    /// Marks the remote unreachable. Also called internally whenever a remote
    /// call fails with a connectivity error.
    pub async fn connectivity_lost(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.events.emit_connection_lost();
        }
        self.recompute_offline_state().await;
    }

    /// Marks the remote reachable again, replays the queue (retrying the
    /// whole drain with exponential backoff if the remote flaps), and then
    /// refreshes the active filter.
    pub async fn connectivity_restored(&self) -> StoreResult<DrainReport> {
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.events.emit_connection_restored();
        }
        self.set_state(SyncState::Syncing);
        self.events.emit_sync_started();

        let drain = || async { self.queue.drain(|change| self.apply_change(change)).await };
        let report = match drain
            .retry(
                ExponentialBuilder::default().with_max_times(self.config.drain_retry_limit),
            )
            .when(|err: &StoreError| err.is_connectivity())
            .await
        {
            Ok(report) => report,
            Err(err) => {
                self.events.emit_sync_error(&err.to_string());
                if err.is_connectivity() {
                    self.connectivity_lost().await;
                } else {
                    // Still connected and nothing is in flight any more.
                    self.set_state(SyncState::Synced);
                }
                return Err(err);
            }
        };

        for (seq, task_id) in &report.dead_lettered {
            self.events.emit_change_dead_lettered(*seq, task_id);
        }

        let filter = *self.active_filter.lock().await;
        if let Err(err) = self.refresh(filter).await {
            self.events.emit_sync_error(&err.to_string());
            // A connectivity failure inside refresh already flipped the
            // engine offline and recomputed the state.
            if !err.is_connectivity() {
                self.set_state(SyncState::Synced);
            }
            return Err(err);
        }

        self.set_state(SyncState::Synced);
        self.events.emit_sync_completed(report.applied);
        Ok(report)
    }

    /// Offline state depends on whether the active filter can still be
    /// served from cache.
    async fn recompute_offline_state(&self) {
        let filter = *self.active_filter.lock().await;
        let usable = self.cache.lock().await.get(filter).is_some();
        self.set_state(if usable {
            SyncState::CachedOffline
        } else {
            SyncState::Unavailable
        });
    }

    /// Bounds a remote call; an elapsed timeout counts as connectivity loss.
    async fn with_timeout<T, F>(&self, call: F) -> Result<T, RepositoryError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        match tokio::time::timeout(self.config.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::Connectivity),
        }
    }

    // ---- reads ----

    /// Tasks for the active filter.
    pub async fn tasks(&self) -> StoreResult<Vec<Task>> {
        let filter = *self.active_filter.lock().await;
        self.tasks_for(filter).await
    }

    /// Tasks for `filter`: served from a fresh cached snapshot when one
    /// exists, fetched from the remote otherwise. Disconnected with nothing
    /// fresh (and no unbounded TTL) is an error, never silently-stale data.
    pub async fn tasks_for(&self, filter: FilterKey) -> StoreResult<Vec<Task>> {
        if let Some(snapshot) = self.cache.lock().await.get(filter) {
            return Ok(snapshot.to_vec());
        }

        if !self.is_connected() {
            return Err(StoreError::NoCacheAvailable(filter));
        }

        self.refresh(filter).await?;
        match self.cache.lock().await.get(filter) {
            Some(snapshot) => Ok(snapshot.to_vec()),
            // A newer refresh for this filter superseded ours and has not
            // landed yet.
            None => Err(StoreError::NoCacheAvailable(filter)),
        }
    }

    /// The task as the local engine currently sees it, from any snapshot.
    pub async fn find_task(&self, id: &str) -> StoreResult<Task> {
        let cache = self.cache.lock().await;
        for (_, entry) in cache.entries() {
            if let Some(task) = entry.snapshot.iter().find(|t| t.id == id) {
                return Ok(task.clone());
            }
        }
        Err(StoreError::UnknownTask(id.to_string()))
    }

    /// Fetches a full snapshot for `filter` and installs it, unless a newer
    /// refresh for the same filter started while this one was in flight
    /// (last request wins).
    pub async fn refresh(&self, filter: FilterKey) -> StoreResult<()> {
        let generation_slot = &self.refresh_generations[filter.index()];
        let generation = generation_slot.fetch_add(1, Ordering::SeqCst) + 1;

        let snapshot = match self.fetch_snapshot(filter).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                if err.is_connectivity() {
                    self.connectivity_lost().await;
                }
                return Err(err.into());
            }
        };
        let snapshot = self.overlay_pending(filter, snapshot).await?;

        let fetched_at = Utc::now();
        let mut cache = self.cache.lock().await;
        // Checked under the cache lock, and the lock is held through the
        // database write, so a newer refresh cannot land in between and be
        // overwritten by this one.
        if generation_slot.load(Ordering::SeqCst) != generation {
            tracing::debug!("discarding superseded refresh for filter {filter}");
            return Ok(());
        }
        cache.put_at(filter, snapshot.clone(), fetched_at);
        self.db.save_cache_entry(filter, &snapshot, fetched_at).await?;
        tracing::debug!("refreshed filter {} with {} tasks", filter, snapshot.len());
        Ok(())
    }

    async fn fetch_snapshot(&self, filter: FilterKey) -> Result<Vec<Task>, RepositoryError> {
        let mut tasks = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .with_timeout(self.repo.list(filter, cursor.as_deref()))
                .await?;
            tasks.extend(page.tasks);
            if !page.has_more {
                return Ok(tasks);
            }
            cursor = page.next_cursor;
        }
    }

    /// Re-applies queued local changes on top of a freshly fetched snapshot
    /// so a refresh never makes un-replayed work disappear from view.
    async fn overlay_pending(
        &self,
        filter: FilterKey,
        mut snapshot: Vec<Task>,
    ) -> StoreResult<Vec<Task>> {
        let pending = self.queue.entries().await?;
        if pending.is_empty() {
            return Ok(snapshot);
        }
        let now = Utc::now();
        for change in pending {
            match change.kind {
                ChangeKind::Delete => snapshot.retain(|t| t.id != change.task_id),
                ChangeKind::Update(patch) => {
                    if let Some(task) = snapshot.iter_mut().find(|t| t.id == change.task_id) {
                        patch.apply_to(task);
                    } else if is_temp_id(&change.task_id) {
                        if let Some(task) = patch.build_task(&change.task_id) {
                            if filter.matches(&task, now) {
                                snapshot.push(task);
                            }
                        }
                    }
                }
            }
        }
        Ok(snapshot)
    }

    // ---- mutations ----

    /// Creates a task. Connected, the remote issues the id and the view is
    /// re-fetched; disconnected, the task gets a temporary id and a queued
    /// change carrying the full record, reconciled at the next drain.
    pub async fn create_task(&self, mut task: Task) -> StoreResult<Task> {
        if self.is_connected() {
            match self.with_timeout(self.repo.create(&task)).await {
                Ok(id) => {
                    task.id = id;
                }
                Err(err) => {
                    if err.is_connectivity() {
                        self.connectivity_lost().await;
                    }
                    return Err(err.into());
                }
            }
            self.events.emit_task_created(&task.id);
            self.refresh_after_mutation().await;
            return Ok(task);
        }

        let seq = self.db.next_temp_seq().await?;
        task.id = temp_id(seq);
        self.queue
            .enqueue(&task.id, ChangeKind::Update(TaskPatch::from_task(&task)))
            .await?;
        {
            let mut cache = self.cache.lock().await;
            cache.insert_task(&task, Utc::now());
        }
        self.persist_cache().await?;
        self.events.emit_task_created(&task.id);
        Ok(task)
    }

    /// Applies a partial update. Connected failures propagate untouched and
    /// are never queued; the caller decides whether to retry.
    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> StoreResult<()> {
        if patch.is_empty() {
            return Ok(());
        }

        if self.is_connected() {
            if let Err(err) = self.with_timeout(self.repo.update(id, &patch)).await {
                if err.is_connectivity() {
                    self.connectivity_lost().await;
                }
                return Err(err.into());
            }
            self.events.emit_task_updated(id);
            self.refresh_after_mutation().await;
            return Ok(());
        }

        self.find_task(id).await?;
        self.queue
            .enqueue(id, ChangeKind::Update(patch.clone()))
            .await?;
        {
            let mut cache = self.cache.lock().await;
            cache.apply_patch(id, &patch);
        }
        self.persist_cache().await?;
        self.events.emit_task_updated(id);
        Ok(())
    }

    /// Deletes a task. Deleting a task that only ever existed locally just
    /// cancels its queued changes; nothing reaches the remote.
    pub async fn delete_task(&self, id: &str) -> StoreResult<()> {
        if self.is_connected() {
            match self.with_timeout(self.repo.delete(id)).await {
                Ok(()) => {}
                // Already gone remotely; converge rather than surface it.
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    if err.is_connectivity() {
                        self.connectivity_lost().await;
                    }
                    return Err(err.into());
                }
            }
        } else if is_temp_id(id) {
            self.queue.cancel_task(id).await?;
        } else {
            self.find_task(id).await?;
            self.queue.enqueue(id, ChangeKind::Delete).await?;
        }

        // A deleted task leaves every snapshot, not just the active one.
        {
            let mut cache = self.cache.lock().await;
            cache.remove_task(id);
        }
        self.persist_cache().await?;

        if self.selected_task().await?.as_deref() == Some(id) {
            self.clear_selection().await?;
        }
        self.events.emit_task_deleted(id);
        if self.is_connected() {
            self.refresh_after_mutation().await;
        }
        Ok(())
    }

    /// A committed online mutation re-fetches the active filter in full
    /// rather than patching the snapshot locally, so the view picks up
    /// server-side sorting and computed fields. The mutation has already
    /// landed; a failed refresh is logged and the prior snapshot stands.
    async fn refresh_after_mutation(&self) {
        let filter = *self.active_filter.lock().await;
        if let Err(err) = self.refresh(filter).await {
            tracing::warn!("post-mutation refresh failed: {err}");
        }
    }

    // ---- queue replay ----

    async fn apply_change(&self, change: PendingChange) -> StoreResult<Applied> {
        match change.kind {
            ChangeKind::Update(patch) if is_temp_id(&change.task_id) => {
                // An offline create travels as a full-record update against
                // its temporary id; replay turns it into a real create.
                let task = patch
                    .build_task(&change.task_id)
                    .ok_or(StoreError::CorruptRow(change.seq))?;
                let new_id = self.with_timeout(self.repo.create(&task)).await?;
                self.adopt_durable_id(&change.task_id, &new_id).await?;
                Ok(Applied::Rewritten { new_id })
            }
            ChangeKind::Update(patch) => {
                self.with_timeout(self.repo.update(&change.task_id, &patch))
                    .await?;
                Ok(Applied::Done)
            }
            ChangeKind::Delete => {
                match self.with_timeout(self.repo.delete(&change.task_id)).await {
                    Ok(()) | Err(RepositoryError::Remote(
                        outpost_core::RemoteFault::NotFound,
                    )) => Ok(Applied::Done),
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    /// Rewrites a temporary id everywhere outside the queue itself: cached
    /// snapshots and the selection pointer. The queue rows are rewritten by
    /// the drain loop.
    async fn adopt_durable_id(&self, old_id: &str, new_id: &str) -> StoreResult<()> {
        {
            let mut cache = self.cache.lock().await;
            cache.rewrite_task_id(old_id, new_id);
        }
        self.persist_cache().await?;

        if self.selected_task().await?.as_deref() == Some(old_id) {
            self.db.set_state(state_keys::SELECTED_TASK, new_id).await?;
        }
        tracing::debug!("reconciled {} as {}", old_id, new_id);
        Ok(())
    }

    pub async fn pending_changes(&self) -> StoreResult<Vec<PendingChange>> {
        self.queue.entries().await
    }

    pub async fn failed_changes(&self) -> StoreResult<Vec<PendingChange>> {
        self.queue.failed_entries().await
    }

    // ---- selection and filter ----

    pub async fn select_task(&self, id: &str) -> StoreResult<()> {
        self.find_task(id).await?;
        self.db.set_state(state_keys::SELECTED_TASK, id).await
    }

    pub async fn selected_task(&self) -> StoreResult<Option<String>> {
        self.db.get_state(state_keys::SELECTED_TASK).await
    }

    pub async fn clear_selection(&self) -> StoreResult<()> {
        self.db.clear_state(state_keys::SELECTED_TASK).await
    }

    pub async fn active_filter(&self) -> FilterKey {
        *self.active_filter.lock().await
    }

    pub async fn set_active_filter(&self, filter: FilterKey) -> StoreResult<()> {
        {
            let mut active = self.active_filter.lock().await;
            *active = filter;
        }
        self.db
            .set_state(state_keys::ACTIVE_FILTER, &filter.to_string())
            .await?;
        if !self.is_connected() {
            self.recompute_offline_state().await;
        }
        Ok(())
    }

    // ---- persistence ----

    /// Writes every in-memory snapshot back to the database.
    async fn persist_cache(&self) -> StoreResult<()> {
        let entries: Vec<_> = {
            let cache = self.cache.lock().await;
            cache
                .entries()
                .map(|(filter, entry)| (filter, entry.snapshot.clone(), entry.fetched_at))
                .collect()
        };
        for (filter, snapshot, fetched_at) in entries {
            self.db.save_cache_entry(filter, &snapshot, fetched_at).await?;
        }
        Ok(())
    }

    /// Flushes connections; the queue and cache are already durable.
    pub async fn shutdown(&self) {
        self.db.pool.close().await;
    }
}
