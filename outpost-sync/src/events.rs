use tokio::sync::broadcast;

/// Notifications the engine publishes for interested consumers (a UI, the
/// reminder channel). Lagging or absent subscribers never block the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    TaskCreated { id: String },
    TaskUpdated { id: String },
    TaskDeleted { id: String },
    SyncStarted,
    SyncCompleted { applied: usize },
    SyncError { message: String },
    ConnectionLost,
    ConnectionRestored,
    ChangeDeadLettered { seq: i64, task_id: String },
}

pub struct EventDispatcher {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: SyncEvent) {
        // A send error just means nobody is listening.
        let _ = self.tx.send(event);
    }

    pub fn emit_task_created(&self, id: &str) {
        self.emit(SyncEvent::TaskCreated { id: id.to_string() });
    }

    pub fn emit_task_updated(&self, id: &str) {
        self.emit(SyncEvent::TaskUpdated { id: id.to_string() });
    }

    pub fn emit_task_deleted(&self, id: &str) {
        self.emit(SyncEvent::TaskDeleted { id: id.to_string() });
    }

    pub fn emit_sync_started(&self) {
        self.emit(SyncEvent::SyncStarted);
    }

    pub fn emit_sync_completed(&self, applied: usize) {
        self.emit(SyncEvent::SyncCompleted { applied });
    }

    pub fn emit_sync_error(&self, message: &str) {
        self.emit(SyncEvent::SyncError {
            message: message.to_string(),
        });
    }

    pub fn emit_connection_lost(&self) {
        self.emit(SyncEvent::ConnectionLost);
    }

    pub fn emit_connection_restored(&self) {
        self.emit(SyncEvent::ConnectionRestored);
    }

    pub fn emit_change_dead_lettered(&self, seq: i64, task_id: &str) {
        self.emit(SyncEvent::ChangeDeadLettered {
            seq,
            task_id: task_id.to_string(),
        });
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
