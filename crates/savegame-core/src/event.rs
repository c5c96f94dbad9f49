use tokio::sync::broadcast;

/// Notifications published by the save subsystem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveGameEvent {
    SaveCompleted { objects: usize, bytes: usize },
    /// A load was accepted and travel to `map` requested.
    LoadStarted { map: String },
    LoadCompleted {
        map: String,
        applied: usize,
        unresolved: usize,
    },
    LoadFailed { reason: String },
}

/// Receiver side of the subsystem's event channel.
pub type SaveGameEventStream = broadcast::Receiver<SaveGameEvent>;
