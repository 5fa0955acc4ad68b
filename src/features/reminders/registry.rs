//! # Watch Task Registry
//!
//! Live recurring-task handles, one per watched session. The atomic
//! insert-if-absent here is the only thing standing between a session and
//! a duplicate timer, so both the enable path and the phase hand-off go
//! through [`TaskRegistry::try_insert`].

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;

/// Handle to one running watch task.
///
/// Dropping the handle detaches the task; [`TaskHandle::shutdown`] cancels
/// it. Cancellation is cooperative: a tick already in flight finishes
/// naturally, future firings stop.
pub struct TaskHandle {
    join: JoinHandle<()>,
}

impl TaskHandle {
    pub fn new(join: JoinHandle<()>) -> Self {
        Self { join }
    }

    pub fn shutdown(self) {
        self.join.abort();
    }
}

/// Concurrency-safe map from session id to its watch task.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<String, TaskHandle>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task for `game_id` only if none exists.
    ///
    /// The factory runs only when the slot is vacant, so a losing racer
    /// never spawns a task it would have to throw away. Returns whether
    /// the insertion happened.
    pub fn try_insert(&self, game_id: &str, factory: impl FnOnce() -> TaskHandle) -> bool {
        match self.tasks.entry(game_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(factory());
                true
            }
        }
    }

    /// Remove and return the handle so the caller can release the timer
    /// exactly once.
    pub fn remove(&self, game_id: &str) -> Option<TaskHandle> {
        self.tasks.remove(game_id).map(|(_, handle)| handle)
    }

    pub fn contains(&self, game_id: &str) -> bool {
        self.tasks.contains_key(game_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drain every handle, for shutdown.
    pub fn drain(&self) -> Vec<TaskHandle> {
        let ids: Vec<String> = self.tasks.iter().map(|t| t.key().clone()).collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }
}
