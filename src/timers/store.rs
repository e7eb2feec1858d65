//! Persisted-timer-store collaborator.

use super::task::PersistentTimerTask;
use crate::identity::ComponentName;
use dashmap::DashMap;
use uuid::Uuid;

/// A stored timer: the store-assigned id plus the task record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTimer {
    pub id: Uuid,
    pub task: PersistentTimerTask,
}

/// Narrow store contract the kernel consumes. Row locks serialize one
/// timer's expiration against its cancellation; the kernel always takes the
/// owning instance's lock first, the row lock second.
pub trait TimerStore: Send + Sync {
    fn create(&self, task: PersistentTimerTask) -> Uuid;

    fn get(&self, id: Uuid) -> Option<PersistentTimerTask>;

    /// Replace a stored task (reschedule after a repeating fire). Returns
    /// false when the timer no longer exists.
    fn update(&self, id: Uuid, task: PersistentTimerTask) -> bool;

    /// Remove a timer (cancel, or auto-delete after a one-shot fire).
    fn remove(&self, id: Uuid) -> bool;

    /// Take the row lock for `id`; false when already held or missing.
    fn lock_row(&self, id: Uuid) -> bool;

    fn unlock_row(&self, id: Uuid);

    /// All timers owned by the named component.
    fn timers_for(&self, name: &ComponentName) -> Vec<StoredTimer>;
}

/// In-memory store double used by tests and embedders without persistence.
#[derive(Debug, Default)]
pub struct InMemoryTimerStore {
    timers: DashMap<Uuid, PersistentTimerTask>,
    locked: DashMap<Uuid, ()>,
}

impl InMemoryTimerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl TimerStore for InMemoryTimerStore {
    fn create(&self, task: PersistentTimerTask) -> Uuid {
        let id = Uuid::new_v4();
        self.timers.insert(id, task);
        id
    }

    fn get(&self, id: Uuid) -> Option<PersistentTimerTask> {
        self.timers.get(&id).map(|e| e.value().clone())
    }

    fn update(&self, id: Uuid, task: PersistentTimerTask) -> bool {
        match self.timers.get_mut(&id) {
            Some(mut entry) => {
                *entry.value_mut() = task;
                true
            }
            None => false,
        }
    }

    fn remove(&self, id: Uuid) -> bool {
        self.locked.remove(&id);
        self.timers.remove(&id).is_some()
    }

    fn lock_row(&self, id: Uuid) -> bool {
        if !self.timers.contains_key(&id) {
            return false;
        }
        self.locked.insert(id, ()).is_none()
    }

    fn unlock_row(&self, id: Uuid) {
        self.locked.remove(&id);
    }

    fn timers_for(&self, name: &ComponentName) -> Vec<StoredTimer> {
        self.timers
            .iter()
            .filter(|entry| entry.value().owner.name() == name)
            .map(|entry| StoredTimer {
                id: *entry.key(),
                task: entry.value().clone(),
            })
            .collect()
    }
}
