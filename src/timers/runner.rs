//! Timer expiration driver.
//!
//! One [`TimerRunner::run`] call drives a single expiration through its
//! state machine: owner re-resolution, automatic-timer method validation,
//! instance-lock-then-row-lock acquisition, callback dispatch, and the
//! reschedule-or-delete decision. Retry of retryable failures is the
//! external scheduler's decision, never taken here.

use super::store::TimerStore;
use super::task::{PersistentTimerTask, TimerTrigger};
use crate::error::SystemFault;
use crate::faults::Fault;
use crate::registry::ComponentRegistry;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of one expiration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerOutcome {
    /// The callback ran; `next` is the persisted next expiration, or `None`
    /// when the timer was one-shot and has been deleted.
    Completed { next: Option<DateTime<Utc>> },
    /// The kernel is shutting down; the expiration neither ran nor failed
    /// in an application sense, and the timer stays due.
    SkippedShutdown,
    /// The callback (or its lock acquisition) failed; the timer remains
    /// stored and the scheduler may retry.
    FailedRetryable(String),
    /// The timer can never fire successfully again (canceled, owner gone,
    /// or incompatible redeploy); it has been removed from the store.
    FailedTerminal(String),
}

/// What the runner needs from the dispatch layer: the timeout invocation
/// itself, with the store row lock taken through `lock_row` only once the
/// owning instance's lock is held, preserving lock-before-store order.
pub trait TimeoutDispatcher: Send + Sync {
    fn dispatch_timeout(
        &self,
        task: &PersistentTimerTask,
        method_name: &str,
        lock_row: &mut dyn FnMut() -> Result<(), Fault>,
    ) -> Result<(), Fault>;

    fn shutting_down(&self) -> bool;
}

pub struct TimerRunner<'a> {
    registry: &'a ComponentRegistry,
    store: &'a dyn TimerStore,
    dispatcher: &'a dyn TimeoutDispatcher,
}

impl<'a> TimerRunner<'a> {
    pub fn new(
        registry: &'a ComponentRegistry,
        store: &'a dyn TimerStore,
        dispatcher: &'a dyn TimeoutDispatcher,
    ) -> Self {
        Self {
            registry,
            store,
            dispatcher,
        }
    }

    pub fn run(&self, id: Uuid, now: DateTime<Utc>) -> TimerOutcome {
        if self.dispatcher.shutting_down() {
            debug!(timer = %id, "expiration skipped: shutting down");
            return TimerOutcome::SkippedShutdown;
        }

        let Some(task) = self.store.get(id) else {
            return TimerOutcome::FailedTerminal(format!("timer {id} no longer exists"));
        };

        let Some(descriptor) = self.registry.get(task.owner.name()) else {
            self.store.remove(id);
            return TimerOutcome::FailedTerminal(format!(
                "component {} is no longer installed",
                task.owner.name()
            ));
        };

        let method_name = match &task.auto_method {
            Some(auto) => {
                // An incompatible redeploy invalidates the persisted method
                // binding; firing the wrong method would be worse than
                // failing.
                match descriptor.timer_method(auto.method_id) {
                    Some(declared)
                        if declared.method_name == auto.method_name
                            && declared.declaring_class == auto.declaring_class =>
                    {
                        auto.method_name.as_str()
                    }
                    Some(declared) => {
                        self.store.remove(id);
                        return TimerOutcome::FailedTerminal(format!(
                            "timer {id} bound to {}#{} but redeploy declares {}#{}",
                            auto.declaring_class,
                            auto.method_name,
                            declared.declaring_class,
                            declared.method_name
                        ));
                    }
                    None => {
                        self.store.remove(id);
                        return TimerOutcome::FailedTerminal(format!(
                            "timer {id} references method id {} no longer declared by {}",
                            auto.method_id,
                            task.owner.name()
                        ));
                    }
                }
            }
            None if descriptor.supports_timers() => "onTimeout",
            None => {
                self.store.remove(id);
                return TimerOutcome::FailedTerminal(format!(
                    "component {} no longer supports timers",
                    task.owner.name()
                ));
            }
        };

        let store = self.store;
        let mut row_locked = false;
        let mut lock_row = || {
            if store.lock_row(id) {
                row_locked = true;
                Ok(())
            } else {
                Err(Fault::System(SystemFault::new(format!(
                    "timer {id} row lock unavailable"
                ))))
            }
        };
        let result = self
            .dispatcher
            .dispatch_timeout(&task, method_name, &mut lock_row);
        if row_locked {
            self.store.unlock_row(id);
        }

        match result {
            Ok(()) => self.complete(id, task, now),
            Err(fault) => {
                let message = match &fault {
                    Fault::Business(err) => err.to_string(),
                    Fault::NotFound(err) => err.to_string(),
                    Fault::Reentrancy(err) => err.to_string(),
                    Fault::LockDenied(err) => err.to_string(),
                    Fault::System(err) => err.to_string(),
                };
                warn!(timer = %id, error = %message, "timeout callback failed");
                TimerOutcome::FailedRetryable(message)
            }
        }
    }

    fn complete(&self, id: Uuid, mut task: PersistentTimerTask, now: DateTime<Utc>) -> TimerOutcome {
        let next = match &task.trigger {
            TimerTrigger::Interval {
                expiration_millis,
                interval_millis: Some(interval),
            } if *interval > 0 => {
                // Advance past any missed periods so the next expiration is
                // in the future.
                let mut next = *expiration_millis;
                let now_millis = now.timestamp_millis();
                while next <= now_millis {
                    next += interval;
                }
                Some(next)
            }
            // Absent or non-positive interval: one-shot, the same
            // normalization the record decoder applies.
            TimerTrigger::Interval { .. } => None,
            TimerTrigger::Schedule(schedule) => {
                schedule.next_after(now).map(|dt| dt.timestamp_millis())
            }
        };

        match next {
            None => {
                self.store.remove(id);
                info!(timer = %id, "one-shot timer completed and deleted");
                TimerOutcome::Completed { next: None }
            }
            Some(next_millis) => {
                if let TimerTrigger::Interval {
                    expiration_millis, ..
                } = &mut task.trigger
                {
                    *expiration_millis = next_millis;
                }
                if !self.store.update(id, task) {
                    // Canceled while firing; nothing left to reschedule.
                    return TimerOutcome::FailedTerminal(format!(
                        "timer {id} was canceled during expiration"
                    ));
                }
                TimerOutcome::Completed {
                    next: DateTime::<Utc>::from_timestamp_millis(next_millis),
                }
            }
        }
    }
}
