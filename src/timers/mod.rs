//! # Persistent Timers
//!
//! Timer task records with a versioned binary form, calendar schedules,
//! the store collaborator, and the expiration driver.

pub mod runner;
pub mod schedule;
pub mod store;
pub mod task;

pub use runner::{TimeoutDispatcher, TimerOutcome, TimerRunner};
pub use schedule::{CalendarSchedule, ScheduleSpec};
pub use store::{InMemoryTimerStore, StoredTimer, TimerStore};
pub use task::{AutoTimerMethod, PersistentTimerTask, TimerTrigger};
