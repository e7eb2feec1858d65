#![allow(clippy::doc_markdown)] // Allow technical terms like UTF-8, DashMap in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Bean Kernel
//!
//! Instance kernel for an enterprise component container: the lifecycle,
//! locking, invocation, and identity machinery that sits between a dispatch
//! surface and the component implementations it hosts.
//!
//! ## Overview
//!
//! Every managed component kind (stateless, stateful, singleton,
//! message-driven) runs its instances through an explicit per-kind state
//! machine with table-driven operation guards. Around that core the kernel
//! provides:
//!
//! - a compact versioned **binary identity codec** shared by the remoting
//!   layer and the persistent timer store, tolerant of both byte orders
//! - **shared-instance locking** for singletons with loopback-upgrade
//!   detection and a timer-enumeration deadlock probe
//! - **exception mapping** that classifies every failure exactly once into
//!   the application or system family appropriate to the calling channel
//! - **persistent timers** with interval and calendar-expression triggers,
//!   revalidated against the installed deployment on every expiration
//!
//! ## Module Organization
//!
//! - [`identity`] - Component identity values and the binary codec
//! - [`lifecycle`] - Per-kind state machines, instance records, and drivers
//! - [`locking`] - Shared-instance access locks and hold bookkeeping
//! - [`invocation`] - Invocation/callback contexts and method metadata
//! - [`faults`] - Failure taxonomy and per-channel exception mapping
//! - [`timers`] - Persistent timer tasks, calendar schedules, expiration
//! - [`registry`] - Installed-component registrations
//! - [`dispatch`] - The kernel facade tying the subsystems together
//! - [`config`] - Kernel configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bean_kernel::config::KernelConfig;
//! use bean_kernel::dispatch::Kernel;
//! use bean_kernel::invocation::RecordingTransaction;
//! use std::sync::Arc;
//!
//! let kernel = Kernel::new(KernelConfig::default(), Arc::new(RecordingTransaction::new()));
//! println!("platform: {:?}", kernel.config().platform);
//! ```

pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod faults;
pub mod identity;
pub mod invocation;
pub mod lifecycle;
pub mod locking;
pub mod logging;
pub mod registry;
pub mod test_support;
pub mod timers;

pub use config::{KernelConfig, Platform};
pub use dispatch::Kernel;
pub use error::{KernelError, Result};
pub use faults::{Fault, MappedFault, VisibleException};
pub use identity::{ComponentIdentity, ComponentKind, ComponentName, PrimaryKey};
pub use registry::{ComponentDescriptor, ComponentRegistry};
