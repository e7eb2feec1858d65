//! # Method Invocation Context
//!
//! One [`InvocationContext`] exists per business-method call and threads
//! through every collaborator for the duration of that call. Contexts are
//! always passed explicitly; nothing in the kernel fetches invocation state
//! from ambient thread storage, which keeps the concurrency contract
//! auditable.

pub mod context;
pub mod method;

pub use context::{
    CallbackContext, DiagnosticSink, InvocationContext, NoopDiagnostics, RecordingDiagnostics,
    RecordingTransaction, ResourceHandle, TransactionControl,
};
pub use method::{AccessTimeout, MethodChannel, MethodDescriptor, TransactionAttribute};
