//! # Instance Lifecycle
//!
//! Per-kind lifecycle state machines, the bounded instance pool, and the
//! kind drivers that move instances through creation, method dispatch, and
//! destruction. Each kind carries its own state enumeration and
//! allowed-operation table; the validation mechanics are shared.

pub mod instance;
pub mod message_driven;
pub mod pool;
pub mod pooled;
pub mod singleton;
pub mod stateful;
pub mod stateless;
pub mod states;
pub mod transitions;

pub use instance::{InstanceFactory, InstanceRecord, ManagedInstance};
pub use message_driven::MessageDrivenRuntime;
pub use pool::{InstancePool, PoolTicket};
pub use pooled::{PooledLifecycle, PooledRuntime};
pub use singleton::SingletonRuntime;
pub use stateful::StatefulRuntime;
pub use stateless::StatelessRuntime;
pub use states::{
    LifecycleState, MessageDrivenState, Operation, SingletonState, StatefulState, StatelessState,
};
