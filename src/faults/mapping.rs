//! The channel-selected mapping decision procedure.

use super::{AppExceptionRule, BusinessError, FaultKind, MappedFault, VisibleException};
use crate::error::{ConcurrentAccessTimeoutError, IllegalStateError, NotInstalledError, SystemFault};
use crate::invocation::{DiagnosticSink, InvocationContext, MethodChannel};
use tracing::{debug, error};

/// A failure entering mapping, tagged by where it arose. The tag is the
/// decision input; classification never inspects message text.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Raised by the business method or a lifecycle callback.
    Business(BusinessError),
    /// The instance could not be found or activated; the method never ran.
    NotFound(NotInstalledError),
    /// Reentrant call denied during pre-invoke; the method never ran.
    Reentrancy(IllegalStateError),
    /// Lock not acquired within budget; the method never ran.
    LockDenied(ConcurrentAccessTimeoutError),
    /// Kernel-internal failure.
    System(SystemFault),
}

impl From<BusinessError> for Fault {
    fn from(err: BusinessError) -> Self {
        Self::Business(err)
    }
}

impl From<NotInstalledError> for Fault {
    fn from(err: NotInstalledError) -> Self {
        Self::NotFound(err)
    }
}

impl From<ConcurrentAccessTimeoutError> for Fault {
    fn from(err: ConcurrentAccessTimeoutError) -> Self {
        Self::LockDenied(err)
    }
}

impl From<SystemFault> for Fault {
    fn from(fault: SystemFault) -> Self {
        Self::System(fault)
    }
}

impl From<IllegalStateError> for Fault {
    fn from(err: IllegalStateError) -> Self {
        match err {
            IllegalStateError::Reentrancy { .. } => Self::Reentrancy(err),
            other => Self::System(SystemFault::new(other.to_string())),
        }
    }
}

/// Policy object selected per invocation channel. One instance maps one
/// fault per context; re-entry returns the recorded result unchanged.
pub struct MappingStrategy<'a> {
    channel: MethodChannel,
    /// Module-generation gate: only versioned modules declare application
    /// exceptions.
    supports_app_exceptions: bool,
    app_exceptions: &'a [AppExceptionRule],
    nest_remote_causes: bool,
    nest_remote_causes_always: bool,
    diagnostics: &'a dyn DiagnosticSink,
}

impl<'a> MappingStrategy<'a> {
    pub fn new(
        channel: MethodChannel,
        supports_app_exceptions: bool,
        app_exceptions: &'a [AppExceptionRule],
        nest_remote_causes: bool,
        nest_remote_causes_always: bool,
        diagnostics: &'a dyn DiagnosticSink,
    ) -> Self {
        Self {
            channel,
            supports_app_exceptions,
            app_exceptions,
            nest_remote_causes,
            nest_remote_causes_always,
            diagnostics,
        }
    }

    fn remote(&self) -> bool {
        self.channel == MethodChannel::Remote
    }

    /// Map `fault` for this invocation and record the result on the context.
    pub fn map(&self, ctx: &mut InvocationContext, fault: Fault) -> MappedFault {
        if let Some(previous) = ctx.mapped_fault() {
            debug!(method = %ctx.method().signature, "mapping re-entered; returning recorded result");
            return previous.clone();
        }
        let mapped = self.classify(ctx, fault);
        ctx.record_mapped_fault(mapped.clone());
        mapped
    }

    fn classify(&self, ctx: &mut InvocationContext, fault: Fault) -> MappedFault {
        match fault {
            Fault::Business(err) => self.map_business(ctx, err),
            Fault::NotFound(err) => MappedFault {
                kind: FaultKind::Application,
                rollback_marked: false,
                logged: false,
                visible: VisibleException::NoSuchInstance {
                    message: err.to_string(),
                    remote: self.remote(),
                },
            },
            Fault::Reentrancy(err) => MappedFault {
                kind: FaultKind::Application,
                rollback_marked: false,
                logged: false,
                visible: VisibleException::ConcurrentAccess {
                    message: err.to_string(),
                    remote: self.remote(),
                },
            },
            Fault::LockDenied(err) => MappedFault {
                kind: FaultKind::Application,
                rollback_marked: false,
                logged: false,
                visible: VisibleException::ConcurrentAccess {
                    message: err.to_string(),
                    remote: self.remote(),
                },
            },
            Fault::System(fault) => self.map_system(ctx, fault),
        }
    }

    fn map_business(&self, ctx: &mut InvocationContext, err: BusinessError) -> MappedFault {
        // Declarative registry consult; transport exceptions are never
        // eligible no matter what the registry declares.
        if self.supports_app_exceptions && !err.channel_transport {
            if let Some(rule) = self
                .app_exceptions
                .iter()
                .find(|rule| rule.error_type == err.error_type)
            {
                let mut rollback_marked = false;
                if rule.rollback && ctx.tx_active() {
                    ctx.transaction().mark_rollback_only();
                    rollback_marked = true;
                }
                return MappedFault {
                    kind: FaultKind::Application,
                    rollback_marked,
                    logged: false,
                    visible: VisibleException::Application {
                        error_type: err.error_type,
                        message: err.message,
                    },
                };
            }
        }
        if !err.unchecked && !err.channel_transport {
            // Declared failures propagate verbatim without registration.
            return MappedFault {
                kind: FaultKind::Application,
                rollback_marked: false,
                logged: false,
                visible: VisibleException::Application {
                    error_type: err.error_type,
                    message: err.message,
                },
            };
        }
        self.map_system(ctx, err.as_system_fault())
    }

    fn map_system(&self, ctx: &mut InvocationContext, fault: SystemFault) -> MappedFault {
        error!(
            method = %ctx.method().signature,
            identity = %ctx.identity(),
            error = %fault,
            "system-level failure during invocation"
        );
        self.diagnostics.capture(&ctx.method().signature, &fault);

        let mut rollback_marked = false;
        if ctx.tx_active() {
            ctx.transaction().mark_rollback_only();
            rollback_marked = true;
        }

        let origin = fault.root_cause().message.clone();
        let message = fault.message.clone();

        // A failure inside the caller's inherited transaction dooms that
        // transaction and must say so; a transaction begun by this method is
        // the kernel's own to roll back, so the general family applies.
        let inherited_tx_doomed = rollback_marked && !ctx.tx_begun_here();

        let visible = if self.remote() {
            // The nested-cause wrapping prefers a generic wrapper over the
            // rolled-back form so downstream unwrapping cannot strip the
            // cause. Applied only when this method began the transaction,
            // unless the override flag widens it to inherited transactions.
            let nest = self.nest_remote_causes
                && (ctx.tx_begun_here() || self.nest_remote_causes_always);
            if inherited_tx_doomed && !nest {
                VisibleException::RemoteTransactionRolledBack { message, origin }
            } else {
                VisibleException::RemoteGeneral {
                    message,
                    origin,
                    nested: nest.then(|| fault.clone()),
                }
            }
        } else if inherited_tx_doomed {
            VisibleException::LocalTransactionRolledBack { message, origin }
        } else {
            VisibleException::LocalGeneral { message, origin }
        };

        MappedFault {
            kind: FaultKind::System,
            rollback_marked,
            logged: true,
            visible,
        }
    }
}
