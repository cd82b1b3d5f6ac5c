//! Diagnostics for inconsistencies the client absorbs instead of failing.
//!
//! Every diagnostic is logged through `tracing` and handed to the client's
//! [`Observer`]. The default observer ignores them; tests install a recording
//! one to assert on what happened.

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::warn;
use wamp_core::{MessageKind, RegistrationId, RequestId, SubscriptionId};

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// INVOCATION for a registration this client does not know.
    UnknownRegistration {
        request_id: RequestId,
        registration_id: RegistrationId,
    },
    /// INTERRUPT for an invocation that is not running (anymore).
    UnknownInterrupt { request_id: RequestId },
    /// Response whose request id matches no waiter and no call.
    OrphanedResponse {
        request_id: RequestId,
        kind: MessageKind,
    },
    /// EVENT for a subscription this client does not know.
    UnknownSubscription { subscription_id: SubscriptionId },
    /// Final response for a call that was already settled.
    DuplicateResponse {
        request_id: RequestId,
        kind: MessageKind,
    },
    /// Progress result for a call that was already settled.
    LateProgress { request_id: RequestId },
    /// A progress, result or error for an invocation that was already done.
    SendAfterDone {
        request_id: RequestId,
        kind: MessageKind,
    },
    /// A streaming procedure ended without producing a final value.
    EmptyFinalResult { request_id: RequestId },
    /// The procedure factory failed before execution started.
    ProcedureStartFailed {
        request_id: RequestId,
        registration_id: RegistrationId,
        error: String,
    },
    /// The task driving a procedure panicked or was aborted.
    RunnerFailed { request_id: RequestId, reason: String },
    /// A subscription handler returned an error.
    SubscriberFailed {
        subscription_id: SubscriptionId,
        error: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnknownRegistration {
                request_id,
                registration_id,
            } => write!(
                f,
                "invocation {} for unknown {}",
                request_id.as_u64(),
                registration_id
            ),
            Diagnostic::UnknownInterrupt { request_id } => {
                write!(f, "interrupt for unknown invocation {}", request_id.as_u64())
            }
            Diagnostic::OrphanedResponse { request_id, kind } => {
                write!(f, "orphaned {} for request {}", kind, request_id.as_u64())
            }
            Diagnostic::UnknownSubscription { subscription_id } => {
                write!(f, "event for unknown {}", subscription_id)
            }
            Diagnostic::DuplicateResponse { request_id, kind } => write!(
                f,
                "duplicate {} for settled call {}",
                kind,
                request_id.as_u64()
            ),
            Diagnostic::LateProgress { request_id } => {
                write!(f, "late progress for settled call {}", request_id.as_u64())
            }
            Diagnostic::SendAfterDone { request_id, kind } => write!(
                f,
                "dropped {} for finished invocation {}",
                kind,
                request_id.as_u64()
            ),
            Diagnostic::EmptyFinalResult { request_id } => write!(
                f,
                "procedure for invocation {} produced no final result, sending an empty one",
                request_id.as_u64()
            ),
            Diagnostic::ProcedureStartFailed {
                request_id,
                registration_id,
                error,
            } => write!(
                f,
                "procedure for {} failed to start invocation {}: {}",
                registration_id,
                request_id.as_u64(),
                error
            ),
            Diagnostic::RunnerFailed { request_id, reason } => {
                write!(f, "runner for invocation {} failed: {}", request_id.as_u64(), reason)
            }
            Diagnostic::SubscriberFailed {
                subscription_id,
                error,
            } => write!(f, "handler for {} failed: {}", subscription_id, error),
        }
    }
}

pub trait Observer: Send + Sync {
    fn diagnostic(&self, diagnostic: Diagnostic);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn diagnostic(&self, _diagnostic: Diagnostic) {}
}

/// Observer that keeps every diagnostic it receives.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    seen: Mutex<Vec<Diagnostic>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self.seen.lock() {
            Ok(seen) => seen.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Observer for RecordingObserver {
    fn diagnostic(&self, diagnostic: Diagnostic) {
        match self.seen.lock() {
            Ok(mut seen) => seen.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}

pub(crate) fn report(observer: &dyn Observer, diagnostic: Diagnostic) {
    warn!(%diagnostic, "absorbed protocol inconsistency");
    observer.diagnostic(diagnostic);
}
