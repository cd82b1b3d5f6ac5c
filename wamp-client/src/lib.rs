//! Asynchronous WAMP client.
//!
//! A [`Client`] plays the caller, callee, publisher and subscriber roles over
//! one established session. Registered procedures are wrapped in a
//! [`Procedure`] that fixes how each invocation executes; outgoing calls are
//! driven through a [`Call`] handle.

pub mod call;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod invocation;
pub mod logging;
pub mod observer;
pub mod options;
pub mod procedure;
pub mod result;
pub mod runner;

pub use call::{Call, CallOptions, CallState, ProgressHandler};
pub use client::{Client, ClientStats, EventHandler};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use event::SubscriptionEvent;
pub use invocation::Invocation;
pub use observer::{Diagnostic, NoopObserver, Observer, RecordingObserver};
pub use options::{PublishOptions, RecipientFilter, RegisterOptions, SubscribeOptions};
pub use procedure::{Procedure, ProcedureKind};
pub use result::{HandlerResult, InvocationResult};
pub use runner::{ProcedureRunner, RunnerState};

pub use wamp_core::{
    Args, CancelMode, Dict, InvocationError, InvocationPolicy, MatchPolicy, PublicationId,
    RegistrationId, RequestId, SubscriptionId,
};
pub use wamp_transport::{Connection, Session, TransportError};
