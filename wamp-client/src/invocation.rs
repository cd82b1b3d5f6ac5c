//! Callee side of one inbound RPC.

use crate::error::Error;
use crate::observer::{report, Diagnostic, Observer};
use crate::result::InvocationResult;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use wamp_core::msg::{self, ErrorMessage, Interrupt, Yield};
use wamp_core::{
    Args, CancelMode, Dict, InvocationError, Message, MessageKind, RegistrationId, RequestId,
};
use wamp_transport::Session;

#[derive(Default)]
struct State {
    done: bool,
    interrupt: Option<Interrupt>,
}

struct InvocationInner {
    request_id: RequestId,
    registration_id: RegistrationId,
    registered_uri: String,
    args: Args,
    kwargs: Dict,
    details: Dict,
    session: Arc<dyn Session>,
    observer: Arc<dyn Observer>,
    state: Mutex<State>,
    interrupted: CancellationToken,
}

/// Handle a procedure uses to answer one invocation. Cheap to clone.
///
/// At most one final message (result or error) is ever sent. Anything sent
/// after that is dropped and reported as a diagnostic.
#[derive(Clone)]
pub struct Invocation(Arc<InvocationInner>);

impl Invocation {
    pub(crate) fn new(
        msg: msg::Invocation,
        registered_uri: String,
        session: Arc<dyn Session>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Invocation(Arc::new(InvocationInner {
            request_id: msg.request_id,
            registration_id: msg.registration_id,
            registered_uri,
            args: msg.args,
            kwargs: msg.kwargs,
            details: msg.details,
            session,
            observer,
            state: Mutex::new(State::default()),
            interrupted: CancellationToken::new(),
        }))
    }

    pub fn request_id(&self) -> RequestId {
        self.0.request_id
    }

    pub fn registration_id(&self) -> RegistrationId {
        self.0.registration_id
    }

    pub fn args(&self) -> &[Value] {
        &self.0.args
    }

    pub fn kwargs(&self) -> &Dict {
        &self.0.kwargs
    }

    pub fn details(&self) -> &Dict {
        &self.0.details
    }

    /// Positional argument `index`, or an invalid-argument error naming it.
    pub fn arg(&self, index: usize) -> Result<&Value, InvocationError> {
        self.0.args.get(index).ok_or_else(|| {
            InvocationError::invalid_argument(format!("missing positional argument {}", index))
        })
    }

    pub fn arg_as<T: DeserializeOwned>(&self, index: usize) -> Result<T, InvocationError> {
        let value = self.arg(index)?;
        serde_json::from_value(value.clone()).map_err(|e| {
            InvocationError::invalid_argument(format!("positional argument {}: {}", index, e))
        })
    }

    /// Keyword argument `key`, or an invalid-argument error naming it.
    pub fn kwarg(&self, key: &str) -> Result<&Value, InvocationError> {
        self.0.kwargs.get(key).ok_or_else(|| {
            InvocationError::invalid_argument(format!("missing keyword argument {:?}", key))
        })
    }

    pub fn kwarg_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, InvocationError> {
        let value = self.kwarg(key)?;
        serde_json::from_value(value.clone()).map_err(|e| {
            InvocationError::invalid_argument(format!("keyword argument {:?}: {}", key, e))
        })
    }

    /// Concrete procedure URI that was called.
    ///
    /// Differs from the registered URI only for pattern-based registrations.
    pub fn procedure(&self) -> &str {
        self.0
            .details
            .get("procedure")
            .and_then(Value::as_str)
            .unwrap_or(&self.0.registered_uri)
    }

    pub fn registered_uri(&self) -> &str {
        &self.0.registered_uri
    }

    /// Whether the caller asked for progress results.
    pub fn may_send_progress(&self) -> bool {
        self.0
            .details
            .get("receive_progress")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Caller session id, when disclosed.
    pub fn caller_id(&self) -> Option<u64> {
        self.0.details.get("caller").and_then(Value::as_u64)
    }

    pub fn trust_level(&self) -> Option<u64> {
        self.0.details.get("trustlevel").and_then(Value::as_u64)
    }

    /// Callee-enforced timeout forwarded by the dealer, in milliseconds on
    /// the wire.
    pub fn timeout(&self) -> Option<Duration> {
        self.0
            .details
            .get("timeout")
            .and_then(Value::as_u64)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn is_done(&self) -> bool {
        self.lock_state().done
    }

    /// The INTERRUPT received for this invocation, if any.
    pub fn interrupt(&self) -> Option<Interrupt> {
        self.lock_state().interrupt.clone()
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.interrupted.is_cancelled()
    }

    /// Resolves once an interrupt arrives.
    pub async fn interrupted(&self) {
        self.0.interrupted.cancelled().await
    }

    /// Token cancelled on interrupt, for `select!` in handler code.
    pub fn interrupt_token(&self) -> CancellationToken {
        self.0.interrupted.child_token()
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.0
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn dropped_after_done(&self, kind: MessageKind) -> Error {
        report(
            &*self.0.observer,
            Diagnostic::SendAfterDone {
                request_id: self.0.request_id,
                kind,
            },
        );
        Error::AlreadyDone
    }

    /// Send an intermediate result.
    pub async fn send_progress(&self, progress: InvocationResult) -> Result<(), Error> {
        if self.is_done() {
            return Err(self.dropped_after_done(MessageKind::Yield));
        }
        if !self.may_send_progress() {
            return Err(Error::ProgressUnavailable);
        }
        if self.is_interrupted() {
            return Err(Error::Interrupted);
        }

        let mut options = progress.details;
        options.insert("progress".into(), Value::Bool(true));
        trace!(request_id = %self.0.request_id, "sending progress");
        self.0
            .session
            .send(Message::Yield(Yield {
                request_id: self.0.request_id,
                options,
                args: progress.args,
                kwargs: progress.kwargs,
            }))
            .await?;
        Ok(())
    }

    /// Send the final result and mark the invocation done.
    pub async fn send_result(&self, result: InvocationResult) -> Result<(), Error> {
        self.mark_done(MessageKind::Yield)?;

        debug!(request_id = %self.0.request_id, "sending result");
        self.0
            .session
            .send(Message::Yield(Yield {
                request_id: self.0.request_id,
                options: result.details,
                args: result.args,
                kwargs: result.kwargs,
            }))
            .await?;
        Ok(())
    }

    /// Send an error and mark the invocation done.
    pub async fn send_error(&self, error: InvocationError) -> Result<(), Error> {
        self.mark_done(MessageKind::Error)?;

        debug!(request_id = %self.0.request_id, uri = %error.uri, "sending error");
        self.0
            .session
            .send(Message::Error(ErrorMessage {
                request_kind: MessageKind::Invocation,
                request_id: self.0.request_id,
                details: error.details,
                error: error.uri,
                args: error.args,
                kwargs: error.kwargs,
            }))
            .await?;
        Ok(())
    }

    fn mark_done(&self, kind: MessageKind) -> Result<(), Error> {
        let already_done = std::mem::replace(&mut self.lock_state().done, true);
        if already_done {
            return Err(self.dropped_after_done(kind));
        }
        Ok(())
    }

    /// Record an interrupt and wake the handler.
    ///
    /// With mode `killnowait` the caller has already been answered, so the
    /// invocation is done on the spot.
    pub(crate) fn receive_interrupt(&self, interrupt: Interrupt) -> CancelMode {
        let mode = interrupt_mode(&interrupt);
        {
            let mut state = self.lock_state();
            if mode == CancelMode::KillNoWait {
                state.done = true;
            }
            state.interrupt = Some(interrupt);
        }
        self.0.interrupted.cancel();
        mode
    }
}

/// Cancel mode requested by an INTERRUPT, `kill` when absent or unknown.
pub(crate) fn interrupt_mode(interrupt: &Interrupt) -> CancelMode {
    interrupt
        .options
        .get("mode")
        .and_then(Value::as_str)
        .and_then(CancelMode::parse)
        .unwrap_or(CancelMode::Kill)
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("request_id", &self.0.request_id)
            .field("registration_id", &self.0.registration_id)
            .field("procedure", &self.procedure())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::observer::{NoopObserver, RecordingObserver};
    use serde_json::json;
    use wamp_transport::memory::{pair, MemoryPeer};

    pub(crate) fn invocation_with(
        details: Dict,
        observer: Arc<dyn Observer>,
    ) -> (Invocation, MemoryPeer) {
        let (connection, peer) = pair(16);
        let mut kwargs = Dict::new();
        kwargs.insert("name".into(), json!("alice"));
        let msg = msg::Invocation {
            request_id: RequestId::new(11),
            registration_id: RegistrationId::new(5),
            details,
            args: vec![json!(2), json!("three")],
            kwargs,
        };
        let invocation = Invocation::new(
            msg,
            "com.example.greet".into(),
            connection.session,
            observer,
        );
        (invocation, peer)
    }

    fn progress_details() -> Dict {
        let mut details = Dict::new();
        details.insert("receive_progress".into(), json!(true));
        details
    }

    fn interrupt(mode: &str) -> Interrupt {
        let mut options = Dict::new();
        options.insert("mode".into(), json!(mode));
        Interrupt {
            request_id: RequestId::new(11),
            options,
        }
    }

    #[test]
    fn test_accessors() {
        let mut details = Dict::new();
        details.insert("procedure".into(), json!("com.example.greet.fr"));
        details.insert("caller".into(), json!(42));
        details.insert("trustlevel".into(), json!(1));
        details.insert("timeout".into(), json!(1500));
        let (invocation, _peer) = invocation_with(details, Arc::new(NoopObserver));

        assert_eq!(invocation.procedure(), "com.example.greet.fr");
        assert_eq!(invocation.registered_uri(), "com.example.greet");
        assert_eq!(invocation.caller_id(), Some(42));
        assert_eq!(invocation.trust_level(), Some(1));
        assert_eq!(invocation.timeout(), Some(Duration::from_millis(1500)));
        assert!(!invocation.may_send_progress());

        assert_eq!(invocation.arg_as::<i64>(0).unwrap(), 2);
        assert_eq!(invocation.kwarg_as::<String>("name").unwrap(), "alice");

        let missing = invocation.arg(5).unwrap_err();
        assert_eq!(missing.uri, wamp_core::uri::INVALID_ARGUMENT);
        assert_eq!(missing.message(), Some("missing positional argument 5"));
        assert!(invocation.arg_as::<i64>(1).is_err());
        assert!(invocation.kwarg("age").is_err());
    }

    #[tokio::test]
    async fn test_result_is_sent_once() {
        let observer = RecordingObserver::new();
        let (invocation, mut peer) = invocation_with(Dict::new(), observer.clone());

        invocation
            .send_result(InvocationResult::with_args([json!("hi")]))
            .await
            .unwrap();
        assert!(invocation.is_done());

        let second = invocation
            .send_error(InvocationError::runtime("late"))
            .await;
        assert!(matches!(second, Err(Error::AlreadyDone)));

        assert_eq!(
            peer.try_recv(),
            Some(Message::Yield(Yield {
                request_id: RequestId::new(11),
                options: Dict::new(),
                args: vec![json!("hi")],
                kwargs: Dict::new(),
            }))
        );
        assert!(peer.try_recv().is_none());
        assert_eq!(
            observer.diagnostics(),
            vec![Diagnostic::SendAfterDone {
                request_id: RequestId::new(11),
                kind: MessageKind::Error,
            }]
        );
    }

    #[tokio::test]
    async fn test_error_message_shape() {
        let (invocation, mut peer) = invocation_with(Dict::new(), Arc::new(NoopObserver));
        invocation
            .send_error(InvocationError::invalid_argument("bad"))
            .await
            .unwrap();

        match peer.try_recv() {
            Some(Message::Error(err)) => {
                assert_eq!(err.request_kind, MessageKind::Invocation);
                assert_eq!(err.request_id, RequestId::new(11));
                assert_eq!(err.error, wamp_core::uri::INVALID_ARGUMENT);
                assert_eq!(err.args, vec![json!("bad")]);
            }
            other => panic!("Expected ERROR, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_progress_requires_caller_opt_in() {
        let (invocation, _peer) = invocation_with(Dict::new(), Arc::new(NoopObserver));
        let err = invocation.send_progress(InvocationResult::new()).await;
        assert!(matches!(err, Err(Error::ProgressUnavailable)));
    }

    #[tokio::test]
    async fn test_progress_is_flagged() {
        let (invocation, mut peer) = invocation_with(progress_details(), Arc::new(NoopObserver));
        invocation
            .send_progress(InvocationResult::new().arg(1))
            .await
            .unwrap();

        match peer.try_recv() {
            Some(Message::Yield(y)) => {
                assert_eq!(y.options.get("progress"), Some(&json!(true)));
                assert_eq!(y.args, vec![json!(1)]);
            }
            other => panic!("Expected YIELD, got {:?}", other),
        }
        assert!(!invocation.is_done());
    }

    #[tokio::test]
    async fn test_progress_refused_after_interrupt() {
        let (invocation, _peer) = invocation_with(progress_details(), Arc::new(NoopObserver));

        assert_eq!(invocation.receive_interrupt(interrupt("kill")), CancelMode::Kill);
        assert!(invocation.is_interrupted());
        assert!(!invocation.is_done());
        assert!(matches!(
            invocation.send_progress(InvocationResult::new()).await,
            Err(Error::Interrupted)
        ));

        // A graceful final answer is still allowed.
        invocation
            .send_error(InvocationError::canceled("stopped"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_killnowait_interrupt_marks_done() {
        let (invocation, mut peer) = invocation_with(Dict::new(), Arc::new(NoopObserver));

        assert_eq!(
            invocation.receive_interrupt(interrupt("killnowait")),
            CancelMode::KillNoWait
        );
        invocation.interrupted().await;
        assert!(invocation.is_done());
        assert!(invocation.interrupt().is_some());
        assert!(invocation.send_result(InvocationResult::new()).await.is_err());
        assert!(peer.try_recv().is_none());
    }
}
