//! Caller side of one RPC.
//!
//! A [`Call`] is created by [`Client::call`](crate::Client::call) and is sent
//! lazily: the CALL message goes out on the first `send()`, `result()`,
//! `next_progress()` or `.await`. Until then progress can still be negotiated.
//!
//! Settlement happens exactly once, through a `watch` channel that every
//! waiter subscribes to. Progress results flow through an unbounded `mpsc`
//! queue whose sender is dropped at settlement, so a consumer draining
//! [`Call::next_progress`] sees every progress result before it sees the end.
//! The queue is only fed once someone asked for it: a call whose progress goes
//! to an [`on_progress`](Call::on_progress) handler alone buffers nothing.

use crate::error::Error;
use crate::observer::{report, Diagnostic, Observer};
use crate::result::InvocationResult;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::stream::{self, Stream};
use serde_json::Value;
use std::future::IntoFuture;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};
use wamp_core::msg::{self, Cancel};
use wamp_core::{Args, CancelMode, Dict, Message, RequestId};
use wamp_transport::Session;

pub type ProgressHandler = Arc<dyn Fn(InvocationResult) + Send + Sync>;

pub(crate) type CallTable = DashMap<RequestId, Call>;

/// Options of an outgoing call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub receive_progress: Option<bool>,
    pub timeout: Option<Duration>,
    pub disclose_me: Option<bool>,
    pub resource_key: Option<String>,
    pub cancel_mode: Option<CancelMode>,
    /// Additional options passed through verbatim.
    pub extra: Dict,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receive_progress(mut self, enabled: bool) -> Self {
        self.receive_progress = Some(enabled);
        self
    }

    /// Ask the dealer to cancel the call after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn disclose_me(mut self, disclose: bool) -> Self {
        self.disclose_me = Some(disclose);
        self
    }

    /// Route the call to the registration partition owning `key`.
    pub fn resource_key(mut self, key: impl Into<String>) -> Self {
        self.resource_key = Some(key.into());
        self
    }

    pub fn cancel_mode(mut self, mode: CancelMode) -> Self {
        self.cancel_mode = Some(mode);
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Options dict as sent in the CALL message, without `receive_progress`
    /// which is decided when the message is sent.
    pub(crate) fn to_dict(&self) -> Dict {
        let mut options = self.extra.clone();
        if let Some(timeout) = self.timeout {
            let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            options.insert("timeout".into(), Value::from(millis));
        }
        if let Some(disclose) = self.disclose_me {
            options.insert("disclose_me".into(), Value::from(disclose));
        }
        if let Some(key) = &self.resource_key {
            options.insert("rkey".into(), Value::from(key.clone()));
            options.insert("runmode".into(), Value::from("partition"));
        }
        options
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Created,
    Sent,
    Settled,
}

#[derive(Debug, Clone)]
enum Settlement {
    Response(Message),
    Cancelled,
    Killed(Error),
}

impl Settlement {
    fn into_result(self) -> Result<InvocationResult, Error> {
        match self {
            Settlement::Response(Message::Result(result)) => Ok(result.into()),
            Settlement::Response(Message::Error(err)) => Err(err.into()),
            Settlement::Response(other) => Err(Error::unexpected("RESULT or ERROR", other.kind())),
            Settlement::Cancelled => Err(Error::Cancelled),
            Settlement::Killed(err) => Err(err),
        }
    }
}

struct State {
    /// The CALL message, taken when it is sent.
    outgoing: Option<msg::Call>,
    sent: bool,
    progress_requested: bool,
    /// Set while a cancelled call waits for the peer's final response.
    cancelling: bool,
    progress_tx: Option<mpsc::UnboundedSender<InvocationResult>>,
    /// Whether progress results are queued for `next_progress`.
    feed_progress: bool,
    progress_handler: Option<ProgressHandler>,
}

struct CallInner {
    request_id: RequestId,
    receive_progress: Option<bool>,
    cancel_mode: CancelMode,
    cancel_wait: Duration,
    session: Arc<dyn Session>,
    observer: Arc<dyn Observer>,
    calls: Weak<CallTable>,
    state: Mutex<State>,
    settlement: watch::Sender<Option<Settlement>>,
    /// Flips to true once the peer sent its final response (or never will).
    peer_final: watch::Sender<bool>,
    progress_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<InvocationResult>>,
}

/// Handle to an outgoing call. Cheap to clone.
#[derive(Clone)]
pub struct Call(Arc<CallInner>);

pub(crate) struct CallParts {
    pub request_id: RequestId,
    pub procedure: String,
    pub args: Args,
    pub kwargs: Dict,
    pub options: CallOptions,
    pub default_cancel_mode: CancelMode,
    pub cancel_wait: Duration,
}

impl Call {
    pub(crate) fn new(
        parts: CallParts,
        session: Arc<dyn Session>,
        observer: Arc<dyn Observer>,
        calls: Weak<CallTable>,
    ) -> Self {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (settlement, _) = watch::channel(None);
        let (peer_final, _) = watch::channel(false);

        let outgoing = msg::Call {
            request_id: parts.request_id,
            options: parts.options.to_dict(),
            procedure: parts.procedure,
            args: parts.args,
            kwargs: parts.kwargs,
        };
        let receive_progress = parts.options.receive_progress;

        Call(Arc::new(CallInner {
            request_id: parts.request_id,
            receive_progress,
            cancel_mode: parts.options.cancel_mode.unwrap_or(parts.default_cancel_mode),
            cancel_wait: parts.cancel_wait,
            session,
            observer,
            calls,
            state: Mutex::new(State {
                outgoing: Some(outgoing),
                sent: false,
                progress_requested: receive_progress == Some(true),
                cancelling: false,
                progress_tx: Some(progress_tx),
                feed_progress: false,
                progress_handler: None,
            }),
            settlement,
            peer_final,
            progress_rx: tokio::sync::Mutex::new(progress_rx),
        }))
    }

    pub fn request_id(&self) -> RequestId {
        self.0.request_id
    }

    pub fn is_done(&self) -> bool {
        self.0.settlement.borrow().is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.0.settlement.borrow(), Some(Settlement::Cancelled))
    }

    pub fn state(&self) -> CallState {
        if self.is_done() {
            CallState::Settled
        } else if self.lock_state().sent {
            CallState::Sent
        } else {
            CallState::Created
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.0
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ptr_eq(&self, other: &Call) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Send the CALL message unless it already went out.
    ///
    /// A call that was settled before it could be sent (cancelled, or killed
    /// by session teardown) reports that failure instead.
    pub async fn send(&self) -> Result<(), Error> {
        let outgoing = {
            let mut state = self.lock_state();
            if state.sent {
                return Ok(());
            }
            if let Some(settlement) = self.0.settlement.borrow().clone() {
                return settlement.into_result().map(|_| ());
            }

            state.sent = true;
            let mut call = state.outgoing.take().ok_or(Error::AlreadySent)?;
            if state.progress_requested {
                call.options.insert("receive_progress".into(), Value::Bool(true));
                // Progress without a handler is kept for a later consumer.
                if state.progress_handler.is_none() {
                    state.feed_progress = true;
                }
            }
            call
        };

        debug!(request_id = %self.0.request_id, procedure = %outgoing.procedure, "sending call");
        if let Err(e) = self.0.session.send(Message::Call(outgoing)).await {
            let err = Error::from(e);
            self.kill(err.clone());
            return Err(err);
        }
        Ok(())
    }

    /// Send the call if needed and wait for its final result.
    ///
    /// Dropping the returned future before it completes cancels the call.
    pub async fn result(&self) -> Result<InvocationResult, Error> {
        let mut guard = CancelOnDrop(Some(self.clone()));
        let outcome = async {
            self.send().await?;
            self.settled().await.into_result()
        }
        .await;
        guard.disarm();
        outcome
    }

    async fn settled(&self) -> Settlement {
        let mut rx = self.0.settlement.subscribe();
        let settlement = match rx.wait_for(Option::is_some).await {
            Ok(settled) => settled.clone(),
            Err(_) => None,
        };
        settlement.unwrap_or(Settlement::Killed(Error::ClientClosed))
    }

    /// Next progress result, or `None` once the call is settled and every
    /// progress result was consumed.
    ///
    /// Enables `receive_progress` if the call was not sent yet.
    pub async fn next_progress(&self) -> Result<Option<InvocationResult>, Error> {
        self.request_progress()?;
        self.send().await?;

        let mut rx = self.0.progress_rx.lock().await;
        Ok(rx.recv().await)
    }

    /// Progress results as a stream, ending when the call settles.
    pub fn progress(&self) -> impl Stream<Item = Result<InvocationResult, Error>> + Send + 'static {
        stream::unfold(Some(self.clone()), |call| async move {
            let call = call?;
            match call.next_progress().await {
                Ok(Some(progress)) => Some((Ok(progress), Some(call))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    /// Invoke `handler` for every progress result. Must be set before the
    /// call is sent, at most once.
    pub fn on_progress<F>(&self, handler: F) -> Result<(), Error>
    where
        F: Fn(InvocationResult) + Send + Sync + 'static,
    {
        let mut state = self.lock_state();
        if state.progress_handler.is_some() {
            return Err(Error::ProgressHandlerAlreadySet);
        }
        if state.sent {
            return Err(Error::AlreadySent);
        }
        if self.0.receive_progress == Some(false) {
            return Err(Error::ProgressDisabled);
        }
        state.progress_requested = true;
        state.progress_handler = Some(Arc::new(handler));
        Ok(())
    }

    fn request_progress(&self) -> Result<(), Error> {
        if self.0.receive_progress == Some(false) {
            return Err(Error::ProgressDisabled);
        }
        let mut state = self.lock_state();
        if !state.progress_requested {
            if state.sent {
                return Err(Error::ProgressUnavailable);
            }
            state.progress_requested = true;
        }
        state.feed_progress = true;
        Ok(())
    }

    /// Cancel the call.
    ///
    /// The local result settles as cancelled right away. If the CALL was sent
    /// a CANCEL goes out and the peer's final response is awaited for at most
    /// the configured cancel wait. Never fails.
    pub async fn cancel(&self, mode: Option<CancelMode>, options: Option<Dict>) {
        let sent = {
            let mut state = self.lock_state();
            if !self.settle(Settlement::Cancelled) {
                return;
            }
            state.cancelling = state.sent;
            state.sent
        };
        self.close_progress();

        if !sent {
            debug!(request_id = %self.0.request_id, "cancelled unsent call");
            self.detach();
            return;
        }

        let mode = mode.unwrap_or(self.0.cancel_mode);
        let mut options = options.unwrap_or_default();
        options.insert("mode".into(), Value::from(mode.as_str()));

        debug!(request_id = %self.0.request_id, %mode, "cancelling call");
        let cancel = Message::Cancel(Cancel {
            request_id: self.0.request_id,
            options,
        });

        match self.0.session.send(cancel).await {
            Ok(()) => {
                let mut rx = self.0.peer_final.subscribe();
                if tokio::time::timeout(self.0.cancel_wait, rx.wait_for(|done| *done))
                    .await
                    .is_err()
                {
                    debug!(request_id = %self.0.request_id, "no final response after cancel");
                }
            }
            Err(e) => debug!(request_id = %self.0.request_id, error = %e, "failed to send cancel"),
        }

        self.0.peer_final.send_replace(true);
        self.detach();
    }

    /// Settle the call with `error` unless it is already settled.
    pub fn kill(&self, error: Error) {
        if self.settle(Settlement::Killed(error)) {
            trace!(request_id = %self.0.request_id, "call killed");
        }
        self.0.peer_final.send_replace(true);
        self.close_progress();
        self.detach();
    }

    /// Feed a response routed to this call. Returns whether the call is
    /// complete and its routing slot can be reclaimed.
    pub(crate) fn handle_response(&self, msg: Message) -> bool {
        let request_id = self.0.request_id;

        if self.is_done() {
            let cancelling = self.lock_state().cancelling;
            return match msg {
                Message::Result(result) if result.is_progress() => {
                    if !cancelling {
                        report(&*self.0.observer, Diagnostic::LateProgress { request_id });
                    }
                    !cancelling
                }
                other => {
                    let first_final = !*self.0.peer_final.borrow();
                    if cancelling && first_final {
                        trace!(request_id = %request_id, kind = %other.kind(), "final response after cancel");
                    } else {
                        report(
                            &*self.0.observer,
                            Diagnostic::DuplicateResponse {
                                request_id,
                                kind: other.kind(),
                            },
                        );
                    }
                    self.0.peer_final.send_replace(true);
                    true
                }
            };
        }

        match msg {
            Message::Result(result) if result.is_progress() => {
                self.deliver_progress(result.into());
                false
            }
            msg @ (Message::Result(_) | Message::Error(_)) => {
                trace!(request_id = %request_id, kind = %msg.kind(), "call settled");
                if !self.settle(Settlement::Response(msg.clone())) {
                    report(
                        &*self.0.observer,
                        Diagnostic::DuplicateResponse {
                            request_id,
                            kind: msg.kind(),
                        },
                    );
                }
                self.0.peer_final.send_replace(true);
                self.close_progress();
                true
            }
            other => {
                self.settle(Settlement::Killed(Error::unexpected(
                    "RESULT or ERROR",
                    other.kind(),
                )));
                self.0.peer_final.send_replace(true);
                self.close_progress();
                true
            }
        }
    }

    fn deliver_progress(&self, progress: InvocationResult) {
        let delivered = {
            let state = self.lock_state();
            state.progress_tx.as_ref().map(|tx| {
                if state.feed_progress {
                    let _ = tx.send(progress.clone());
                }
                state.progress_handler.clone()
            })
        };

        match delivered {
            Some(Some(handler)) => handler(progress),
            Some(None) => {}
            None => report(
                &*self.0.observer,
                Diagnostic::LateProgress {
                    request_id: self.0.request_id,
                },
            ),
        }
    }

    fn settle(&self, settlement: Settlement) -> bool {
        self.0.settlement.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(settlement);
            true
        })
    }

    fn close_progress(&self) {
        self.lock_state().progress_tx = None;
    }

    /// Remove this call from the client's routing table.
    fn detach(&self) {
        if let Some(calls) = self.0.calls.upgrade() {
            calls.remove_if(&self.0.request_id, |_, call| call.ptr_eq(self));
        }
    }
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("request_id", &self.0.request_id)
            .field("state", &self.state())
            .finish()
    }
}

impl IntoFuture for Call {
    type Output = Result<InvocationResult, Error>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.result().await })
    }
}

/// Cancels the call when a pending `result()` future is dropped.
struct CancelOnDrop(Option<Call>);

impl CancelOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let Some(call) = self.0.take() else {
            return;
        };
        if call.is_done() {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { call.cancel(None, None).await });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{NoopObserver, RecordingObserver};
    use serde_json::json;
    use wamp_core::msg::{ErrorMessage, ResultMessage};
    use wamp_core::MessageKind;
    use wamp_transport::memory::{pair, MemoryPeer};

    fn new_call(options: CallOptions) -> (Call, MemoryPeer, Arc<CallTable>) {
        new_call_observed(options, Arc::new(NoopObserver))
    }

    fn new_call_observed(
        options: CallOptions,
        observer: Arc<dyn Observer>,
    ) -> (Call, MemoryPeer, Arc<CallTable>) {
        let (connection, peer) = pair(16);
        let table = Arc::new(CallTable::new());
        let call = Call::new(
            CallParts {
                request_id: RequestId::new(1),
                procedure: "com.example.add".into(),
                args: vec![json!(1), json!(2)],
                kwargs: Dict::new(),
                options,
                default_cancel_mode: CancelMode::KillNoWait,
                cancel_wait: Duration::from_millis(50),
            },
            connection.session,
            observer,
            Arc::downgrade(&table),
        );
        table.insert(call.request_id(), call.clone());
        (call, peer, table)
    }

    fn result(args: Vec<Value>, progress: bool) -> Message {
        let mut details = Dict::new();
        if progress {
            details.insert("progress".into(), json!(true));
        }
        Message::Result(ResultMessage {
            request_id: RequestId::new(1),
            details,
            args,
            kwargs: Dict::new(),
        })
    }

    #[tokio::test]
    async fn test_send_is_at_most_once() {
        let (call, mut peer, _table) = new_call(CallOptions::new());

        call.send().await.unwrap();
        call.send().await.unwrap();

        match peer.try_recv() {
            Some(Message::Call(msg)) => {
                assert_eq!(msg.procedure, "com.example.add");
                assert!(!msg.options.contains_key("receive_progress"));
            }
            other => panic!("Expected CALL, got {:?}", other),
        }
        assert!(peer.try_recv().is_none());
        assert_eq!(call.state(), CallState::Sent);
    }

    #[tokio::test]
    async fn test_result_settles_once() {
        let (call, _peer, _table) = new_call(CallOptions::new());
        call.send().await.unwrap();

        assert!(call.handle_response(result(vec![json!(3)], false)));
        assert!(call.handle_response(result(vec![json!(4)], false)));

        let value = call.result().await.unwrap();
        assert_eq!(value.args, vec![json!(3)]);
        assert_eq!(call.state(), CallState::Settled);
    }

    #[tokio::test]
    async fn test_error_response_becomes_remote_error() {
        let (call, _peer, _table) = new_call(CallOptions::new());
        call.send().await.unwrap();

        call.handle_response(Message::Error(ErrorMessage {
            request_kind: MessageKind::Call,
            request_id: RequestId::new(1),
            details: Dict::new(),
            error: "com.example.overflow".into(),
            args: vec![json!("too big")],
            kwargs: Dict::new(),
        }));

        let err = call.result().await.unwrap_err();
        assert_eq!(err.uri(), Some("com.example.overflow"));
    }

    #[tokio::test]
    async fn test_unexpected_message_settles_call() {
        let (call, _peer, _table) = new_call(CallOptions::new());
        call.send().await.unwrap();

        let complete = call.handle_response(Message::Unregistered(msg::Unregistered {
            request_id: RequestId::new(1),
        }));
        assert!(complete);
        assert!(matches!(
            call.result().await,
            Err(Error::UnexpectedMessage {
                got: MessageKind::Unregistered,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_progress_drains_before_completion() {
        let (call, mut peer, _table) = new_call(CallOptions::new());

        // Attaching a progress consumer before sending negotiates progress.
        call.request_progress().unwrap();
        call.send().await.unwrap();
        match peer.try_recv() {
            Some(Message::Call(msg)) => {
                assert_eq!(msg.options.get("receive_progress"), Some(&json!(true)))
            }
            other => panic!("Expected CALL, got {:?}", other),
        }

        assert!(!call.handle_response(result(vec![json!(1)], true)));
        assert!(!call.handle_response(result(vec![json!(2)], true)));
        assert!(call.handle_response(result(vec![json!(3)], false)));

        let mut seen = Vec::new();
        while let Some(progress) = call.next_progress().await.unwrap() {
            seen.push(progress.args[0].clone());
        }
        assert_eq!(seen, vec![json!(1), json!(2)]);
        assert_eq!(call.result().await.unwrap().args, vec![json!(3)]);
    }

    #[tokio::test]
    async fn test_progress_rejected_after_plain_send() {
        let (call, _peer, _table) = new_call(CallOptions::new());
        call.send().await.unwrap();

        assert!(matches!(
            call.next_progress().await,
            Err(Error::ProgressUnavailable)
        ));
        assert!(matches!(
            call.on_progress(|_| {}),
            Err(Error::AlreadySent)
        ));
    }

    #[tokio::test]
    async fn test_progress_disabled_explicitly() {
        let (call, _peer, _table) = new_call(CallOptions::new().receive_progress(false));
        assert!(matches!(
            call.next_progress().await,
            Err(Error::ProgressDisabled)
        ));
        assert!(matches!(
            call.on_progress(|_| {}),
            Err(Error::ProgressDisabled)
        ));
    }

    #[tokio::test]
    async fn test_on_progress_only_once() {
        let (call, _peer, _table) = new_call(CallOptions::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        call.on_progress(move |p| sink.lock().unwrap().push(p.args)).unwrap();
        assert!(matches!(
            call.on_progress(|_| {}),
            Err(Error::ProgressHandlerAlreadySet)
        ));

        call.send().await.unwrap();
        call.handle_response(result(vec![json!("a")], true));
        call.handle_response(result(vec![], false));
        assert_eq!(*seen.lock().unwrap(), vec![vec![json!("a")]]);
    }

    #[tokio::test]
    async fn test_handler_only_progress_is_not_queued() {
        let (call, _peer, _table) = new_call(CallOptions::new());
        let count = Arc::new(Mutex::new(0usize));
        let counter = count.clone();
        call.on_progress(move |_| *counter.lock().unwrap() += 1).unwrap();

        call.send().await.unwrap();
        for n in 0..1000 {
            assert!(!call.handle_response(result(vec![json!(n)], true)));
        }
        assert!(call.handle_response(result(vec![], false)));
        call.result().await.unwrap();

        assert_eq!(*count.lock().unwrap(), 1000);
        let mut queued = call.0.progress_rx.try_lock().unwrap();
        assert!(queued.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_late_progress_is_reported() {
        let observer = RecordingObserver::new();
        let (call, _peer, _table) =
            new_call_observed(CallOptions::new().receive_progress(true), observer.clone());
        call.send().await.unwrap();

        call.handle_response(result(vec![], false));
        assert!(call.handle_response(result(vec![json!(9)], true)));

        assert_eq!(
            observer.diagnostics(),
            vec![Diagnostic::LateProgress {
                request_id: RequestId::new(1)
            }]
        );
        assert_eq!(call.next_progress().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancel_before_send_is_local() {
        let (call, mut peer, table) = new_call(CallOptions::new());

        call.cancel(None, None).await;

        assert!(call.is_cancelled());
        assert!(peer.try_recv().is_none());
        assert!(table.is_empty());
        assert!(matches!(call.send().await, Err(Error::Cancelled)));
        assert!(matches!(call.result().await, Err(Error::Cancelled)));
        assert!(peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_cancel_after_send_emits_cancel() {
        let (call, mut peer, table) = new_call(CallOptions::new().cancel_mode(CancelMode::Kill));
        call.send().await.unwrap();
        let _ = peer.try_recv();

        call.cancel(None, None).await;

        match peer.try_recv() {
            Some(Message::Cancel(cancel)) => {
                assert_eq!(cancel.options.get("mode"), Some(&json!("kill")));
            }
            other => panic!("Expected CANCEL, got {:?}", other),
        }
        assert!(matches!(call.result().await, Err(Error::Cancelled)));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_kill_before_send_surfaces_error() {
        let (call, mut peer, table) = new_call(CallOptions::new());

        call.kill(Error::ClientClosed);
        call.kill(Error::Cancelled);

        assert!(matches!(call.send().await, Err(Error::ClientClosed)));
        assert!(peer.try_recv().is_none());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_call_options_dict() {
        let options = CallOptions::new()
            .timeout(Duration::from_secs(2))
            .disclose_me(true)
            .resource_key("user-7")
            .option("custom", "x")
            .to_dict();

        assert_eq!(options.get("timeout"), Some(&json!(2000)));
        assert_eq!(options.get("disclose_me"), Some(&json!(true)));
        assert_eq!(options.get("rkey"), Some(&json!("user-7")));
        assert_eq!(options.get("runmode"), Some(&json!("partition")));
        assert_eq!(options.get("custom"), Some(&json!("x")));
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let options = CallOptions::new().timeout(Duration::MAX).to_dict();
        assert_eq!(options.get("timeout"), Some(&json!(u64::MAX)));
    }
}
