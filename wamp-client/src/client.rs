//! The client: request correlation and inbound message dispatch.
//!
//! Every inbound message goes through [`Client::handle_message`], one at a
//! time. Outbound requests allocate a request id and register their waiter
//! (or call) in a routing table before the request is sent, so a response can
//! never arrive for an id the client does not know yet.

use crate::call::{Call, CallOptions, CallParts, CallTable};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::event::SubscriptionEvent;
use crate::invocation::Invocation;
use crate::observer::{report, Diagnostic, NoopObserver, Observer};
use crate::options::{PublishOptions, RegisterOptions, SubscribeOptions};
use crate::procedure::Procedure;
use crate::runner::{self, ProcedureRunner, RunnerContext, Started};
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use wamp_core::msg::{
    self, ErrorMessage, Publish, Register, Subscribe, Unregister, Unsubscribe,
};
use wamp_core::{
    Args, Dict, InvocationError, Message, MessageKind, PublicationId, RegistrationId, RequestId,
    RequestIdAllocator, SubscriptionId,
};
use wamp_transport::stream::{self, StreamConfig};
use wamp_transport::{Connection, Session};

pub type EventHandler =
    Arc<dyn Fn(SubscriptionEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

type ReplySender = oneshot::Sender<Result<Message, Error>>;

#[derive(Clone)]
struct Registration {
    uri: String,
    procedure: Procedure,
}

/// Events of one subscription are queued and handled in arrival order by a
/// single drain task. Dropping the sender ends that task.
struct Subscription {
    topic: String,
    queue: mpsc::UnboundedSender<SubscriptionEvent>,
}

/// Sizes of the routing tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub awaiting_reply: usize,
    pub ongoing_calls: usize,
    pub running_procedures: usize,
    pub registrations: usize,
    pub subscriptions: usize,
}

struct ClientInner {
    session: Arc<dyn Session>,
    config: ClientConfig,
    observer: Arc<dyn Observer>,
    ids: RequestIdAllocator,

    awaiting_reply: DashMap<RequestId, ReplySender>,
    ongoing_calls: Arc<CallTable>,
    running_procedures: DashMap<RequestId, Arc<dyn ProcedureRunner>>,

    registrations: DashMap<RegistrationId, Registration>,
    procedure_ids: DashMap<String, Vec<RegistrationId>>,
    subscriptions: DashMap<SubscriptionId, Subscription>,
    topic_ids: DashMap<String, Vec<SubscriptionId>>,

    closed: AtomicBool,
    shutdown: CancellationToken,
}

/// WAMP client session. Cheap to clone, all clones share one session.
#[derive(Clone)]
pub struct Client(Arc<ClientInner>);

/// Removes a reply waiter from the table however the request ends.
struct PendingReply<'a> {
    table: &'a DashMap<RequestId, ReplySender>,
    request_id: RequestId,
}

impl<'a> PendingReply<'a> {
    fn register(
        table: &'a DashMap<RequestId, ReplySender>,
        request_id: RequestId,
    ) -> (Self, oneshot::Receiver<Result<Message, Error>>) {
        let (tx, rx) = oneshot::channel();
        table.insert(request_id, tx);
        (PendingReply { table, request_id }, rx)
    }
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        self.table.remove(&self.request_id);
    }
}

impl Client {
    /// Client driven by the caller, who feeds inbound messages into
    /// [`Client::handle_message`].
    pub fn new(session: Arc<dyn Session>, config: ClientConfig) -> Self {
        Self::new_with_observer(session, config, Arc::new(NoopObserver))
    }

    pub fn new_with_observer(
        session: Arc<dyn Session>,
        config: ClientConfig,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Client(Arc::new(ClientInner {
            session,
            config,
            observer,
            ids: RequestIdAllocator::new(),
            awaiting_reply: DashMap::new(),
            ongoing_calls: Arc::new(DashMap::new()),
            running_procedures: DashMap::new(),
            registrations: DashMap::new(),
            procedure_ids: DashMap::new(),
            subscriptions: DashMap::new(),
            topic_ids: DashMap::new(),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }))
    }

    /// Client that dispatches the connection's inbound messages on its own
    /// task, and cleans up when the connection ends.
    pub fn spawn(connection: Connection, config: ClientConfig) -> Self {
        Self::spawn_with_observer(connection, config, Arc::new(NoopObserver))
    }

    pub fn spawn_with_observer(
        connection: Connection,
        config: ClientConfig,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let (session, mut incoming) = connection.into_parts();
        let client = Self::new_with_observer(session, config, observer);

        let dispatcher = client.clone();
        tokio::spawn(async move {
            let shutdown = dispatcher.0.shutdown.clone();
            loop {
                let next = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = incoming.recv() => next,
                };
                match next {
                    Some(msg) => dispatcher.handle_message(msg).await,
                    None => {
                        info!("connection closed by peer");
                        break;
                    }
                }
            }
            dispatcher.cleanup();
        });

        client
    }

    /// Client over a framed byte stream such as a TCP or Unix socket, with
    /// the default frame settings.
    pub fn connect<T>(io: T, config: ClientConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let stream_config = StreamConfig {
            inbound_buffer: config.inbound_buffer,
            ..StreamConfig::default()
        };
        Self::spawn(stream::connect(io, stream_config), config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.0.config
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            awaiting_reply: self.0.awaiting_reply.len(),
            ongoing_calls: self.0.ongoing_calls.len(),
            running_procedures: self.0.running_procedures.len(),
            registrations: self.0.registrations.len(),
            subscriptions: self.0.subscriptions.len(),
        }
    }

    /// Registration ids held for `uri`.
    pub fn registration_ids(&self, uri: &str) -> Vec<RegistrationId> {
        self.0
            .procedure_ids
            .get(uri)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    /// Subscription ids held for `topic`.
    pub fn subscription_ids(&self, topic: &str) -> Vec<SubscriptionId> {
        self.0
            .topic_ids
            .get(topic)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }
        Ok(())
    }

    /// Route one inbound message.
    pub async fn handle_message(&self, msg: Message) {
        if self.is_closed() {
            trace!(message = %msg, "client closed, dropping message");
            return;
        }
        trace!(message = %msg, "handling message");

        let msg = match msg {
            Message::Invocation(invocation) => return self.handle_invocation(invocation).await,
            Message::Interrupt(interrupt) => return self.handle_interrupt(interrupt).await,
            Message::Event(event) => return self.handle_event(event),
            other => other,
        };

        let Some(request_id) = msg.request_id() else {
            return;
        };

        if let Some((_, waiter)) = self.0.awaiting_reply.remove(&request_id) {
            if waiter.send(Ok(msg)).is_err() {
                trace!(request_id = %request_id, "reply waiter went away");
            }
            return;
        }

        let call = self
            .0
            .ongoing_calls
            .get(&request_id)
            .map(|entry| entry.value().clone());
        if let Some(call) = call {
            if call.handle_response(msg) {
                self.0
                    .ongoing_calls
                    .remove_if(&request_id, |_, c| c.is_done());
            }
            return;
        }

        report(
            &*self.0.observer,
            Diagnostic::OrphanedResponse {
                request_id,
                kind: msg.kind(),
            },
        );
    }

    async fn handle_invocation(&self, msg: msg::Invocation) {
        let request_id = msg.request_id;
        let registration_id = msg.registration_id;

        let registration = self
            .0
            .registrations
            .get(&registration_id)
            .map(|entry| entry.value().clone());
        let Some(registration) = registration else {
            report(
                &*self.0.observer,
                Diagnostic::UnknownRegistration {
                    request_id,
                    registration_id,
                },
            );
            let error = InvocationError::invalid_argument(format!(
                "unknown registration {}",
                registration_id.as_u64()
            ));
            let reply = Message::Error(ErrorMessage {
                request_kind: MessageKind::Invocation,
                request_id,
                details: error.details,
                error: error.uri,
                args: error.args,
                kwargs: error.kwargs,
            });
            if let Err(e) = self.0.session.send(reply).await {
                debug!(request_id = %request_id, error = %e, "failed to reject invocation");
            }
            return;
        };

        debug!(request_id = %request_id, procedure = %registration.uri, "invocation");
        let invocation = Invocation::new(
            msg,
            registration.uri,
            self.0.session.clone(),
            self.0.observer.clone(),
        );
        let ctx = RunnerContext {
            observer: self.0.observer.clone(),
            interrupt_grace: self.0.config.interrupt_grace,
        };

        match runner::start(&registration.procedure, invocation.clone(), ctx) {
            Err(error) => {
                report(
                    &*self.0.observer,
                    Diagnostic::ProcedureStartFailed {
                        request_id,
                        registration_id,
                        error: error.to_string(),
                    },
                );
                if let Err(e) = invocation.send_error(error).await {
                    debug!(request_id = %request_id, error = %e, "failed to send start failure");
                }
            }
            Ok(Started { runner, task }) => {
                self.0.running_procedures.insert(request_id, runner.clone());

                let client = self.clone();
                tokio::spawn(async move {
                    if let Err(join_error) = task.await {
                        report(
                            &*client.0.observer,
                            Diagnostic::RunnerFailed {
                                request_id,
                                reason: join_error.to_string(),
                            },
                        );
                        let invocation = runner.invocation();
                        if !invocation.is_done() {
                            let error = InvocationError::runtime("procedure failed");
                            if let Err(e) = invocation.send_error(error).await {
                                debug!(request_id = %request_id, error = %e, "failed to report runner failure");
                            }
                        }
                    }
                    client.0.running_procedures.remove_if(&request_id, |_, r| {
                        std::ptr::addr_eq(Arc::as_ptr(r), Arc::as_ptr(&runner))
                    });
                    trace!(request_id = %request_id, "invocation finished");
                });
            }
        }
    }

    async fn handle_interrupt(&self, interrupt: msg::Interrupt) {
        let request_id = interrupt.request_id;
        let runner = self
            .0
            .running_procedures
            .get(&request_id)
            .map(|entry| entry.value().clone());

        match runner {
            Some(runner) => runner.interrupt(interrupt).await,
            None => report(&*self.0.observer, Diagnostic::UnknownInterrupt { request_id }),
        }
    }

    fn handle_event(&self, event: msg::Event) {
        let subscription_id = event.subscription_id;
        let subscription = self
            .0
            .subscriptions
            .get(&subscription_id)
            .map(|entry| (entry.topic.clone(), entry.queue.clone()));

        let Some((topic, queue)) = subscription else {
            report(
                &*self.0.observer,
                Diagnostic::UnknownSubscription { subscription_id },
            );
            return;
        };

        trace!(%subscription_id, %topic, "event");
        let event = SubscriptionEvent::new(event, topic, self.clone());
        if queue.send(event).is_err() {
            trace!(%subscription_id, "event queue closed");
        }
    }

    /// Send `msg` and wait for the message answering `request_id`.
    async fn request(&self, request_id: RequestId, msg: Message) -> Result<Message, Error> {
        self.ensure_open()?;
        let (_pending, reply) = PendingReply::register(&self.0.awaiting_reply, request_id);
        // Cleanup may have drained the table between the check and the insert.
        self.ensure_open()?;

        self.0.session.send(msg).await?;
        reply.await.unwrap_or(Err(Error::ClientClosed))
    }

    /// Start a call. The CALL message is sent on the first `send()`,
    /// `result()`, `next_progress()` or `.await` of the returned handle.
    pub fn call(
        &self,
        procedure: impl Into<String>,
        args: Args,
        kwargs: Dict,
        options: CallOptions,
    ) -> Call {
        let request_id = self.0.ids.allocate();
        let call = Call::new(
            CallParts {
                request_id,
                procedure: procedure.into(),
                args,
                kwargs,
                options,
                default_cancel_mode: self.0.config.default_cancel_mode,
                cancel_wait: self.0.config.cancel_wait,
            },
            self.0.session.clone(),
            self.0.observer.clone(),
            Arc::downgrade(&self.0.ongoing_calls),
        );

        self.0.ongoing_calls.insert(request_id, call.clone());
        if self.is_closed() {
            call.kill(Error::ClientClosed);
        }
        call
    }

    pub async fn register(
        &self,
        uri: impl Into<String>,
        procedure: Procedure,
        options: RegisterOptions,
    ) -> Result<RegistrationId, Error> {
        let uri = uri.into();
        let request_id = self.0.ids.allocate();
        let request = Message::Register(Register {
            request_id,
            options: options.to_dict(),
            procedure: uri.clone(),
        });

        let registration_id = match self.request(request_id, request).await? {
            Message::Registered(registered) => registered.registration_id,
            other => return Err(unexpected_reply("REGISTERED", other)),
        };

        debug!(%registration_id, procedure = %uri, kind = ?procedure.kind(), "registered");
        self.0
            .procedure_ids
            .entry(uri.clone())
            .or_default()
            .push(registration_id);
        self.0
            .registrations
            .insert(registration_id, Registration { uri, procedure });
        Ok(registration_id)
    }

    /// Unregister every registration of `uri`.
    pub async fn unregister(&self, uri: &str) -> Result<(), Error> {
        let ids = self.registration_ids(uri);
        if ids.is_empty() {
            return Err(Error::UnknownProcedure(uri.to_string()));
        }
        join_all(ids.into_iter().map(|id| self.unregister_id(id)))
            .await
            .into_iter()
            .collect()
    }

    pub async fn unregister_id(&self, registration_id: RegistrationId) -> Result<(), Error> {
        let uri = self
            .0
            .registrations
            .get(&registration_id)
            .map(|entry| entry.uri.clone())
            .ok_or(Error::UnknownRegistration(registration_id))?;

        let request_id = self.0.ids.allocate();
        let request = Message::Unregister(Unregister {
            request_id,
            registration_id,
        });
        match self.request(request_id, request).await? {
            Message::Unregistered(_) => {}
            other => return Err(unexpected_reply("UNREGISTERED", other)),
        }

        debug!(%registration_id, procedure = %uri, "unregistered");
        self.0.registrations.remove(&registration_id);
        forget(&self.0.procedure_ids, &uri, &registration_id);
        Ok(())
    }

    pub async fn subscribe<F, Fut>(
        &self,
        topic: impl Into<String>,
        handler: F,
        options: SubscribeOptions,
    ) -> Result<SubscriptionId, Error>
    where
        F: Fn(SubscriptionEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |event| handler(event).boxed());
        self.subscribe_handler(topic.into(), handler, options).await
    }

    async fn subscribe_handler(
        &self,
        topic: String,
        handler: EventHandler,
        options: SubscribeOptions,
    ) -> Result<SubscriptionId, Error> {
        let request_id = self.0.ids.allocate();
        let request = Message::Subscribe(Subscribe {
            request_id,
            options: options.to_dict(),
            topic: topic.clone(),
        });

        let subscription_id = match self.request(request_id, request).await? {
            Message::Subscribed(subscribed) => subscribed.subscription_id,
            other => return Err(unexpected_reply("SUBSCRIBED", other)),
        };

        debug!(%subscription_id, %topic, "subscribed");
        self.0
            .topic_ids
            .entry(topic.clone())
            .or_default()
            .push(subscription_id);
        let queue = drain_events(subscription_id, handler, self.0.observer.clone());
        self.0
            .subscriptions
            .insert(subscription_id, Subscription { topic, queue });
        Ok(subscription_id)
    }

    /// Unsubscribe every subscription of `topic`.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), Error> {
        let ids = self.subscription_ids(topic);
        if ids.is_empty() {
            return Err(Error::UnknownTopic(topic.to_string()));
        }
        join_all(ids.into_iter().map(|id| self.unsubscribe_id(id)))
            .await
            .into_iter()
            .collect()
    }

    pub async fn unsubscribe_id(&self, subscription_id: SubscriptionId) -> Result<(), Error> {
        let topic = self
            .0
            .subscriptions
            .get(&subscription_id)
            .map(|entry| entry.topic.clone())
            .ok_or(Error::UnknownSubscription(subscription_id))?;

        let request_id = self.0.ids.allocate();
        let request = Message::Unsubscribe(Unsubscribe {
            request_id,
            subscription_id,
        });
        match self.request(request_id, request).await? {
            Message::Unsubscribed(_) => {}
            other => return Err(unexpected_reply("UNSUBSCRIBED", other)),
        }

        debug!(%subscription_id, %topic, "unsubscribed");
        self.0.subscriptions.remove(&subscription_id);
        forget(&self.0.topic_ids, &topic, &subscription_id);
        Ok(())
    }

    /// Publish an event. Returns the publication id when the publication was
    /// acknowledged.
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        args: Args,
        kwargs: Dict,
        options: PublishOptions,
    ) -> Result<Option<PublicationId>, Error> {
        let request_id = self.0.ids.allocate();
        let request = Message::Publish(Publish {
            request_id,
            options: options.to_dict(),
            topic: topic.into(),
            args,
            kwargs,
        });

        if !options.acknowledge {
            self.ensure_open()?;
            self.0.session.send(request).await?;
            return Ok(None);
        }

        match self.request(request_id, request).await? {
            Message::Published(published) => Ok(Some(published.publication_id)),
            other => Err(unexpected_reply("PUBLISHED", other)),
        }
    }

    /// Tear down all session state.
    ///
    /// Stops dispatching, forgets registrations and subscriptions, cancels
    /// running procedures and fails every outstanding call and request with
    /// [`Error::ClientClosed`]. Runs once; later calls do nothing.
    pub fn cleanup(&self) {
        if self.0.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("cleaning up client");
        self.0.shutdown.cancel();

        self.0.registrations.clear();
        self.0.procedure_ids.clear();
        self.0.subscriptions.clear();
        self.0.topic_ids.clear();

        for runner in drain(&self.0.running_procedures) {
            runner.cancel();
        }
        for call in drain(&self.0.ongoing_calls) {
            call.kill(Error::ClientClosed);
        }
        for waiter in drain(&self.0.awaiting_reply) {
            let _ = waiter.send(Err(Error::ClientClosed));
        }
    }

    /// Close the session, then clean up regardless of how closing went.
    pub async fn close(&self) -> Result<(), Error> {
        info!("closing client");
        let closed = self.0.session.close().await;
        self.cleanup();
        closed.map_err(Error::from)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}

fn unexpected_reply(expected: &'static str, msg: Message) -> Error {
    match msg {
        Message::Error(error) => error.into(),
        other => Error::unexpected(expected, other.kind()),
    }
}

/// Remove `id` from the reverse index entry of `name`, dropping the entry
/// once it is empty.
fn forget<I: PartialEq>(index: &DashMap<String, Vec<I>>, name: &str, id: &I) {
    if let Some(mut ids) = index.get_mut(name) {
        ids.retain(|existing| existing != id);
    }
    index.remove_if(name, |_, ids| ids.is_empty());
}

/// Spawn the task that hands the events of one subscription to `handler`,
/// one at a time. The task ends once the returned sender is dropped and the
/// queue is empty.
fn drain_events(
    subscription_id: SubscriptionId,
    handler: EventHandler,
    observer: Arc<dyn Observer>,
) -> mpsc::UnboundedSender<SubscriptionEvent> {
    let (queue, mut events) = mpsc::unbounded_channel::<SubscriptionEvent>();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Err(e) = handler(event).await {
                report(
                    &*observer,
                    Diagnostic::SubscriberFailed {
                        subscription_id,
                        error: format!("{:#}", e),
                    },
                );
            }
        }
        trace!(%subscription_id, "event queue drained");
    });
    queue
}

fn drain<K: Eq + Hash + Copy, V>(map: &DashMap<K, V>) -> Vec<V> {
    let keys: Vec<K> = map.iter().map(|entry| *entry.key()).collect();
    keys.into_iter()
        .filter_map(|key| map.remove(&key).map(|(_, value)| value))
        .collect()
}
