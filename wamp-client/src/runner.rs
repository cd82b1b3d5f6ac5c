//! Procedure runners.
//!
//! A runner drives one handler execution against one [`Invocation`] and ends
//! it with exactly one final message. Starting a runner starts the handler.
//!
//! Interrupts are cooperative. The invocation's interrupt token fires so the
//! handler can wind down and still answer; if it has not answered after the
//! configured grace period the runner stops it and answers with
//! `wamp.error.canceled` itself. A `killnowait` interrupt skips the grace
//! period, and nothing is sent since the caller was already answered.

use crate::invocation::{interrupt_mode, Invocation};
use crate::observer::{report, Diagnostic, Observer};
use crate::procedure::{BlockingHandler, HandlerFuture, Procedure, YieldStream};
use crate::result::{HandlerResult, InvocationResult};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use wamp_core::msg::Interrupt;
use wamp_core::{CancelMode, Dict, InvocationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Running,
    Interrupted,
    Finished,
}

#[async_trait]
pub trait ProcedureRunner: Send + Sync {
    fn invocation(&self) -> &Invocation;

    fn state(&self) -> RunnerState;

    /// Deliver an INTERRUPT for this runner's invocation.
    async fn interrupt(&self, interrupt: Interrupt);

    /// Stop the runner without answering, used on session teardown.
    fn cancel(&self);
}

#[derive(Clone)]
pub(crate) struct RunnerContext {
    pub observer: Arc<dyn Observer>,
    pub interrupt_grace: Duration,
}

pub(crate) struct Started {
    pub runner: Arc<dyn ProcedureRunner>,
    pub task: JoinHandle<()>,
}

/// Build the handler execution for `invocation` and start driving it.
///
/// A factory failure is returned before any runner exists.
pub(crate) fn start(
    procedure: &Procedure,
    invocation: Invocation,
    ctx: RunnerContext,
) -> Result<Started, InvocationError> {
    match procedure {
        Procedure::Deferred(factory) => {
            let future = factory(invocation.clone())?;
            Ok(DeferredRunner::start(invocation, future, ctx))
        }
        Procedure::Blocking(handler) => Ok(BlockingRunner::start(invocation, handler.clone(), ctx)),
        Procedure::Streaming(factory) => {
            let stream = factory(invocation.clone())?;
            Ok(StreamingRunner::start(invocation, stream, ctx))
        }
    }
}

enum Step<T> {
    /// Session teardown, stop without answering.
    Cancelled,
    /// Interrupt grace period over (or `killnowait`).
    Forced,
    Ready(T),
}

struct RunnerCore {
    invocation: Invocation,
    observer: Arc<dyn Observer>,
    grace: Duration,
    state: Mutex<RunnerState>,
    forced: CancellationToken,
    cancelled: CancellationToken,
    finished: CancellationToken,
}

impl RunnerCore {
    fn new(invocation: Invocation, ctx: RunnerContext) -> Arc<Self> {
        let core = Arc::new(RunnerCore {
            invocation,
            observer: ctx.observer,
            grace: ctx.interrupt_grace,
            state: Mutex::new(RunnerState::Running),
            forced: CancellationToken::new(),
            cancelled: CancellationToken::new(),
            finished: CancellationToken::new(),
        });
        core.arm_timeout();
        core
    }

    fn lock_state(&self) -> MutexGuard<'_, RunnerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> RunnerState {
        *self.lock_state()
    }

    /// A callee-side timeout behaves like a `kill` interrupt from the caller.
    fn arm_timeout(self: &Arc<Self>) {
        let Some(timeout) = self.invocation.timeout() else {
            return;
        };
        let core = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    debug!(request_id = %core.invocation.request_id(), ?timeout, "invocation timed out");
                    let mut options = Dict::new();
                    options.insert("mode".into(), Value::from(CancelMode::Kill.as_str()));
                    core.interrupt(Interrupt {
                        request_id: core.invocation.request_id(),
                        options,
                    });
                }
                _ = core.finished.cancelled() => {}
            }
        });
    }

    /// The first interrupt starts the grace period. Later ones are ignored,
    /// except `killnowait` which still ends the invocation on the spot.
    fn interrupt(self: &Arc<Self>, interrupt: Interrupt) {
        let repeated = {
            let mut state = self.lock_state();
            match *state {
                RunnerState::Running => {
                    *state = RunnerState::Interrupted;
                    false
                }
                RunnerState::Interrupted
                    if interrupt_mode(&interrupt) == CancelMode::KillNoWait =>
                {
                    true
                }
                other => {
                    trace!(request_id = %self.invocation.request_id(), state = ?other, "ignoring interrupt");
                    return;
                }
            }
        };

        let mode = self.invocation.receive_interrupt(interrupt);
        debug!(request_id = %self.invocation.request_id(), %mode, repeated, "invocation interrupted");

        if mode == CancelMode::KillNoWait {
            self.forced.cancel();
            return;
        }

        let core = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(core.grace) => {
                    debug!(request_id = %core.invocation.request_id(), "interrupt grace period elapsed");
                    core.forced.cancel();
                }
                _ = core.finished.cancelled() => {}
            }
        });
    }

    fn cancel(&self) {
        self.cancelled.cancel();
    }

    /// Run `fut` until it completes or the runner is stopped.
    async fn race<F: Future>(&self, fut: F) -> Step<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled.cancelled() => Step::Cancelled,
            _ = self.forced.cancelled() => Step::Forced,
            output = fut => Step::Ready(output),
        }
    }

    async fn send_result(&self, result: InvocationResult) {
        if let Err(e) = self.invocation.send_result(result).await {
            debug!(request_id = %self.invocation.request_id(), error = %e, "result not sent");
        }
    }

    async fn send_progress(&self, progress: InvocationResult) {
        if let Err(e) = self.invocation.send_progress(progress).await {
            debug!(request_id = %self.invocation.request_id(), error = %e, "progress not sent");
        }
    }

    /// Send the handler's outcome. Failures of an invocation that is
    /// already done are dropped without a word.
    async fn complete(&self, outcome: Result<HandlerResult, InvocationError>) {
        match outcome {
            Ok(result) => self.send_result(result.into_result()).await,
            Err(error) if self.invocation.is_done() => {
                trace!(request_id = %self.invocation.request_id(), %error, "handler failed after done");
            }
            Err(error) => {
                if let Err(e) = self.invocation.send_error(error).await {
                    debug!(request_id = %self.invocation.request_id(), error = %e, "error not sent");
                }
            }
        }
    }

    /// The handler ignored the interrupt for too long.
    async fn force_complete(&self) {
        if self.invocation.is_done() {
            return;
        }
        self.complete(Err(InvocationError::canceled("procedure interrupted")))
            .await;
    }

    fn finish(&self) {
        *self.lock_state() = RunnerState::Finished;
        self.finished.cancel();
    }
}

macro_rules! delegate_to_core {
    ($($runner:ident),*) => {
        $(
            #[async_trait]
            impl ProcedureRunner for $runner {
                fn invocation(&self) -> &Invocation {
                    &self.core.invocation
                }

                fn state(&self) -> RunnerState {
                    self.core.state()
                }

                async fn interrupt(&self, interrupt: Interrupt) {
                    self.core.interrupt(interrupt);
                }

                fn cancel(&self) {
                    self.core.cancel();
                }
            }
        )*
    };
}

/// Runs a single asynchronous computation. Stopping it drops the future.
pub struct DeferredRunner {
    core: Arc<RunnerCore>,
}

impl DeferredRunner {
    fn start(invocation: Invocation, future: HandlerFuture, ctx: RunnerContext) -> Started {
        let core = RunnerCore::new(invocation, ctx);
        let task = tokio::spawn(Self::drive(core.clone(), future));
        Started {
            runner: Arc::new(DeferredRunner { core }),
            task,
        }
    }

    async fn drive(core: Arc<RunnerCore>, future: HandlerFuture) {
        match core.race(future).await {
            Step::Cancelled => trace!(request_id = %core.invocation.request_id(), "runner cancelled"),
            Step::Forced => core.force_complete().await,
            Step::Ready(outcome) => core.complete(outcome).await,
        }
        core.finish();
    }
}

/// Runs a synchronous handler on the blocking pool.
///
/// Started work cannot be stopped. Stopping the runner only suppresses the
/// result it eventually produces.
pub struct BlockingRunner {
    core: Arc<RunnerCore>,
}

impl BlockingRunner {
    fn start(invocation: Invocation, handler: BlockingHandler, ctx: RunnerContext) -> Started {
        let core = RunnerCore::new(invocation, ctx);
        let task = tokio::spawn(Self::drive(core.clone(), handler));
        Started {
            runner: Arc::new(BlockingRunner { core }),
            task,
        }
    }

    async fn drive(core: Arc<RunnerCore>, handler: BlockingHandler) {
        let invocation = core.invocation.clone();
        let work = tokio::task::spawn_blocking(move || handler(invocation));

        match core.race(work).await {
            Step::Cancelled => trace!(request_id = %core.invocation.request_id(), "runner cancelled"),
            Step::Forced => core.force_complete().await,
            Step::Ready(Ok(outcome)) => core.complete(outcome).await,
            Step::Ready(Err(join_error)) => {
                core.complete(Err(InvocationError::runtime(format!(
                    "procedure failed: {}",
                    join_error
                ))))
                .await
            }
        }
        core.finish();
    }
}

/// Drives a stream of yielded values through a [`YieldBuffer`].
pub struct StreamingRunner {
    core: Arc<RunnerCore>,
}

impl StreamingRunner {
    fn start(invocation: Invocation, stream: YieldStream, ctx: RunnerContext) -> Started {
        let core = RunnerCore::new(invocation, ctx);
        let task = tokio::spawn(Self::drive(core.clone(), stream));
        Started {
            runner: Arc::new(StreamingRunner { core }),
            task,
        }
    }

    async fn drive(core: Arc<RunnerCore>, mut stream: YieldStream) {
        let request_id = core.invocation.request_id();
        let mut buffer = YieldBuffer::new();

        loop {
            let item = match core.race(stream.next()).await {
                Step::Cancelled => {
                    trace!(request_id = %request_id, "runner cancelled");
                    break;
                }
                Step::Forced => {
                    core.force_complete().await;
                    break;
                }
                Step::Ready(item) => item,
            };

            if core.invocation.is_interrupted() {
                buffer.interrupt();
            }

            match item {
                Some(Ok(yielded)) => {
                    trace!(request_id = %request_id, "handling yield");
                    for flush in buffer.push(yielded) {
                        Self::flush(&core, flush).await;
                    }
                    if buffer.state() == BufferState::Finished {
                        break;
                    }
                }
                Some(Err(error)) => {
                    if let Some(flush) = buffer.fail() {
                        Self::flush(&core, flush).await;
                    }
                    core.complete(Err(error)).await;
                    break;
                }
                None => {
                    match buffer.finish() {
                        Completion::Final(result) => core.send_result(result).await,
                        Completion::Empty if !core.invocation.is_done() => {
                            report(&*core.observer, Diagnostic::EmptyFinalResult { request_id });
                            core.send_result(InvocationResult::new()).await;
                        }
                        Completion::Empty | Completion::AlreadyFinished => {}
                    }
                    break;
                }
            }
        }
        core.finish();
    }

    async fn flush(core: &RunnerCore, flush: Flush) {
        match flush {
            Flush::Progress(progress) => core.send_progress(progress).await,
            Flush::Final(result) => core.send_result(result).await,
        }
    }
}

delegate_to_core!(DeferredRunner, BlockingRunner, StreamingRunner);

/// Message the streaming runner has to send.
#[derive(Debug, Clone, PartialEq)]
pub enum Flush {
    Progress(InvocationResult),
    Final(InvocationResult),
}

/// How a stream that ran out of values ends.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The last pending value becomes the final result.
    Final(InvocationResult),
    /// Nothing was pending and no final result went out.
    Empty,
    /// A final result or error was already produced.
    AlreadyFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    AwaitingNextYield,
    HasPendingValue,
    Finished,
}

/// One buffering step: flush what was pending as progress, then deal with
/// the new value.
///
/// Untagged values become the new pending value. Tagged progress is flushed
/// right away, a tagged final result ends the stream.
pub fn step(
    pending: Option<InvocationResult>,
    yielded: HandlerResult,
) -> (Vec<Flush>, Option<InvocationResult>) {
    let mut flushes: Vec<Flush> = pending.into_iter().map(Flush::Progress).collect();
    match yielded {
        HandlerResult::Progress(progress) => {
            flushes.push(Flush::Progress(progress));
            (flushes, None)
        }
        HandlerResult::Final(result) => {
            flushes.push(Flush::Final(result));
            (flushes, None)
        }
        plain => (flushes, Some(plain.into_result())),
    }
}

/// Holds back the most recent yielded value until the next one shows up,
/// since only then is it known not to be the last.
#[derive(Debug, Default)]
pub struct YieldBuffer {
    pending: Option<InvocationResult>,
    interrupted: bool,
    finished: bool,
}

impl YieldBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BufferState {
        if self.finished {
            BufferState::Finished
        } else if self.pending.is_some() {
            BufferState::HasPendingValue
        } else {
            BufferState::AwaitingNextYield
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// After an interrupt the next yielded value is the handler's answer to
    /// it and becomes the final result. Anything still pending is dropped.
    pub fn interrupt(&mut self) {
        self.interrupted = true;
    }

    pub fn push(&mut self, yielded: HandlerResult) -> Vec<Flush> {
        if self.finished {
            return Vec::new();
        }

        if self.interrupted {
            self.pending = None;
            self.finished = true;
            return vec![Flush::Final(yielded.into_result())];
        }

        let (flushes, pending) = step(self.pending.take(), yielded);
        self.pending = pending;
        if matches!(flushes.last(), Some(Flush::Final(_))) {
            self.finished = true;
        }
        flushes
    }

    /// The handler failed. What was pending still goes out as progress,
    /// ahead of the error.
    pub fn fail(&mut self) -> Option<Flush> {
        self.finished = true;
        let pending = self.pending.take();
        if self.interrupted {
            return None;
        }
        pending.map(Flush::Progress)
    }

    pub fn finish(&mut self) -> Completion {
        if self.finished {
            return Completion::AlreadyFinished;
        }
        self.finished = true;
        match self.pending.take() {
            Some(result) => Completion::Final(result),
            None => Completion::Empty,
        }
    }
}
