//! Registered procedure handlers.
//!
//! The execution shape of a handler is declared once, when it is wrapped in a
//! [`Procedure`], and picks the runner used for every invocation.

use crate::invocation::Invocation;
use crate::result::HandlerResult;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt, TryFutureExt};
use std::future::Future;
use std::sync::Arc;
use wamp_core::InvocationError;

pub type HandlerFuture = BoxFuture<'static, Result<HandlerResult, InvocationError>>;
pub type YieldStream = BoxStream<'static, Result<HandlerResult, InvocationError>>;

pub(crate) type DeferredFactory =
    Arc<dyn Fn(Invocation) -> Result<HandlerFuture, InvocationError> + Send + Sync>;
pub(crate) type BlockingHandler =
    Arc<dyn Fn(Invocation) -> Result<HandlerResult, InvocationError> + Send + Sync>;
pub(crate) type StreamingFactory =
    Arc<dyn Fn(Invocation) -> Result<YieldStream, InvocationError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
    Deferred,
    Blocking,
    Streaming,
}

#[derive(Clone)]
pub enum Procedure {
    /// One asynchronous computation producing the final result.
    Deferred(DeferredFactory),
    /// A synchronous function, run on the blocking thread pool.
    Blocking(BlockingHandler),
    /// A stream of yielded values, the last of which is the final result.
    Streaming(StreamingFactory),
}

impl Procedure {
    pub fn deferred<F, Fut, R, E>(handler: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Into<HandlerResult> + 'static,
        E: Into<InvocationError> + 'static,
    {
        Procedure::Deferred(Arc::new(
            move |invocation: Invocation| -> Result<HandlerFuture, InvocationError> {
                Ok(handler(invocation)
                    .map_ok(Into::into)
                    .map_err(Into::into)
                    .boxed())
            },
        ))
    }

    /// Like [`Procedure::deferred`], but the handler may reject the
    /// invocation before any work starts.
    pub fn try_deferred<F, Fut, R, E>(factory: F) -> Self
    where
        F: Fn(Invocation) -> Result<Fut, InvocationError> + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Into<HandlerResult> + 'static,
        E: Into<InvocationError> + 'static,
    {
        Procedure::Deferred(Arc::new(
            move |invocation: Invocation| -> Result<HandlerFuture, InvocationError> {
                let future = factory(invocation)?;
                Ok(future.map_ok(Into::into).map_err(Into::into).boxed())
            },
        ))
    }

    pub fn blocking<F, R, E>(handler: F) -> Self
    where
        F: Fn(Invocation) -> Result<R, E> + Send + Sync + 'static,
        R: Into<HandlerResult> + 'static,
        E: Into<InvocationError> + 'static,
    {
        Procedure::Blocking(Arc::new(
            move |invocation: Invocation| -> Result<HandlerResult, InvocationError> {
                handler(invocation).map(Into::into).map_err(Into::into)
            },
        ))
    }

    pub fn streaming<F, S, R, E>(handler: F) -> Self
    where
        F: Fn(Invocation) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<R, E>> + Send + 'static,
        R: Into<HandlerResult> + 'static,
        E: Into<InvocationError> + 'static,
    {
        Procedure::Streaming(Arc::new(
            move |invocation: Invocation| -> Result<YieldStream, InvocationError> {
                Ok(handler(invocation)
                    .map(|item| item.map(Into::into).map_err(Into::into))
                    .boxed())
            },
        ))
    }

    pub fn try_streaming<F, S, R, E>(factory: F) -> Self
    where
        F: Fn(Invocation) -> Result<S, InvocationError> + Send + Sync + 'static,
        S: Stream<Item = Result<R, E>> + Send + 'static,
        R: Into<HandlerResult> + 'static,
        E: Into<InvocationError> + 'static,
    {
        Procedure::Streaming(Arc::new(
            move |invocation: Invocation| -> Result<YieldStream, InvocationError> {
                let stream = factory(invocation)?;
                Ok(stream
                    .map(|item| item.map(Into::into).map_err(Into::into))
                    .boxed())
            },
        ))
    }

    pub fn kind(&self) -> ProcedureKind {
        match self {
            Procedure::Deferred(_) => ProcedureKind::Deferred,
            Procedure::Blocking(_) => ProcedureKind::Blocking,
            Procedure::Streaming(_) => ProcedureKind::Streaming,
        }
    }
}

impl std::fmt::Debug for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Procedure").field(&self.kind()).finish()
    }
}
