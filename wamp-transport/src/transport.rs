use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use wamp_core::{CodecError, Message};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Outbound half of a WAMP session.
///
/// Implementations are shared behind an `Arc` between the client and every
/// call, invocation and runner it spawns, so both methods take `&self`.
#[async_trait]
pub trait Session: Send + Sync {
    async fn send(&self, msg: Message) -> Result<(), TransportError>;
    async fn close(&self) -> Result<(), TransportError>;
}

/// A session together with the queue of messages arriving on it.
///
/// The queue ends when the peer goes away.
pub struct Connection {
    pub session: Arc<dyn Session>,
    pub incoming: mpsc::Receiver<Message>,
}

impl Connection {
    pub fn new(session: Arc<dyn Session>, incoming: mpsc::Receiver<Message>) -> Self {
        Connection { session, incoming }
    }

    pub fn into_parts(self) -> (Arc<dyn Session>, mpsc::Receiver<Message>) {
        (self.session, self.incoming)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}
