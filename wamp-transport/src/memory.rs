//! In-process transport.
//!
//! [`pair`] wires a client-side [`Connection`] to a [`MemoryPeer`] that plays
//! the router: it sees everything the client sends and can inject anything
//! the client should receive.

use crate::transport::{Connection, Session, TransportError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;
use wamp_core::Message;

#[derive(Debug)]
pub struct MemorySession {
    outbound: mpsc::Sender<Message>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Session for MemorySession {
    async fn send(&self, msg: Message) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed);
        }
        trace!(message = %msg, "memory transport send");
        self.outbound
            .send(msg)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Router side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    outbound: mpsc::Receiver<Message>,
    inbound: Option<mpsc::Sender<Message>>,
    closed: Arc<AtomicBool>,
}

impl MemoryPeer {
    /// Next message the client sent, `None` once the client side is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        self.outbound.recv().await
    }

    /// Message the client already sent, without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.outbound.try_recv().ok()
    }

    /// Deliver a message to the client.
    pub async fn send(&self, msg: Message) -> Result<(), TransportError> {
        let inbound = self.inbound.as_ref().ok_or(TransportError::ConnectionClosed)?;
        inbound
            .send(msg)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Sender that injects messages into the client's inbound queue.
    pub fn sender(&self) -> Option<mpsc::Sender<Message>> {
        self.inbound.clone()
    }

    /// Whether the client closed its session.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// End the client's inbound queue, as a dropped connection would.
    pub fn disconnect(&mut self) {
        self.inbound = None;
    }
}

pub fn pair(buffer: usize) -> (Connection, MemoryPeer) {
    let (out_tx, out_rx) = mpsc::channel(buffer);
    let (in_tx, in_rx) = mpsc::channel(buffer);
    let closed = Arc::new(AtomicBool::new(false));

    let session = MemorySession {
        outbound: out_tx,
        closed: closed.clone(),
    };
    let peer = MemoryPeer {
        outbound: out_rx,
        inbound: Some(in_tx),
        closed,
    };

    (Connection::new(Arc::new(session), in_rx), peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wamp_core::msg::Unregistered;
    use wamp_core::RequestId;

    fn unregistered(id: u64) -> Message {
        Message::Unregistered(Unregistered {
            request_id: RequestId::new(id),
        })
    }

    #[tokio::test]
    async fn test_messages_flow_both_ways() {
        let (mut connection, mut peer) = pair(8);

        connection.session.send(unregistered(1)).await.unwrap();
        assert_eq!(peer.recv().await, Some(unregistered(1)));

        peer.send(unregistered(2)).await.unwrap();
        assert_eq!(connection.incoming.recv().await, Some(unregistered(2)));
    }

    #[tokio::test]
    async fn test_close_rejects_further_sends() {
        let (connection, peer) = pair(8);

        connection.session.close().await.unwrap();
        assert!(peer.is_closed());

        let err = connection.session.send(unregistered(1)).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_disconnect_ends_incoming() {
        let (mut connection, mut peer) = pair(8);

        peer.disconnect();
        assert_eq!(connection.incoming.recv().await, None);
        assert!(peer.send(unregistered(1)).await.is_err());
    }
}
