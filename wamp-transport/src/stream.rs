//! Transport over any byte stream (TCP, Unix sockets, `tokio::io::duplex`).

use crate::codec::WampCodec;
use crate::transport::{Connection, Session, TransportError};
use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::Framed;
use tracing::{debug, warn};
use wamp_core::codec::FrameFormat;
use wamp_core::Message;

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub format: FrameFormat,
    pub max_frame_size: usize,
    /// Capacity of the inbound message queue
    pub inbound_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            format: FrameFormat::LengthPrefixed,
            max_frame_size: WampCodec::DEFAULT_MAX_FRAME_SIZE,
            inbound_buffer: 256,
        }
    }
}

pub struct StreamSession<T> {
    sink: Mutex<SplitSink<Framed<T, WampCodec>, Message>>,
}

#[async_trait]
impl<T> Session for StreamSession<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn send(&self, msg: Message) -> Result<(), TransportError> {
        self.sink.lock().await.send(msg).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.sink.lock().await.close().await
    }
}

/// Frame `io` and spawn the task that feeds decoded messages into the
/// connection's inbound queue.
///
/// The queue ends on EOF or on the first undecodable frame.
pub fn connect<T>(io: T, config: StreamConfig) -> Connection
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let codec = WampCodec::with_max_frame_size(config.max_frame_size).with_format(config.format);
    let (sink, mut stream) = Framed::new(io, codec).split();
    let (tx, rx) = mpsc::channel(config.inbound_buffer);

    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(msg) => {
                    if tx.send(msg).await.is_err() {
                        debug!("inbound queue dropped, stopping stream reader");
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to read frame, closing stream");
                    return;
                }
            }
        }
        debug!("stream reached EOF");
    });

    let session = StreamSession {
        sink: Mutex::new(sink),
    };
    Connection::new(Arc::new(session), rx)
}
