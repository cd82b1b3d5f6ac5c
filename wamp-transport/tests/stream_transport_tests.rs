use bytes::BytesMut;
use futures::SinkExt;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::codec::{Encoder, FramedWrite};
use wamp_core::msg::{Dict, Invocation, Yield};
use wamp_core::{Message, RegistrationId, RequestId};
use wamp_transport::{connect, StreamConfig, WampCodec};

fn invocation(id: u64) -> Message {
    Message::Invocation(Invocation {
        request_id: RequestId::new(id),
        registration_id: RegistrationId::new(9),
        details: Dict::new(),
        args: vec![json!(id)],
        kwargs: Dict::new(),
    })
}

#[tokio::test]
async fn test_stream_delivers_frames_in_order() {
    let (client_io, router_io) = tokio::io::duplex(4096);
    let mut connection = connect(client_io, StreamConfig::default());

    let mut router = FramedWrite::new(router_io, WampCodec::new());
    router.send(invocation(1)).await.unwrap();
    router.send(invocation(2)).await.unwrap();

    let first = timeout(Duration::from_secs(1), connection.incoming.recv())
        .await
        .unwrap();
    let second = timeout(Duration::from_secs(1), connection.incoming.recv())
        .await
        .unwrap();
    assert_eq!(first, Some(invocation(1)));
    assert_eq!(second, Some(invocation(2)));
}

#[tokio::test]
async fn test_stream_session_writes_length_prefixed_json() {
    let (client_io, mut router_io) = tokio::io::duplex(4096);
    let connection = connect(client_io, StreamConfig::default());

    let msg = Message::Yield(Yield {
        request_id: RequestId::new(4),
        options: Dict::new(),
        args: vec![json!("done")],
        kwargs: Dict::new(),
    });
    connection.session.send(msg.clone()).await.unwrap();

    let mut expected = BytesMut::new();
    WampCodec::new().encode(msg, &mut expected).unwrap();

    let mut received = vec![0u8; expected.len()];
    router_io.read_exact(&mut received).await.unwrap();
    assert_eq!(received, expected.to_vec());
}

#[tokio::test]
async fn test_incoming_ends_on_eof() {
    let (client_io, router_io) = tokio::io::duplex(64);
    let mut connection = connect(client_io, StreamConfig::default());

    drop(router_io);
    let end = timeout(Duration::from_secs(1), connection.incoming.recv())
        .await
        .unwrap();
    assert_eq!(end, None);
}

#[tokio::test]
async fn test_incoming_ends_on_garbage_frame() {
    let (client_io, mut router_io) = tokio::io::duplex(64);
    let mut connection = connect(client_io, StreamConfig::default());

    router_io.write_all(&[0, 0, 0, 3, b'{', b'}', b'x']).await.unwrap();
    let end = timeout(Duration::from_secs(1), connection.incoming.recv())
        .await
        .unwrap();
    assert_eq!(end, None);
}
