// Loopback example: one client registers a streaming procedure and calls it
// through a minimal in-process dealer that routes CALL to INVOCATION and
// YIELD back to RESULT.

use anyhow::Result;
use futures::{stream, StreamExt};
use serde_json::json;
use std::time::Duration;
use tracing::info;
use wamp_client::logging::{init_logging, LogSettings};
use wamp_client::{
    CallOptions, Client, ClientConfig, Dict, Invocation, InvocationError, Procedure,
    RegisterOptions,
};
use wamp_core::msg::{Registered, ResultMessage};
use wamp_core::{Message, RegistrationId, RequestId};
use wamp_transport::memory::{pair, MemoryPeer};

/// Routes every call to the one registered procedure.
async fn dealer(mut peer: MemoryPeer) {
    let mut registration = None;
    let mut next_invocation = 1u64;
    let mut pending = std::collections::HashMap::new();

    while let Some(msg) = peer.recv().await {
        let reply = match msg {
            Message::Register(register) => {
                let id = RegistrationId::new(1);
                registration = Some(id);
                Message::Registered(Registered {
                    request_id: register.request_id,
                    registration_id: id,
                })
            }
            Message::Call(call) => {
                let Some(registration_id) = registration else {
                    continue;
                };
                let invocation_id = RequestId::new(next_invocation);
                next_invocation += 1;
                pending.insert(invocation_id, call.request_id);

                let mut details = Dict::new();
                if call.options.get("receive_progress") == Some(&json!(true)) {
                    details.insert("receive_progress".into(), json!(true));
                }
                Message::Invocation(wamp_core::msg::Invocation {
                    request_id: invocation_id,
                    registration_id,
                    details,
                    args: call.args,
                    kwargs: call.kwargs,
                })
            }
            Message::Yield(reply) => {
                let progress = reply.options.get("progress") == Some(&json!(true));
                let caller = if progress {
                    pending.get(&reply.request_id).copied()
                } else {
                    pending.remove(&reply.request_id)
                };
                let Some(request_id) = caller else {
                    continue;
                };
                Message::Result(ResultMessage {
                    request_id,
                    details: reply.options,
                    args: reply.args,
                    kwargs: reply.kwargs,
                })
            }
            other => {
                info!(message = %other, "dealer ignoring message");
                continue;
            }
        };

        if peer.send(reply).await.is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(&LogSettings::new().filter("info"))?;

    let (connection, peer) = pair(64);
    tokio::spawn(dealer(peer));
    let client = Client::spawn(connection, ClientConfig::default());

    let countdown = Procedure::streaming(|invocation: Invocation| {
        let from = invocation.arg_as::<u64>(0).unwrap_or(3);
        stream::iter((0..=from).rev()).then(|n| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, InvocationError>(n)
        })
    });
    client
        .register("com.example.countdown", countdown, RegisterOptions::new())
        .await?;
    info!("registered com.example.countdown");

    let call = client.call(
        "com.example.countdown",
        vec![json!(5)],
        Dict::new(),
        CallOptions::new().receive_progress(true),
    );
    let mut progress = std::pin::pin!(call.progress());
    while let Some(update) = progress.next().await {
        info!(value = ?update?.value(), "progress");
    }
    let result = call.result().await?;
    info!(value = ?result.value(), "final result");

    client.close().await?;
    Ok(())
}
