use crate::client::Client;
use crate::error::Error;
use serde::de::DeserializeOwned;
use serde_json::Value;
use wamp_core::msg::Event;
use wamp_core::{Args, Dict, InvocationError, PublicationId, SubscriptionId};

/// One EVENT delivered to a subscription handler.
#[derive(Debug, Clone)]
pub struct SubscriptionEvent {
    client: Client,
    subscription_id: SubscriptionId,
    publication_id: PublicationId,
    subscribed_topic: String,
    args: Args,
    kwargs: Dict,
    details: Dict,
}

impl SubscriptionEvent {
    pub(crate) fn new(event: Event, subscribed_topic: String, client: Client) -> Self {
        SubscriptionEvent {
            client,
            subscription_id: event.subscription_id,
            publication_id: event.publication_id,
            subscribed_topic,
            args: event.args,
            kwargs: event.kwargs,
            details: event.details,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    pub fn publication_id(&self) -> PublicationId {
        self.publication_id
    }

    pub fn subscribed_topic(&self) -> &str {
        &self.subscribed_topic
    }

    /// Concrete topic of the publication. Same as the subscribed topic unless
    /// the subscription used a pattern-based match policy.
    pub fn topic(&self) -> &str {
        self.details
            .get("topic")
            .and_then(Value::as_str)
            .unwrap_or(&self.subscribed_topic)
    }

    pub fn publisher_id(&self) -> Option<u64> {
        self.details.get("publisher").and_then(Value::as_u64)
    }

    pub fn trust_level(&self) -> Option<u64> {
        self.details.get("trustlevel").and_then(Value::as_u64)
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Dict {
        &self.kwargs
    }

    pub fn details(&self) -> &Dict {
        &self.details
    }

    pub fn arg_as<T: DeserializeOwned>(&self, index: usize) -> Result<T, InvocationError> {
        let value = self.args.get(index).ok_or_else(|| {
            InvocationError::invalid_argument(format!("missing positional argument {}", index))
        })?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Unsubscribe the subscription this event was delivered to.
    pub async fn unsubscribe(&self) -> Result<(), Error> {
        self.client.unsubscribe_id(self.subscription_id).await
    }
}
