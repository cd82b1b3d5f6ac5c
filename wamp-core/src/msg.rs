//! WAMP messages.
//!
//! Every message travels as a JSON array whose first element is the numeric
//! message code, e.g. `[48, 7, {}, "com.example.add", [1, 2]]` for a CALL.
//! Trailing positional and keyword payloads are omitted when empty.

use crate::ids::{PublicationId, RegistrationId, RequestId, SubscriptionId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Keyword arguments, details and options.
pub type Dict = Map<String, Value>;
/// Positional arguments.
pub type Args = Vec<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Error,
    Publish,
    Published,
    Subscribe,
    Subscribed,
    Unsubscribe,
    Unsubscribed,
    Event,
    Call,
    Cancel,
    Result,
    Register,
    Registered,
    Unregister,
    Unregistered,
    Invocation,
    Interrupt,
    Yield,
}

impl MessageKind {
    pub fn code(&self) -> u64 {
        match self {
            MessageKind::Error => 8,
            MessageKind::Publish => 16,
            MessageKind::Published => 17,
            MessageKind::Subscribe => 32,
            MessageKind::Subscribed => 33,
            MessageKind::Unsubscribe => 34,
            MessageKind::Unsubscribed => 35,
            MessageKind::Event => 36,
            MessageKind::Call => 48,
            MessageKind::Cancel => 49,
            MessageKind::Result => 50,
            MessageKind::Register => 64,
            MessageKind::Registered => 65,
            MessageKind::Unregister => 66,
            MessageKind::Unregistered => 67,
            MessageKind::Invocation => 68,
            MessageKind::Interrupt => 69,
            MessageKind::Yield => 70,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        let kind = match code {
            8 => MessageKind::Error,
            16 => MessageKind::Publish,
            17 => MessageKind::Published,
            32 => MessageKind::Subscribe,
            33 => MessageKind::Subscribed,
            34 => MessageKind::Unsubscribe,
            35 => MessageKind::Unsubscribed,
            36 => MessageKind::Event,
            48 => MessageKind::Call,
            49 => MessageKind::Cancel,
            50 => MessageKind::Result,
            64 => MessageKind::Register,
            65 => MessageKind::Registered,
            66 => MessageKind::Unregister,
            67 => MessageKind::Unregistered,
            68 => MessageKind::Invocation,
            69 => MessageKind::Interrupt,
            70 => MessageKind::Yield,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::Error => "ERROR",
            MessageKind::Publish => "PUBLISH",
            MessageKind::Published => "PUBLISHED",
            MessageKind::Subscribe => "SUBSCRIBE",
            MessageKind::Subscribed => "SUBSCRIBED",
            MessageKind::Unsubscribe => "UNSUBSCRIBE",
            MessageKind::Unsubscribed => "UNSUBSCRIBED",
            MessageKind::Event => "EVENT",
            MessageKind::Call => "CALL",
            MessageKind::Cancel => "CANCEL",
            MessageKind::Result => "RESULT",
            MessageKind::Register => "REGISTER",
            MessageKind::Registered => "REGISTERED",
            MessageKind::Unregister => "UNREGISTER",
            MessageKind::Unregistered => "UNREGISTERED",
            MessageKind::Invocation => "INVOCATION",
            MessageKind::Interrupt => "INTERRUPT",
            MessageKind::Yield => "YIELD",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `[8, REQUEST.Type, REQUEST.Request, Details, Error, Args?, KwArgs?]`
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub request_kind: MessageKind,
    pub request_id: RequestId,
    pub details: Dict,
    pub error: String,
    pub args: Args,
    pub kwargs: Dict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Publish {
    pub request_id: RequestId,
    pub options: Dict,
    pub topic: String,
    pub args: Args,
    pub kwargs: Dict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub request_id: RequestId,
    pub publication_id: PublicationId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscribe {
    pub request_id: RequestId,
    pub options: Dict,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscribed {
    pub request_id: RequestId,
    pub subscription_id: SubscriptionId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unsubscribe {
    pub request_id: RequestId,
    pub subscription_id: SubscriptionId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unsubscribed {
    pub request_id: RequestId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub subscription_id: SubscriptionId,
    pub publication_id: PublicationId,
    pub details: Dict,
    pub args: Args,
    pub kwargs: Dict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub request_id: RequestId,
    pub options: Dict,
    pub procedure: String,
    pub args: Args,
    pub kwargs: Dict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cancel {
    pub request_id: RequestId,
    pub options: Dict,
}

/// `[50, CALL.Request, Details, Args?, KwArgs?]`
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMessage {
    pub request_id: RequestId,
    pub details: Dict,
    pub args: Args,
    pub kwargs: Dict,
}

impl ResultMessage {
    /// Whether the dealer marked this result as an intermediate progress result.
    pub fn is_progress(&self) -> bool {
        self.details
            .get("progress")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    pub request_id: RequestId,
    pub options: Dict,
    pub procedure: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registered {
    pub request_id: RequestId,
    pub registration_id: RegistrationId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unregister {
    pub request_id: RequestId,
    pub registration_id: RegistrationId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unregistered {
    pub request_id: RequestId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub request_id: RequestId,
    pub registration_id: RegistrationId,
    pub details: Dict,
    pub args: Args,
    pub kwargs: Dict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interrupt {
    pub request_id: RequestId,
    pub options: Dict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Yield {
    pub request_id: RequestId,
    pub options: Dict,
    pub args: Args,
    pub kwargs: Dict,
}

/// WAMP messages handled by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Error(ErrorMessage),
    Publish(Publish),
    Published(Published),
    Subscribe(Subscribe),
    Subscribed(Subscribed),
    Unsubscribe(Unsubscribe),
    Unsubscribed(Unsubscribed),
    Event(Event),
    Call(Call),
    Cancel(Cancel),
    Result(ResultMessage),
    Register(Register),
    Registered(Registered),
    Unregister(Unregister),
    Unregistered(Unregistered),
    Invocation(Invocation),
    Interrupt(Interrupt),
    Yield(Yield),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Error(_) => MessageKind::Error,
            Message::Publish(_) => MessageKind::Publish,
            Message::Published(_) => MessageKind::Published,
            Message::Subscribe(_) => MessageKind::Subscribe,
            Message::Subscribed(_) => MessageKind::Subscribed,
            Message::Unsubscribe(_) => MessageKind::Unsubscribe,
            Message::Unsubscribed(_) => MessageKind::Unsubscribed,
            Message::Event(_) => MessageKind::Event,
            Message::Call(_) => MessageKind::Call,
            Message::Cancel(_) => MessageKind::Cancel,
            Message::Result(_) => MessageKind::Result,
            Message::Register(_) => MessageKind::Register,
            Message::Registered(_) => MessageKind::Registered,
            Message::Unregister(_) => MessageKind::Unregister,
            Message::Unregistered(_) => MessageKind::Unregistered,
            Message::Invocation(_) => MessageKind::Invocation,
            Message::Interrupt(_) => MessageKind::Interrupt,
            Message::Yield(_) => MessageKind::Yield,
        }
    }

    /// Correlation id carried by the message. EVENT is the only message
    /// without one.
    pub fn request_id(&self) -> Option<RequestId> {
        let id = match self {
            Message::Error(m) => m.request_id,
            Message::Publish(m) => m.request_id,
            Message::Published(m) => m.request_id,
            Message::Subscribe(m) => m.request_id,
            Message::Subscribed(m) => m.request_id,
            Message::Unsubscribe(m) => m.request_id,
            Message::Unsubscribed(m) => m.request_id,
            Message::Event(_) => return None,
            Message::Call(m) => m.request_id,
            Message::Cancel(m) => m.request_id,
            Message::Result(m) => m.request_id,
            Message::Register(m) => m.request_id,
            Message::Registered(m) => m.request_id,
            Message::Unregister(m) => m.request_id,
            Message::Unregistered(m) => m.request_id,
            Message::Invocation(m) => m.request_id,
            Message::Interrupt(m) => m.request_id,
            Message::Yield(m) => m.request_id,
        };
        Some(id)
    }

    /// Parse a message from its JSON array form
    pub fn from_json(value: &Value) -> Result<Self, MessageError> {
        let arr = value.as_array().ok_or(MessageError::NotAnArray)?;
        let code = arr
            .first()
            .ok_or(MessageError::EmptyMessage)?
            .as_u64()
            .ok_or(MessageError::InvalidMessageType)?;
        let kind = MessageKind::from_code(code).ok_or(MessageError::UnknownMessageType(code))?;

        let mut fields = Fields::new(kind, &arr[1..]);

        let msg = match kind {
            MessageKind::Error => {
                let request_code = fields.u64("REQUEST.Type")?;
                let request_kind = MessageKind::from_code(request_code)
                    .ok_or(MessageError::UnknownMessageType(request_code))?;
                Message::Error(ErrorMessage {
                    request_kind,
                    request_id: fields.u64("Request")?.into(),
                    details: fields.dict("Details")?,
                    error: fields.uri("Error")?,
                    args: fields.args()?,
                    kwargs: fields.kwargs()?,
                })
            }
            MessageKind::Publish => Message::Publish(Publish {
                request_id: fields.u64("Request")?.into(),
                options: fields.dict("Options")?,
                topic: fields.uri("Topic")?,
                args: fields.args()?,
                kwargs: fields.kwargs()?,
            }),
            MessageKind::Published => Message::Published(Published {
                request_id: fields.u64("Request")?.into(),
                publication_id: fields.u64("Publication")?.into(),
            }),
            MessageKind::Subscribe => Message::Subscribe(Subscribe {
                request_id: fields.u64("Request")?.into(),
                options: fields.dict("Options")?,
                topic: fields.uri("Topic")?,
            }),
            MessageKind::Subscribed => Message::Subscribed(Subscribed {
                request_id: fields.u64("Request")?.into(),
                subscription_id: fields.u64("Subscription")?.into(),
            }),
            MessageKind::Unsubscribe => Message::Unsubscribe(Unsubscribe {
                request_id: fields.u64("Request")?.into(),
                subscription_id: fields.u64("Subscription")?.into(),
            }),
            MessageKind::Unsubscribed => Message::Unsubscribed(Unsubscribed {
                request_id: fields.u64("Request")?.into(),
            }),
            MessageKind::Event => Message::Event(Event {
                subscription_id: fields.u64("Subscription")?.into(),
                publication_id: fields.u64("Publication")?.into(),
                details: fields.dict("Details")?,
                args: fields.args()?,
                kwargs: fields.kwargs()?,
            }),
            MessageKind::Call => Message::Call(Call {
                request_id: fields.u64("Request")?.into(),
                options: fields.dict("Options")?,
                procedure: fields.uri("Procedure")?,
                args: fields.args()?,
                kwargs: fields.kwargs()?,
            }),
            MessageKind::Cancel => Message::Cancel(Cancel {
                request_id: fields.u64("Request")?.into(),
                options: fields.dict("Options")?,
            }),
            MessageKind::Result => Message::Result(ResultMessage {
                request_id: fields.u64("Request")?.into(),
                details: fields.dict("Details")?,
                args: fields.args()?,
                kwargs: fields.kwargs()?,
            }),
            MessageKind::Register => Message::Register(Register {
                request_id: fields.u64("Request")?.into(),
                options: fields.dict("Options")?,
                procedure: fields.uri("Procedure")?,
            }),
            MessageKind::Registered => Message::Registered(Registered {
                request_id: fields.u64("Request")?.into(),
                registration_id: fields.u64("Registration")?.into(),
            }),
            MessageKind::Unregister => Message::Unregister(Unregister {
                request_id: fields.u64("Request")?.into(),
                registration_id: fields.u64("Registration")?.into(),
            }),
            MessageKind::Unregistered => Message::Unregistered(Unregistered {
                request_id: fields.u64("Request")?.into(),
            }),
            MessageKind::Invocation => Message::Invocation(Invocation {
                request_id: fields.u64("Request")?.into(),
                registration_id: fields.u64("Registration")?.into(),
                details: fields.dict("Details")?,
                args: fields.args()?,
                kwargs: fields.kwargs()?,
            }),
            MessageKind::Interrupt => Message::Interrupt(Interrupt {
                request_id: fields.u64("Request")?.into(),
                options: fields.dict("Options")?,
            }),
            MessageKind::Yield => Message::Yield(Yield {
                request_id: fields.u64("Request")?.into(),
                options: fields.dict("Options")?,
                args: fields.args()?,
                kwargs: fields.kwargs()?,
            }),
        };

        Ok(msg)
    }

    /// Convert the message to its JSON array form
    pub fn to_json(&self) -> Value {
        let mut out = vec![Value::from(self.kind().code())];

        match self {
            Message::Error(m) => {
                out.push(m.request_kind.code().into());
                out.push(m.request_id.as_u64().into());
                out.push(Value::Object(m.details.clone()));
                out.push(Value::String(m.error.clone()));
                push_payload(&mut out, &m.args, &m.kwargs);
            }
            Message::Publish(m) => {
                out.push(m.request_id.as_u64().into());
                out.push(Value::Object(m.options.clone()));
                out.push(Value::String(m.topic.clone()));
                push_payload(&mut out, &m.args, &m.kwargs);
            }
            Message::Published(m) => {
                out.push(m.request_id.as_u64().into());
                out.push(m.publication_id.as_u64().into());
            }
            Message::Subscribe(m) => {
                out.push(m.request_id.as_u64().into());
                out.push(Value::Object(m.options.clone()));
                out.push(Value::String(m.topic.clone()));
            }
            Message::Subscribed(m) => {
                out.push(m.request_id.as_u64().into());
                out.push(m.subscription_id.as_u64().into());
            }
            Message::Unsubscribe(m) => {
                out.push(m.request_id.as_u64().into());
                out.push(m.subscription_id.as_u64().into());
            }
            Message::Unsubscribed(m) => {
                out.push(m.request_id.as_u64().into());
            }
            Message::Event(m) => {
                out.push(m.subscription_id.as_u64().into());
                out.push(m.publication_id.as_u64().into());
                out.push(Value::Object(m.details.clone()));
                push_payload(&mut out, &m.args, &m.kwargs);
            }
            Message::Call(m) => {
                out.push(m.request_id.as_u64().into());
                out.push(Value::Object(m.options.clone()));
                out.push(Value::String(m.procedure.clone()));
                push_payload(&mut out, &m.args, &m.kwargs);
            }
            Message::Cancel(m) => {
                out.push(m.request_id.as_u64().into());
                out.push(Value::Object(m.options.clone()));
            }
            Message::Result(m) => {
                out.push(m.request_id.as_u64().into());
                out.push(Value::Object(m.details.clone()));
                push_payload(&mut out, &m.args, &m.kwargs);
            }
            Message::Register(m) => {
                out.push(m.request_id.as_u64().into());
                out.push(Value::Object(m.options.clone()));
                out.push(Value::String(m.procedure.clone()));
            }
            Message::Registered(m) => {
                out.push(m.request_id.as_u64().into());
                out.push(m.registration_id.as_u64().into());
            }
            Message::Unregister(m) => {
                out.push(m.request_id.as_u64().into());
                out.push(m.registration_id.as_u64().into());
            }
            Message::Unregistered(m) => {
                out.push(m.request_id.as_u64().into());
            }
            Message::Invocation(m) => {
                out.push(m.request_id.as_u64().into());
                out.push(m.registration_id.as_u64().into());
                out.push(Value::Object(m.details.clone()));
                push_payload(&mut out, &m.args, &m.kwargs);
            }
            Message::Interrupt(m) => {
                out.push(m.request_id.as_u64().into());
                out.push(Value::Object(m.options.clone()));
            }
            Message::Yield(m) => {
                out.push(m.request_id.as_u64().into());
                out.push(Value::Object(m.options.clone()));
                push_payload(&mut out, &m.args, &m.kwargs);
            }
        }

        Value::Array(out)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.request_id() {
            Some(id) => write!(f, "{} {}", self.kind(), id.as_u64()),
            None => write!(f, "{}", self.kind()),
        }
    }
}

fn push_payload(out: &mut Vec<Value>, args: &Args, kwargs: &Dict) {
    if !kwargs.is_empty() {
        out.push(Value::Array(args.clone()));
        out.push(Value::Object(kwargs.clone()));
    } else if !args.is_empty() {
        out.push(Value::Array(args.clone()));
    }
}

/// Positional field reader for the elements following the message code.
struct Fields<'a> {
    kind: MessageKind,
    items: &'a [Value],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(kind: MessageKind, items: &'a [Value]) -> Self {
        Fields {
            kind,
            items,
            pos: 0,
        }
    }

    fn next(&mut self, field: &'static str) -> Result<&'a Value, MessageError> {
        let value = self.items.get(self.pos).ok_or(MessageError::MissingField {
            kind: self.kind,
            field,
        })?;
        self.pos += 1;
        Ok(value)
    }

    fn invalid(&self, field: &'static str) -> MessageError {
        MessageError::InvalidField {
            kind: self.kind,
            field,
        }
    }

    fn u64(&mut self, field: &'static str) -> Result<u64, MessageError> {
        let value = self.next(field)?;
        value.as_u64().ok_or_else(|| self.invalid(field))
    }

    fn dict(&mut self, field: &'static str) -> Result<Dict, MessageError> {
        let value = self.next(field)?;
        value.as_object().cloned().ok_or_else(|| self.invalid(field))
    }

    fn uri(&mut self, field: &'static str) -> Result<String, MessageError> {
        let value = self.next(field)?;
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| self.invalid(field))
    }

    fn args(&mut self) -> Result<Args, MessageError> {
        match self.items.get(self.pos) {
            None => Ok(Vec::new()),
            Some(_) => {
                let value = self.next("Arguments")?;
                value.as_array().cloned().ok_or_else(|| self.invalid("Arguments"))
            }
        }
    }

    fn kwargs(&mut self) -> Result<Dict, MessageError> {
        match self.items.get(self.pos) {
            None => Ok(Dict::new()),
            Some(_) => self.dict("ArgumentsKw"),
        }
    }
}

/// Custom serialization for Message
impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

/// Custom deserialization for Message
impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Message::from_json(&value).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MessageError {
    #[error("Message must be a JSON array")]
    NotAnArray,

    #[error("Message array cannot be empty")]
    EmptyMessage,

    #[error("Message type must be an unsigned integer")]
    InvalidMessageType,

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u64),

    #[error("{kind} message is missing the {field} field")]
    MissingField {
        kind: MessageKind,
        field: &'static str,
    },

    #[error("{kind} message has an invalid {field} field")]
    InvalidField {
        kind: MessageKind,
        field: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_message() {
        let json = json!([48, 7, {"receive_progress": true}, "com.example.add", [1, 2]]);
        let msg = Message::from_json(&json).unwrap();

        match &msg {
            Message::Call(call) => {
                assert_eq!(call.request_id, RequestId::new(7));
                assert_eq!(call.procedure, "com.example.add");
                assert_eq!(call.args, vec![json!(1), json!(2)]);
                assert!(call.kwargs.is_empty());
            }
            _ => panic!("Expected Call message"),
        }

        assert_eq!(msg.to_json(), json);
    }

    #[test]
    fn test_empty_args_are_omitted() {
        let msg = Message::Yield(Yield {
            request_id: RequestId::new(3),
            options: Dict::new(),
            args: Vec::new(),
            kwargs: Dict::new(),
        });

        assert_eq!(msg.to_json(), json!([70, 3, {}]));
    }

    #[test]
    fn test_kwargs_force_empty_args() {
        let mut kwargs = Dict::new();
        kwargs.insert("name".to_string(), json!("x"));
        let msg = Message::Yield(Yield {
            request_id: RequestId::new(3),
            options: Dict::new(),
            args: Vec::new(),
            kwargs,
        });

        assert_eq!(msg.to_json(), json!([70, 3, {}, [], {"name": "x"}]));
    }

    #[test]
    fn test_error_message() {
        let json = json!([8, 68, 12, {}, "wamp.error.invalid_argument", ["bad"]]);
        let msg = Message::from_json(&json).unwrap();

        match &msg {
            Message::Error(err) => {
                assert_eq!(err.request_kind, MessageKind::Invocation);
                assert_eq!(err.request_id, RequestId::new(12));
                assert_eq!(err.error, "wamp.error.invalid_argument");
                assert_eq!(err.args, vec![json!("bad")]);
            }
            _ => panic!("Expected Error message"),
        }

        assert_eq!(msg.to_json(), json);
    }

    #[test]
    fn test_progress_result() {
        let msg = Message::from_json(&json!([50, 1, {"progress": true}, [10]])).unwrap();
        match msg {
            Message::Result(result) => assert!(result.is_progress()),
            _ => panic!("Expected Result message"),
        }

        let msg = Message::from_json(&json!([50, 1, {}])).unwrap();
        match msg {
            Message::Result(result) => assert!(!result.is_progress()),
            _ => panic!("Expected Result message"),
        }
    }

    #[test]
    fn test_event_has_no_request_id() {
        let msg = Message::from_json(&json!([36, 5, 99, {}, ["hello"]])).unwrap();
        assert_eq!(msg.kind(), MessageKind::Event);
        assert_eq!(msg.request_id(), None);

        let msg = Message::from_json(&json!([69, 4, {"mode": "kill"}])).unwrap();
        assert_eq!(msg.request_id(), Some(RequestId::new(4)));
    }

    #[test]
    fn test_invalid_messages() {
        assert_eq!(
            Message::from_json(&json!({"type": 48})),
            Err(MessageError::NotAnArray)
        );
        assert_eq!(Message::from_json(&json!([])), Err(MessageError::EmptyMessage));
        assert_eq!(
            Message::from_json(&json!([1000, 1])),
            Err(MessageError::UnknownMessageType(1000))
        );
        assert_eq!(
            Message::from_json(&json!([65, 1])),
            Err(MessageError::MissingField {
                kind: MessageKind::Registered,
                field: "Registration",
            })
        );
        assert_eq!(
            Message::from_json(&json!([48, 1, [], "proc"])),
            Err(MessageError::InvalidField {
                kind: MessageKind::Call,
                field: "Options",
            })
        );
    }

    #[test]
    fn test_serde_goes_through_array_form() {
        let original = Message::Registered(Registered {
            request_id: RequestId::new(2),
            registration_id: RegistrationId::new(77),
        });
        let json = serde_json::to_value(&original).unwrap();
        assert_eq!(json, json!([65, 2, 77]));

        let decoded: Message = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(format!("{}", decoded), "REGISTERED 2");
    }
}
