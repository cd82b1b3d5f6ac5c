use std::sync::Arc;
use thiserror::Error;
use wamp_core::msg::ErrorMessage;
use wamp_core::{InvocationError, MessageKind, RegistrationId, SubscriptionId};
use wamp_transport::TransportError;

/// Errors surfaced by the client.
///
/// `Clone` so one settlement can be handed to every waiter observing it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The peer answered with an ERROR message.
    #[error("{0}")]
    Remote(InvocationError),

    #[error("Expected {expected}, received {got}")]
    UnexpectedMessage {
        expected: &'static str,
        got: MessageKind,
    },

    #[error("Client closed")]
    ClientClosed,

    #[error("Call cancelled")]
    Cancelled,

    #[error("Progress is not available: the call was sent without receive_progress")]
    ProgressUnavailable,

    #[error("Progress was explicitly disabled for this call")]
    ProgressDisabled,

    #[error("A progress handler is already set")]
    ProgressHandlerAlreadySet,

    #[error("Call was already sent")]
    AlreadySent,

    #[error("Invocation already done")]
    AlreadyDone,

    #[error("Invocation was interrupted")]
    Interrupted,

    #[error("No registration for procedure {0}")]
    UnknownProcedure(String),

    #[error("Unknown registration: {0}")]
    UnknownRegistration(RegistrationId),

    #[error("No subscription for topic {0}")]
    UnknownTopic(String),

    #[error("Unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),

    #[error("Transport error: {0}")]
    Transport(Arc<TransportError>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn unexpected(expected: &'static str, got: MessageKind) -> Self {
        Error::UnexpectedMessage { expected, got }
    }

    /// Error URI when this is a remote error.
    pub fn uri(&self) -> Option<&str> {
        match self {
            Error::Remote(err) => Some(&err.uri),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(Arc::new(err))
    }
}

impl From<ErrorMessage> for Error {
    fn from(msg: ErrorMessage) -> Self {
        Error::Remote(InvocationError {
            uri: msg.error,
            args: msg.args,
            kwargs: msg.kwargs,
            details: msg.details,
        })
    }
}

impl From<InvocationError> for Error {
    fn from(err: InvocationError) -> Self {
        Error::Remote(err)
    }
}

/// Lets procedure handlers forward client errors with `?`.
impl From<Error> for InvocationError {
    fn from(err: Error) -> Self {
        match err {
            Error::Remote(inner) => inner,
            Error::Cancelled | Error::Interrupted => InvocationError::canceled(err.to_string()),
            other => InvocationError::runtime(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wamp_core::{uri, Dict, RequestId};

    #[test]
    fn test_error_message_becomes_remote_error() {
        let msg = ErrorMessage {
            request_kind: MessageKind::Call,
            request_id: RequestId::new(3),
            details: Dict::new(),
            error: "com.example.no_such_user".to_string(),
            args: vec![json!("alice")],
            kwargs: Dict::new(),
        };

        let err = Error::from(msg);
        assert_eq!(err.uri(), Some("com.example.no_such_user"));
        assert_eq!(format!("{}", err), "com.example.no_such_user: alice");
    }

    #[test]
    fn test_into_invocation_error() {
        let canceled = InvocationError::from(Error::Cancelled);
        assert_eq!(canceled.uri, uri::CANCELED);

        let closed = InvocationError::from(Error::ClientClosed);
        assert_eq!(closed.uri, uri::RUNTIME_ERROR);
        assert_eq!(closed.message(), Some("Client closed"));

        let remote = InvocationError::invalid_argument("nope");
        assert_eq!(InvocationError::from(Error::Remote(remote.clone())), remote);
    }

    #[test]
    fn test_transport_error_is_shared() {
        let err = Error::from(TransportError::ConnectionClosed);
        let copy = err.clone();
        assert!(matches!(copy, Error::Transport(_)));
        assert_eq!(format!("{}", copy), "Transport error: Connection closed");
    }
}
