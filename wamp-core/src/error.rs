use crate::msg::{Args, Dict};
use crate::uri;
use serde_json::Value;
use std::fmt;

/// Error payload of a WAMP ERROR message.
///
/// Used in both directions: a caller receives one when the callee (or the
/// router) rejects a call, and a procedure handler returns one to reject an
/// invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationError {
    pub uri: String,
    pub args: Args,
    pub kwargs: Dict,
    pub details: Dict,
}

impl InvocationError {
    pub fn new(uri: impl Into<String>) -> Self {
        InvocationError {
            uri: uri.into(),
            args: Vec::new(),
            kwargs: Dict::new(),
            details: Dict::new(),
        }
    }

    /// Error with a single human readable message as its first argument.
    pub fn with_message(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(uri).arg(Value::String(message.into()))
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::with_message(uri::INVALID_ARGUMENT, message)
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::with_message(uri::CANCELED, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::with_message(uri::RUNTIME_ERROR, message)
    }

    /// First positional argument when it is a string.
    pub fn message(&self) -> Option<&str> {
        self.args.first().and_then(Value::as_str)
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{}: {}", self.uri, message),
            None if self.args.is_empty() => write!(f, "{}", self.uri),
            None => write!(f, "{} {:?}", self.uri, self.args),
        }
    }
}

impl std::error::Error for InvocationError {}

impl From<serde_json::Error> for InvocationError {
    fn from(err: serde_json::Error) -> Self {
        InvocationError::invalid_argument(format!("JSON error: {}", err))
    }
}

impl From<anyhow::Error> for InvocationError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<InvocationError>() {
            Ok(invocation_error) => invocation_error,
            Err(other) => InvocationError::runtime(format!("{:#}", other)),
        }
    }
}

impl From<std::io::Error> for InvocationError {
    fn from(err: std::io::Error) -> Self {
        InvocationError::runtime(format!("IO error: {}", err))
    }
}
