//! Well-known WAMP URIs used by the client.

pub const INVALID_ARGUMENT: &str = "wamp.error.invalid_argument";
pub const CANCELED: &str = "wamp.error.canceled";
pub const RUNTIME_ERROR: &str = "wamp.error.runtime_error";
