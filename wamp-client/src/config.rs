use std::time::Duration;
use wamp_core::CancelMode;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Cancel mode used when a call is cancelled without an explicit mode
    pub default_cancel_mode: CancelMode,
    /// How long a cancelled call waits for the peer's final response
    pub cancel_wait: Duration,
    /// How long an interrupted procedure may take to finish on its own
    pub interrupt_grace: Duration,
    /// Capacity of inbound message queues created for this client
    pub inbound_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_cancel_mode: CancelMode::KillNoWait,
            cancel_wait: Duration::from_secs(5),
            interrupt_grace: Duration::from_secs(5),
            inbound_buffer: 256,
        }
    }
}
