use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Largest id a WAMP peer may use (2^53, the largest integer exactly
/// representable as an IEEE double).
pub const MAX_ID: u64 = 1 << 53;

/// Per-message correlation id, scoped to one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

/// Router-assigned id of a procedure registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(u64);

/// Router-assigned id of a topic subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicationId(u64);

macro_rules! id_impls {
    ($name:ident, $label:literal) => {
        impl $name {
            pub fn new(value: u64) -> Self {
                $name(value)
            }

            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                $name::new(value)
            }
        }
    };
}

id_impls!(RequestId, "RequestId");
id_impls!(RegistrationId, "RegistrationId");
id_impls!(SubscriptionId, "SubscriptionId");
id_impls!(PublicationId, "PublicationId");

/// Sequential request id generator.
///
/// Ids start at 1 and wrap back to 1 once [`MAX_ID`] has been handed out, so
/// every id stays inside the range a WAMP router accepts.
#[derive(Debug)]
pub struct RequestIdAllocator {
    next: AtomicU64,
}

impl RequestIdAllocator {
    pub fn new() -> Self {
        RequestIdAllocator {
            next: AtomicU64::new(1),
        }
    }

    pub fn allocate(&self) -> RequestId {
        let mut current = self.next.load(Ordering::Relaxed);
        loop {
            let following = if current >= MAX_ID { 1 } else { current + 1 };
            match self.next.compare_exchange_weak(
                current,
                following,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return RequestId::new(current),
                Err(actual) => current = actual,
            }
        }
    }

    pub fn peek_next(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn starting_at(value: u64) -> Self {
        RequestIdAllocator {
            next: AtomicU64::new(value),
        }
    }
}

impl Default for RequestIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_is_sequential() {
        let allocator = RequestIdAllocator::new();

        assert_eq!(allocator.allocate(), RequestId::new(1));
        assert_eq!(allocator.allocate(), RequestId::new(2));
        assert_eq!(allocator.peek_next(), 3);
    }

    #[test]
    fn test_allocator_wraps_at_max_id() {
        let allocator = RequestIdAllocator::starting_at(MAX_ID);

        assert_eq!(allocator.allocate(), RequestId::new(MAX_ID));
        assert_eq!(allocator.allocate(), RequestId::new(1));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", RequestId::new(7)), "RequestId(7)");
        assert_eq!(format!("{}", RegistrationId::new(9)), "RegistrationId(9)");
        assert_eq!(format!("{}", SubscriptionId::from(3)), "SubscriptionId(3)");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&PublicationId::new(42)).unwrap();
        assert_eq!(json, "42");
    }
}
