//! WAMP message model shared by the transport and client crates.

pub mod codec;
pub mod error;
pub mod ids;
pub mod msg;
pub mod policy;
pub mod uri;

pub use codec::{decode_message, encode_message, CodecError, FrameFormat};
pub use error::InvocationError;
pub use ids::{PublicationId, RegistrationId, RequestId, RequestIdAllocator, SubscriptionId, MAX_ID};
pub use msg::{Args, Dict, Message, MessageError, MessageKind};
pub use policy::{CancelMode, InvocationPolicy, MatchPolicy};
