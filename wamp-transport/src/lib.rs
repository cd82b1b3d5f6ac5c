pub mod codec;
pub mod memory;
pub mod stream;
pub mod transport;

pub use codec::WampCodec;
pub use memory::{pair, MemoryPeer, MemorySession};
pub use stream::{connect, StreamConfig, StreamSession};
pub use transport::{Connection, Session, TransportError};
