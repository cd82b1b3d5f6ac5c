use crate::transport::TransportError;
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use wamp_core::codec::{decode_frame, encode_frame, FrameFormat};
use wamp_core::{CodecError, Message};

/// Codec for WAMP messages framed as JSON arrays.
pub struct WampCodec {
    format: FrameFormat,
    /// Maximum frame size to prevent DoS attacks
    max_frame_size: usize,
}

impl WampCodec {
    pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

    /// Length-prefixed codec with the default frame limit
    pub fn new() -> Self {
        Self {
            format: FrameFormat::LengthPrefixed,
            max_frame_size: Self::DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            ..Self::new()
        }
    }

    pub fn with_format(mut self, format: FrameFormat) -> Self {
        self.format = format;
        self
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for WampCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for WampCodec {
    type Item = Message;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(decode_frame(src, self.format, self.max_frame_size)?)
    }
}

impl Encoder<Message> for WampCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();
        encode_frame(&item, self.format, dst)?;

        let written = dst.len() - start;
        if written > self.max_frame_size {
            dst.truncate(start);
            return Err(CodecError::FrameTooLarge {
                size: written,
                max: self.max_frame_size,
            }
            .into());
        }
        Ok(())
    }
}
