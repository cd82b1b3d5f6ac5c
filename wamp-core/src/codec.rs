use crate::msg::{Message, MessageError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FrameFormat {
    /// 4-byte big-endian length followed by the JSON payload.
    #[default]
    LengthPrefixed,
    NewlineDelimited,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid message: {0}")]
    Message(#[from] MessageError),

    #[error("Frame of {size} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },
}

pub fn encode_message(msg: &Message) -> Result<Bytes, CodecError> {
    let json = serde_json::to_vec(&msg.to_json())?;
    Ok(Bytes::from(json))
}

pub fn decode_message(data: &[u8]) -> Result<Message, CodecError> {
    let value: Value = serde_json::from_slice(data)?;
    Ok(Message::from_json(&value)?)
}

pub fn encode_frame(msg: &Message, format: FrameFormat, dst: &mut BytesMut) -> Result<(), CodecError> {
    let json = encode_message(msg)?;

    match format {
        FrameFormat::LengthPrefixed => {
            dst.reserve(4 + json.len());
            dst.put_u32(json.len() as u32);
            dst.put_slice(&json);
        }
        FrameFormat::NewlineDelimited => {
            dst.reserve(json.len() + 1);
            dst.put_slice(&json);
            dst.put_u8(b'\n');
        }
    }
    Ok(())
}

/// Take one complete frame off the front of `src`.
///
/// Returns `Ok(None)` and leaves `src` untouched while the frame is still
/// incomplete.
pub fn decode_frame(
    src: &mut BytesMut,
    format: FrameFormat,
    max_frame_size: usize,
) -> Result<Option<Message>, CodecError> {
    match format {
        FrameFormat::LengthPrefixed => {
            if src.len() < 4 {
                return Ok(None);
            }

            let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
            if len > max_frame_size {
                return Err(CodecError::FrameTooLarge {
                    size: len,
                    max: max_frame_size,
                });
            }

            if src.len() < 4 + len {
                src.reserve(4 + len - src.len());
                return Ok(None);
            }

            src.advance(4);
            let payload = src.split_to(len);
            decode_message(&payload).map(Some)
        }
        FrameFormat::NewlineDelimited => {
            let Some(newline_pos) = src.iter().position(|&b| b == b'\n') else {
                if src.len() > max_frame_size {
                    return Err(CodecError::FrameTooLarge {
                        size: src.len(),
                        max: max_frame_size,
                    });
                }
                return Ok(None);
            };

            let line = src.split_to(newline_pos + 1);
            decode_message(&line[..newline_pos]).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RequestId;
    use crate::msg::{Dict, Unregistered, Yield};
    use serde_json::json;

    fn sample() -> Message {
        Message::Yield(Yield {
            request_id: RequestId::new(5),
            options: Dict::new(),
            args: vec![json!(42)],
            kwargs: Dict::new(),
        })
    }

    #[test]
    fn test_encode_message_is_json_array() {
        let bytes = encode_message(&sample()).unwrap();
        assert_eq!(&bytes[..], br#"[70,5,{},[42]]"#);
    }

    #[test]
    fn test_decode_message_rejects_unknown_type() {
        let err = decode_message(b"[999,1]").unwrap_err();
        assert!(matches!(
            err,
            CodecError::Message(MessageError::UnknownMessageType(999))
        ));
    }

    #[test]
    fn test_length_prefixed_partial_frame() {
        let mut buf = BytesMut::new();
        encode_frame(&sample(), FrameFormat::LengthPrefixed, &mut buf).unwrap();
        let full = buf.clone();

        let mut partial = BytesMut::from(&full[..full.len() - 2]);
        assert!(decode_frame(&mut partial, FrameFormat::LengthPrefixed, 1024)
            .unwrap()
            .is_none());

        partial.extend_from_slice(&full[full.len() - 2..]);
        let decoded = decode_frame(&mut partial, FrameFormat::LengthPrefixed, 1024)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, sample());
        assert!(partial.is_empty());
    }

    #[test]
    fn test_newline_delimited_two_frames() {
        let second = Message::Unregistered(Unregistered {
            request_id: RequestId::new(6),
        });
        let mut buf = BytesMut::new();
        encode_frame(&sample(), FrameFormat::NewlineDelimited, &mut buf).unwrap();
        encode_frame(&second, FrameFormat::NewlineDelimited, &mut buf).unwrap();

        let first = decode_frame(&mut buf, FrameFormat::NewlineDelimited, 1024).unwrap();
        let next = decode_frame(&mut buf, FrameFormat::NewlineDelimited, 1024).unwrap();
        assert_eq!(first, Some(sample()));
        assert_eq!(next, Some(second));
        assert!(decode_frame(&mut buf, FrameFormat::NewlineDelimited, 1024)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_frame_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32(4096);
        let err = decode_frame(&mut buf, FrameFormat::LengthPrefixed, 1024).unwrap_err();
        assert!(matches!(
            err,
            CodecError::FrameTooLarge {
                size: 4096,
                max: 1024
            }
        ));
    }
}
