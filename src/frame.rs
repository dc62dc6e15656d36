//! Wire framing for the backend protocol.
//!
//! Every message travels as `[marker: u16][total_length: u16][payload]`, both
//! header fields big-endian, with `total_length` covering the header itself.
//! The fixed marker lets the receiver detect a desynchronised stream; a
//! stream that presents a wrong marker is corrupt and the owning connection
//! must be torn down.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Fixed sentinel prefixed to every frame.
pub const MARKER: u16 = 0xDEAD;
/// Length of the frame header in bytes.
pub const HEADER_LEN: usize = 4;
/// Hard cap on a single frame's total length, header included.
pub const MAX_FRAME: usize = 32 * 1024;

/// Errors raised while framing or unframing the byte stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream is desynchronised; the connection is unusable.
    #[error("bad frame marker 0x{0:04x}")]
    BadMarker(u16),
    /// The header announces a length outside `HEADER_LEN..=MAX_FRAME`.
    #[error("frame length {0} out of bounds")]
    BadLength(usize),
    /// A payload too large to frame was rejected before transmission.
    #[error("payload of {0} bytes exceeds the frame cap")]
    Oversize(usize),
    /// I/O error surfaced through the codec.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Streaming codec for backend frames.
///
/// Decoding consumes complete frames from the front of the buffer and leaves
/// any incomplete trailing bytes in place for the next read.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let marker = u16::from_be_bytes([src[0], src[1]]);
        if marker != MARKER {
            return Err(FrameError::BadMarker(marker));
        }
        let total = usize::from(u16::from_be_bytes([src[2], src[3]]));
        if total < HEADER_LEN || total > MAX_FRAME {
            return Err(FrameError::BadLength(total));
        }
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        let mut frame = src.split_to(total);
        frame.advance(HEADER_LEN);
        Ok(Some(frame.freeze()))
    }
}

impl Encoder<&[u8]> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), FrameError> {
        let total = payload.len() + HEADER_LEN;
        if total > MAX_FRAME {
            return Err(FrameError::Oversize(payload.len()));
        }
        let Ok(total) = u16::try_from(total) else {
            return Err(FrameError::Oversize(payload.len()));
        };
        dst.reserve(usize::from(total));
        dst.put_u16(MARKER);
        dst.put_u16(total);
        dst.extend_from_slice(payload);
        Ok(())
    }
}

/// Frame a single payload into a standalone buffer.
///
/// # Errors
/// Returns [`FrameError::Oversize`] when the framed length would exceed
/// [`MAX_FRAME`]; nothing is emitted in that case.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::with_capacity(payload.len() + HEADER_LEN);
    FrameCodec.encode(payload, &mut buf)?;
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn decode_all(src: &mut BytesMut) -> Result<Vec<Bytes>, FrameError> {
        let mut codec = FrameCodec;
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(src)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    #[test]
    fn decodes_consecutive_frames_in_order() {
        let mut src = BytesMut::new();
        src.extend_from_slice(&[0xDE, 0xAD, 0x00, 0x08, 0x01, 0x02, 0x03, 0x04]);
        src.extend_from_slice(&[0xDE, 0xAD, 0x00, 0x06, 0xFF, 0xFF]);
        let frames = decode_all(&mut src).unwrap();
        assert_eq!(frames, vec![
            Bytes::from_static(&[0x01, 0x02, 0x03, 0x04]),
            Bytes::from_static(&[0xFF, 0xFF]),
        ]);
        assert!(src.is_empty());
    }

    #[test]
    fn retains_incomplete_trailing_bytes() {
        let mut src = BytesMut::new();
        src.extend_from_slice(&[0xDE, 0xAD, 0x00, 0x08, 0x01, 0x02]);
        assert!(decode_all(&mut src).unwrap().is_empty());
        assert_eq!(src.len(), 6);

        src.extend_from_slice(&[0x03, 0x04]);
        let frames = decode_all(&mut src).unwrap();
        assert_eq!(frames, vec![Bytes::from_static(&[0x01, 0x02, 0x03, 0x04])]);
    }

    #[test]
    fn short_header_is_not_an_error() {
        let mut src = BytesMut::new();
        src.extend_from_slice(&[0xDE, 0xAD, 0x00]);
        assert!(decode_all(&mut src).unwrap().is_empty());
        assert_eq!(src.len(), 3);
    }

    #[test]
    fn bad_marker_is_corruption() {
        let mut src = BytesMut::new();
        src.extend_from_slice(&[0xCA, 0xFE, 0x00, 0x06, 0x00, 0x00]);
        match decode_all(&mut src) {
            Err(FrameError::BadMarker(found)) => assert_eq!(found, 0xCAFE),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn undersized_length_is_rejected() {
        let mut src = BytesMut::new();
        src.extend_from_slice(&[0xDE, 0xAD, 0x00, 0x03, 0xAA]);
        assert!(matches!(
            decode_all(&mut src),
            Err(FrameError::BadLength(3))
        ));
    }

    #[test]
    fn oversized_payload_is_rejected_locally() {
        let payload = vec![0u8; MAX_FRAME];
        match encode_frame(&payload) {
            Err(FrameError::Oversize(len)) => assert_eq!(len, MAX_FRAME),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn largest_frame_round_trips() {
        let payload = vec![0x5A; MAX_FRAME - HEADER_LEN];
        let framed = encode_frame(&payload).unwrap();
        assert_eq!(framed.len(), MAX_FRAME);
        let mut src = BytesMut::from(&framed[..]);
        let frames = decode_all(&mut src).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &payload[..]);
    }

    proptest! {
        // Encode followed by decode is the identity on any in-bounds payload.
        #[test]
        fn encode_decode_identity(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
            let framed = encode_frame(&payload).unwrap();
            let mut src = BytesMut::from(&framed[..]);
            let frames = decode_all(&mut src).unwrap();
            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(&frames[0][..], &payload[..]);
            prop_assert!(src.is_empty());
        }
    }
}
