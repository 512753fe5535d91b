//! Sentinel framing shared by server workers and the client receiver.
//!
//! A frame is any run of bytes terminated by a single `>`. There is no
//! length prefix and no escaping, so the terminator must never appear inside
//! a payload. The read loop pulls fixed-size chunks off the stream and stops
//! as soon as the last byte of the most recent chunk is the terminator:
//!
//! ```text
//! chunk 1: "hel"   -> keep reading
//! chunk 2: "lo>"   -> complete, frame = "hello>"
//! ```
//!
//! A terminator that lands in the middle of a chunk does not end the frame.
//! Payloads containing `>` are outside the protocol.

use crate::error::FrameError;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// End-of-message byte.
pub const SENTINEL: u8 = b'>';

/// Size of each read issued by the frame loop.
pub const CHUNK_SIZE: usize = 2048;

/// Returns true if `chunk` closes a frame.
pub fn is_complete(chunk: &[u8]) -> bool {
    chunk.last() == Some(&SENTINEL)
}

/// Read one frame from `reader`.
///
/// Blocks until a chunk ending with the sentinel arrives. The returned
/// string includes the sentinel. There is no upper bound on frame size and
/// no read deadline; callers that need one wrap this future in a timeout
/// (see [`crate::receiver`]).
pub async fn read_frame<R>(reader: &mut R) -> Result<String, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut payload = BytesMut::with_capacity(CHUNK_SIZE);

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(FrameError::UnexpectedEof {
                received: payload.len(),
            });
        }

        payload.extend_from_slice(&chunk[..n]);
        trace!(chunk = n, total = payload.len(), "Read frame chunk");

        if is_complete(&chunk[..n]) {
            break;
        }
    }

    String::from_utf8(Vec::from(payload)).map_err(|_| FrameError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_is_complete() {
        assert!(is_complete(b"ok>"));
        assert!(is_complete(b">"));
        assert!(!is_complete(b"ok"));
        assert!(!is_complete(b"a>b"));
        assert!(!is_complete(b""));
    }

    #[tokio::test]
    async fn test_single_chunk() {
        let mut mock = Builder::new().read(b"hello>").build();
        assert_eq!(read_frame(&mut mock).await.unwrap(), "hello>");
    }

    #[tokio::test]
    async fn test_reassembles_split_chunks() {
        let mut mock = Builder::new()
            .read(b"h")
            .read(b"el")
            .read(b"lo wor")
            .read(b"ld")
            .read(b">")
            .build();
        assert_eq!(read_frame(&mut mock).await.unwrap(), "hello world>");
    }

    #[tokio::test]
    async fn test_payload_larger_than_chunk() {
        let body = "x".repeat(CHUNK_SIZE * 2 + 904);
        let wire = format!("{body}>");
        let mut mock = Builder::new().read(wire.as_bytes()).build();

        let frame = read_frame(&mut mock).await.unwrap();
        assert_eq!(frame.len(), CHUNK_SIZE * 2 + 905);
        assert_eq!(frame, wire);
    }

    #[tokio::test]
    async fn test_chunk_boundary_exactly_at_buffer_size() {
        let first = "a".repeat(CHUNK_SIZE);
        let mut mock = Builder::new()
            .read(first.as_bytes())
            .read(b"tail>")
            .build();

        let frame = read_frame(&mut mock).await.unwrap();
        assert_eq!(frame, format!("{first}tail>"));
    }

    #[tokio::test]
    async fn test_sentinel_mid_chunk_does_not_end_frame() {
        let mut mock = Builder::new().read(b"a>b").read(b"c>").build();
        assert_eq!(read_frame(&mut mock).await.unwrap(), "a>bc>");
    }

    #[tokio::test]
    async fn test_sentinel_in_payload_is_out_of_contract() {
        // A chunk that happens to end on an embedded '>' splits the message.
        let mut mock = Builder::new().read(b"a>").read(b"b>").build();
        assert_eq!(read_frame(&mut mock).await.unwrap(), "a>");
        assert_eq!(read_frame(&mut mock).await.unwrap(), "b>");
    }

    #[tokio::test]
    async fn test_eof_before_sentinel() {
        let mut mock = Builder::new().read(b"abc").build();
        match read_frame(&mut mock).await {
            Err(FrameError::UnexpectedEof { received }) => assert_eq!(received, 3),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_eof_on_empty_stream() {
        let mut mock = Builder::new().build();
        assert!(matches!(
            read_frame(&mut mock).await,
            Err(FrameError::UnexpectedEof { received: 0 })
        ));
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let mut mock = Builder::new().read(&[0xff, 0xfe, SENTINEL]).build();
        assert!(matches!(
            read_frame(&mut mock).await,
            Err(FrameError::InvalidUtf8)
        ));
    }

    #[tokio::test]
    async fn test_read_error_propagates() {
        let mut mock = Builder::new()
            .read(b"par")
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        match read_frame(&mut mock).await {
            Err(FrameError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
