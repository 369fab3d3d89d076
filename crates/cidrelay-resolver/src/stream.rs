//! Fixed-size chunk relay for gateway response bodies
//!
//! [`ChunkedStream`] re-frames an upstream byte stream into chunks of exactly
//! [`CHUNK_SIZE`] bytes (the final chunk may be shorter). Headers have already
//! been committed by the time the body is relayed, so a mid-stream read error
//! cannot become an error response: the stream yields one sentinel chunk
//! describing the failure and then ends.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use pin_project_lite::pin_project;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tracing::warn;

/// Relay chunk size (8 KiB)
pub const CHUNK_SIZE: usize = 8192;

/// Prefix of the sentinel chunk emitted on a mid-stream failure
pub const STREAM_ERROR_PREFIX: &str = "Stream error: ";

pin_project! {
    /// Re-chunks a fallible byte stream into fixed-size chunks
    pub struct ChunkedStream<S> {
        #[pin]
        inner: S,
        buffer: BytesMut,
        chunk_size: usize,
        sentinel: Option<Bytes>,
        finished: bool,
    }
}

impl<S> ChunkedStream<S> {
    /// Wrap `inner` with the default 8 KiB chunk size
    pub fn new(inner: S) -> Self {
        Self::with_chunk_size(inner, CHUNK_SIZE)
    }

    /// Wrap `inner` with a custom chunk size
    pub fn with_chunk_size(inner: S, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            inner,
            buffer: BytesMut::with_capacity(chunk_size),
            chunk_size,
            sentinel: None,
            finished: false,
        }
    }
}

impl<S, E> Stream for ChunkedStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        let mut this = self.project();

        loop {
            if this.buffer.len() >= *this.chunk_size {
                return Poll::Ready(Some(this.buffer.split_to(*this.chunk_size).freeze()));
            }

            if let Some(sentinel) = this.sentinel.take() {
                return Poll::Ready(Some(sentinel));
            }

            if *this.finished {
                return Poll::Ready(None);
            }

            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(bytes)) => this.buffer.extend_from_slice(&bytes),
                Some(Err(err)) => {
                    warn!(error = %err, "Upstream body failed mid-stream");
                    *this.finished = true;
                    *this.sentinel = Some(Bytes::from(format!("{}{}", STREAM_ERROR_PREFIX, err)));
                    if !this.buffer.is_empty() {
                        return Poll::Ready(Some(this.buffer.split().freeze()));
                    }
                }
                None => {
                    *this.finished = true;
                    if !this.buffer.is_empty() {
                        return Poll::Ready(Some(this.buffer.split().freeze()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, StreamExt};
    use proptest::prelude::*;
    use std::io;

    fn frames(sizes: &[usize]) -> impl Stream<Item = Result<Bytes, io::Error>> {
        let frames: Vec<_> = sizes.iter().map(|&n| Ok(Bytes::from(vec![7u8; n]))).collect();
        stream::iter(frames)
    }

    async fn chunk_lengths<S>(stream: ChunkedStream<S>) -> Vec<usize>
    where
        S: Stream<Item = Result<Bytes, io::Error>>,
    {
        stream.map(|chunk| chunk.len()).collect().await
    }

    #[tokio::test]
    async fn test_single_frame_rechunked() {
        let lengths = chunk_lengths(ChunkedStream::new(frames(&[20_000]))).await;
        assert_eq!(lengths, vec![8192, 8192, 3616]);
    }

    #[tokio::test]
    async fn test_small_frames_coalesced() {
        let lengths = chunk_lengths(ChunkedStream::new(frames(&[1000; 20]))).await;
        assert_eq!(lengths, vec![8192, 8192, 3616]);
    }

    #[tokio::test]
    async fn test_exact_multiple() {
        let lengths = chunk_lengths(ChunkedStream::new(frames(&[8192, 8192]))).await;
        assert_eq!(lengths, vec![8192, 8192]);
    }

    #[tokio::test]
    async fn test_empty_body() {
        let lengths = chunk_lengths(ChunkedStream::new(frames(&[]))).await;
        assert!(lengths.is_empty());
    }

    #[tokio::test]
    async fn test_error_flushes_then_emits_sentinel() {
        let upstream = stream::iter(vec![
            Ok(Bytes::from(vec![1u8; 9000])),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from(vec![2u8; 100])),
        ]);

        let chunks: Vec<Bytes> = ChunkedStream::new(upstream).collect().await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 8192);
        assert_eq!(chunks[1].len(), 808);
        assert_eq!(chunks[2], Bytes::from("Stream error: reset"));
    }

    #[tokio::test]
    async fn test_error_on_first_frame() {
        let upstream = stream::iter(vec![Err::<Bytes, _>(io::Error::new(
            io::ErrorKind::TimedOut,
            "timed out",
        ))]);

        let chunks: Vec<Bytes> = ChunkedStream::new(upstream).collect().await;
        assert_eq!(chunks, vec![Bytes::from("Stream error: timed out")]);
    }

    proptest! {
        #[test]
        fn prop_chunks_preserve_bytes(sizes in proptest::collection::vec(0usize..20_000, 0..12)) {
            let total: usize = sizes.iter().sum();
            let lengths = futures::executor::block_on(chunk_lengths(ChunkedStream::new(frames(&sizes))));

            prop_assert_eq!(lengths.iter().sum::<usize>(), total);
            if let Some((last, full)) = lengths.split_last() {
                prop_assert!(full.iter().all(|&n| n == CHUNK_SIZE));
                prop_assert!(*last > 0 && *last <= CHUNK_SIZE);
            }
        }
    }
}
