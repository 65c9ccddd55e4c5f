//! [`OutputCacheStream`]: the write-through buffering wrapper over an
//! outbound response body (spec §4.3).

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};

/// A wrapping sink installed as the response body during capture.
///
/// Forwards every frame from the wrapped body unchanged, while additionally
/// copying data frames into an in-memory buffer until the cumulative
/// buffered size would exceed `maximum_body_size`. On overflow the buffer
/// is dropped and [`Self::buffering_enabled`] goes false for the rest of
/// the stream; forwarding is unaffected either way. `on_start` fires
/// exactly once, the first time polling this body makes forward progress
/// (a frame is produced, the stream ends, or it errors) — the signal this
/// crate's middleware uses to latch `RequestContext::mark_response_started`.
pub struct OutputCacheStream<B> {
    inner: B,
    maximum_body_size: usize,
    buffer: Option<BytesMut>,
    started: bool,
    on_start: Option<Box<dyn FnOnce() + Send>>,
}

impl<B> OutputCacheStream<B> {
    /// Wraps `inner`. `on_start` is called at most once.
    pub fn new(
        inner: B,
        maximum_body_size: usize,
        on_start: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            inner,
            maximum_body_size,
            buffer: Some(BytesMut::new()),
            started: false,
            on_start: Some(Box::new(on_start)),
        }
    }

    /// Whether the ceiling has not yet been exceeded and
    /// [`Self::disable_buffering`] has not been called.
    pub fn buffering_enabled(&self) -> bool {
        self.buffer.is_some()
    }

    /// Opts out of buffering and releases any bytes buffered so far (spec:
    /// "may be called externally to opt out... buffer is released
    /// immediately").
    pub fn disable_buffering(&mut self) {
        self.buffer = None;
    }

    /// Returns the accumulated body so far. `None` once buffering has been
    /// disabled (spec: "callable only when `BufferingEnabled` is true").
    pub fn cached_response_body(&self) -> Option<Bytes> {
        self.buffer.as_ref().map(|buffer| buffer.clone().freeze())
    }

    fn record(&mut self, chunk: &Bytes) {
        if let Some(buffer) = self.buffer.as_mut() {
            if buffer.len() + chunk.len() > self.maximum_body_size {
                self.buffer = None;
            } else {
                buffer.extend_from_slice(chunk);
            }
        }
    }
}

impl<B> Body for OutputCacheStream<B>
where
    B: Body<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(outcome) => {
                if !this.started {
                    this.started = true;
                    if let Some(cb) = this.on_start.take() {
                        cb();
                    }
                }
                match outcome {
                    Some(Ok(frame)) => {
                        if let Some(data) = frame.data_ref() {
                            this.record(data);
                        }
                        Poll::Ready(Some(Ok(frame)))
                    }
                    Some(Err(err)) => {
                        this.buffer = None;
                        Poll::Ready(Some(Err(err)))
                    }
                    None => Poll::Ready(None),
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Full};
    use std::collections::VecDeque;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    /// A hand-rolled multi-frame body for exercising the ceiling-breach
    /// path, which `Full` (always one frame) can't reach.
    struct Chunked(VecDeque<&'static str>);

    impl Body for Chunked {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            Poll::Ready(
                self.0.pop_front().map(|c| Ok(Frame::data(Bytes::from_static(c.as_bytes())))),
            )
        }
    }

    fn chunked(chunks: Vec<&'static str>) -> Chunked {
        Chunked(chunks.into())
    }

    #[tokio::test]
    async fn forwards_all_frames_unchanged() {
        let body = Full::new(Bytes::from_static(b"hello"));
        let started = Arc::new(AtomicUsize::new(0));
        let started_clone = started.clone();
        let mut stream = OutputCacheStream::new(body, 1024, move || {
            started_clone.fetch_add(1, Ordering::SeqCst);
        });
        let collected = Pin::new(&mut stream).collect().await.unwrap().to_bytes();
        assert_eq!(collected, Bytes::from_static(b"hello"));
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn buffers_everything_under_the_ceiling() {
        let body = Full::new(Bytes::from_static(b"hello"));
        let mut stream = OutputCacheStream::new(body, 1024, || {});
        let _ = Pin::new(&mut stream).collect().await.unwrap();
        assert!(stream.buffering_enabled());
        assert_eq!(stream.cached_response_body(), Some(Bytes::from_static(b"hello")));
    }

    #[tokio::test]
    async fn disables_buffering_once_the_ceiling_is_exceeded() {
        let body = chunked(vec!["01234", "56789", "x"]);
        let mut stream = OutputCacheStream::new(body, 10, || {});
        let collected = Pin::new(&mut stream).collect().await.unwrap().to_bytes();
        // Forwarding is unaffected by the ceiling breach.
        assert_eq!(collected, Bytes::from_static(b"0123456789x"));
        assert!(!stream.buffering_enabled());
        assert_eq!(stream.cached_response_body(), None);
    }

    #[tokio::test]
    async fn external_disable_releases_the_buffer_immediately() {
        let body = Full::new(Bytes::from_static(b"hello"));
        let mut stream = OutputCacheStream::new(body, 1024, || {});
        stream.disable_buffering();
        let _ = Pin::new(&mut stream).collect().await.unwrap();
        assert!(!stream.buffering_enabled());
    }

    #[tokio::test]
    async fn on_start_fires_at_most_once() {
        let body = chunked(vec!["a", "b", "c"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let mut stream = OutputCacheStream::new(body, 1024, move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        let _ = Pin::new(&mut stream).collect().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
