//! Response body tee
//!
//! Wraps the upstream byte stream that is piped to the caller and keeps a
//! copy of every chunk. When the stream ends the accumulated body is handed
//! to the side channel through a oneshot; the caller-facing stream never
//! waits on the receiver.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::sync::oneshot;

use crate::error::SideChannelError;

pub type BodyReceiver = oneshot::Receiver<Result<Bytes, SideChannelError>>;

pub struct TeeStream<S> {
    inner: S,
    buffer: Option<BytesMut>,
    limit: usize,
    done: Option<oneshot::Sender<Result<Bytes, SideChannelError>>>,
}

impl<S> TeeStream<S> {
    /// Wrap `inner`, keeping at most `limit` bytes for inspection
    pub fn new(inner: S, limit: usize) -> (Self, BodyReceiver) {
        let (tx, rx) = oneshot::channel();
        let tee = Self {
            inner,
            buffer: Some(BytesMut::new()),
            limit,
            done: Some(tx),
        };
        (tee, rx)
    }

    fn record(&mut self, chunk: &Bytes) {
        if let Some(buffer) = self.buffer.as_mut() {
            if buffer.len() + chunk.len() > self.limit {
                // Keep streaming, stop retaining
                self.buffer = None;
            } else {
                buffer.extend_from_slice(chunk);
            }
        }
    }

    fn finish(&mut self, result: Result<Bytes, SideChannelError>) {
        if let Some(tx) = self.done.take() {
            // Receiver may have timed out already
            let _ = tx.send(result);
        }
    }

    fn complete(&mut self) {
        let result = match self.buffer.take() {
            Some(buffer) => Ok(buffer.freeze()),
            None => Err(SideChannelError::TooLarge(self.limit)),
        };
        self.finish(result);
    }
}

impl<S, E> Stream for TeeStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.record(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish(Err(SideChannelError::Incomplete));
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.complete();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> Drop for TeeStream<S> {
    fn drop(&mut self) {
        // Caller went away before the body finished
        self.finish(Err(SideChannelError::Incomplete));
    }
}
