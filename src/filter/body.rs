//! Byte-counting response body.

use bytes::Buf;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use super::pending::PendingObservation;

/// Wraps a response body, forwarding every frame unchanged and counting the
/// bytes of its data frames.
///
/// When built by the metrics layer the body also carries the request's
/// pending observation, which is reported once the body ends, fails or is
/// dropped by the server.
#[pin_project]
pub struct CountingBody<B> {
    #[pin]
    inner: B,
    count: u64,
    observation: Option<PendingObservation>,
}

impl<B> CountingBody<B> {
    pub fn new(inner: B) -> Self {
        CountingBody {
            inner,
            count: 0,
            observation: None,
        }
    }

    pub(crate) fn observed(inner: B, observation: Option<PendingObservation>) -> Self {
        CountingBody {
            inner,
            count: 0,
            observation,
        }
    }

    /// Bytes of data frames yielded so far.
    pub fn byte_count(&self) -> u64 {
        self.count
    }
}

impl<B: Body> Body for CountingBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let frame = ready!(this.inner.poll_frame(cx));
        match &frame {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    let len = data.remaining() as u64;
                    *this.count += len;
                    if let Some(observation) = this.observation.as_mut() {
                        observation.add_bytes(len);
                    }
                }
            }
            // End of stream or a failed body: the payload is as large as it gets.
            Some(Err(_)) | None => {
                this.observation.take();
            }
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
