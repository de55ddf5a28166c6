//! Response body interception.
//!
//! [`InterceptedBody`] wraps a response body to observe it while it is streamed to the client.
//! Once the body completes, fails or is dropped, a callback receives a [`ResponseSummary`] with
//! the final status, the number of bytes written and, if requested, a capped copy of the body.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};
use http_body::{Body as _, Frame, SizeHint};

/// Callback invoked exactly once when an intercepted body is finished.
pub type OnComplete = Box<dyn FnOnce(ResponseSummary) + Send + 'static>;

/// The outcome of a response as observed by an [`InterceptedBody`].
#[derive(Clone, Debug)]
pub struct ResponseSummary {
    status: StatusCode,
    size: u64,
    completed: bool,
    error_body: Option<Bytes>,
}

impl ResponseSummary {
    /// The status code of the response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The number of body bytes written to the client.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns `false` if the body was dropped or failed before its end.
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// The body of an error response, truncated to the capture limit.
    ///
    /// This is `None` unless capturing was requested.
    pub fn error_body(&self) -> Option<&[u8]> {
        self.error_body.as_deref()
    }
}

struct Interceptor {
    status: StatusCode,
    size: u64,
    capture: Option<(BytesMut, usize)>,
    on_complete: OnComplete,
}

impl Interceptor {
    fn observe(&mut self, data: &Bytes) {
        self.size += data.len() as u64;

        if let Some((buf, limit)) = &mut self.capture {
            let remaining = limit.saturating_sub(buf.len());
            buf.extend_from_slice(&data[..remaining.min(data.len())]);
        }
    }

    fn finish(self, completed: bool) {
        let summary = ResponseSummary {
            status: self.status,
            size: self.size,
            completed,
            error_body: self.capture.map(|(buf, _)| buf.freeze()),
        };
        (self.on_complete)(summary);
    }
}

pin_project_lite::pin_project! {
    /// A response body that reports its [`ResponseSummary`] when finished.
    ///
    /// The callback runs when the end of the stream is reached, when the inner body fails, or when
    /// the body is dropped, whichever happens first.
    pub struct InterceptedBody {
        #[pin]
        inner: Body,
        interceptor: Option<Interceptor>,
    }

    impl PinnedDrop for InterceptedBody {
        fn drop(this: Pin<&mut Self>) {
            if let Some(interceptor) = this.project().interceptor.take() {
                interceptor.finish(false);
            }
        }
    }
}

impl InterceptedBody {
    /// Wraps `inner` and invokes `on_complete` once the body is finished.
    pub fn new(inner: Body, status: StatusCode, on_complete: OnComplete) -> Self {
        Self {
            inner,
            interceptor: Some(Interceptor {
                status,
                size: 0,
                capture: None,
                on_complete,
            }),
        }
    }

    /// Keeps up to `limit` bytes of the body for [`ResponseSummary::error_body`].
    pub fn capture(mut self, limit: usize) -> Self {
        if let Some(interceptor) = &mut self.interceptor {
            interceptor.capture = Some((BytesMut::new(), limit));
        }
        self
    }
}

impl http_body::Body for InterceptedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let poll_result = this.inner.poll_frame(cx);

        match &poll_result {
            Poll::Ready(Some(Ok(frame))) => {
                if let (Some(data), Some(interceptor)) = (frame.data_ref(), this.interceptor) {
                    interceptor.observe(data);
                }
            }
            Poll::Ready(None) => {
                if let Some(interceptor) = this.interceptor.take() {
                    interceptor.finish(true);
                }
            }
            Poll::Ready(Some(Err(_))) => {
                if let Some(interceptor) = this.interceptor.take() {
                    interceptor.finish(false);
                }
            }
            Poll::Pending => {}
        }

        poll_result
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
