use crate::body::CompressionBody;
use crate::config::Config;
use crate::negotiate::negotiate;
use http::{Request, Response};
use http_body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

pin_project! {
    /// Response future of [`CompressionService`](crate::CompressionService).
    ///
    /// Holds the request head until the inner response arrives.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        request: Request<()>,
        config: Arc<Config>,
    }
}

impl<F> ResponseFuture<F> {
    pub(crate) fn new(inner: F, request: Request<()>, config: Arc<Config>) -> Self {
        Self {
            inner,
            request,
            config,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let response = ready!(this.inner.poll(cx))?;
        Poll::Ready(Ok(wrap_response(response, this.request, this.config)))
    }
}

/// The response head is final at this point, so this is where the decision
/// is made. An exact body size hint stands in for a missing `Content-Length`.
fn wrap_response<B: Body>(
    response: Response<B>,
    request: &Request<()>,
    config: &Config,
) -> Response<CompressionBody<B>> {
    let (mut parts, body) = response.into_parts();

    let estimated_length = body.size_hint().exact();
    let body = match negotiate(request, &mut parts.headers, estimated_length, config) {
        Some(codec) => CompressionBody::compressed(body, codec.encoder(config)),
        None => CompressionBody::passthrough(body),
    };

    Response::from_parts(parts, body)
}
