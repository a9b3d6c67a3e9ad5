use crate::codec::{Codec, Encoder};
use bytes::{Buf, Bytes};
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

pin_project! {
    /// Response body returned by [`CompressionService`](crate::CompressionService).
    ///
    /// Carries the inner body's frames unchanged, or feeds its data through
    /// the negotiated [`Encoder`]. Trailers from the inner body are held back
    /// until the compressed stream has been finished.
    pub struct CompressionBody<B> {
        #[pin]
        inner: B,
        encoder: Option<Encoder>,
        phase: Phase,
        trailers: Option<HeaderMap>,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Streaming,
    Finishing,
    Trailers,
    Done,
}

impl<B> CompressionBody<B> {
    /// Wraps `inner`, compressing its data with `encoder`.
    pub fn compressed(inner: B, encoder: Encoder) -> Self {
        Self::new(inner, Some(encoder))
    }

    /// Wraps `inner` without compressing it.
    pub fn passthrough(inner: B) -> Self {
        Self::new(inner, None)
    }

    fn new(inner: B, encoder: Option<Encoder>) -> Self {
        Self {
            inner,
            encoder,
            phase: Phase::Streaming,
            trailers: None,
        }
    }

    /// Returns the codec compressing this body, if any.
    pub fn codec(&self) -> Option<Codec> {
        self.encoder.as_ref().map(Encoder::codec)
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        let Some(encoder) = this.encoder.as_mut() else {
            let frame = ready!(this.inner.poll_frame(cx));
            return Poll::Ready(frame.map(|frame| match frame {
                Ok(frame) => Ok(frame.map_data(|mut data| data.copy_to_bytes(data.remaining()))),
                Err(e) => Err(io::Error::other(e)),
            }));
        };

        loop {
            match *this.phase {
                Phase::Streaming => {
                    let frame = match ready!(this.inner.as_mut().poll_frame(cx)) {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => {
                            *this.phase = Phase::Done;
                            return Poll::Ready(Some(Err(io::Error::other(e))));
                        }
                        None => {
                            *this.phase = Phase::Finishing;
                            continue;
                        }
                    };

                    let mut data = match frame.into_data() {
                        Ok(data) => data,
                        Err(frame) => {
                            if let Ok(trailers) = frame.into_trailers() {
                                *this.trailers = Some(trailers);
                                *this.phase = Phase::Finishing;
                            }
                            continue;
                        }
                    };

                    let input = data.copy_to_bytes(data.remaining());
                    match encoder.encode(&input) {
                        // Nothing came out yet, so read on rather than yield
                        // an empty frame.
                        Ok(output) if output.is_empty() => {}
                        Ok(output) => return Poll::Ready(Some(Ok(Frame::data(output)))),
                        Err(e) => {
                            *this.phase = Phase::Done;
                            return Poll::Ready(Some(Err(e)));
                        }
                    }
                }
                Phase::Finishing => {
                    *this.phase = if this.trailers.is_some() {
                        Phase::Trailers
                    } else {
                        Phase::Done
                    };
                    match encoder.finish() {
                        Ok(output) if output.is_empty() => {}
                        Ok(output) => return Poll::Ready(Some(Ok(Frame::data(output)))),
                        Err(e) => {
                            *this.phase = Phase::Done;
                            return Poll::Ready(Some(Err(e)));
                        }
                    }
                }
                Phase::Trailers => {
                    *this.phase = Phase::Done;
                    if let Some(trailers) = this.trailers.take() {
                        return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
                    }
                }
                Phase::Done => return Poll::Ready(None),
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match self.encoder {
            Some(_) => self.phase == Phase::Done,
            None => self.inner.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self.encoder {
            Some(_) => SizeHint::default(),
            None => self.inner.size_hint(),
        }
    }
}

impl<B> fmt::Debug for CompressionBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionBody")
            .field("codec", &self.codec())
            .field("phase", &self.phase)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::{BodyExt, Full};
    use std::collections::VecDeque;
    use std::convert::Infallible;
    use std::io::Read;
    use std::pin::pin;

    /// Yields one data frame per chunk, always ready.
    struct Chunks(VecDeque<&'static [u8]>);

    impl Body for Chunks {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
            Poll::Ready(self.0.pop_front().map(|c| Ok(Frame::data(Bytes::from_static(c)))))
        }
    }

    /// Fails on the first poll.
    struct Broken;

    impl Body for Broken {
        type Data = Bytes;
        type Error = io::Error;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
            Poll::Ready(Some(Err(io::Error::new(io::ErrorKind::ConnectionReset, "gone"))))
        }
    }

    /// Polls `body` to completion. Every poll must be ready since the inner
    /// bodies here never wait.
    fn frames<B: Body>(body: Pin<&mut B>) -> Vec<Result<Frame<B::Data>, B::Error>> {
        let mut cx = Context::from_waker(std::task::Waker::noop());
        let mut body = body;
        let mut out = Vec::new();
        loop {
            match body.as_mut().poll_frame(&mut cx) {
                Poll::Ready(Some(frame)) => out.push(frame),
                Poll::Ready(None) => return out,
                Poll::Pending => panic!("body stalled"),
            }
        }
    }

    fn data_of(frames: Vec<Result<Frame<Bytes>, io::Error>>) -> Vec<u8> {
        frames
            .into_iter()
            .filter_map(|frame| frame.unwrap().into_data().ok())
            .flat_map(|data| data.to_vec())
            .collect()
    }

    fn encoder(codec: Codec) -> Encoder {
        codec.encoder(&Config::default())
    }

    #[test]
    fn test_passthrough_is_untouched() {
        let mut body = pin!(CompressionBody::passthrough(Full::new(Bytes::from_static(b"plain"))));
        assert_eq!(body.codec(), None);
        assert_eq!(body.size_hint().exact(), Some(5));

        assert_eq!(data_of(frames(body.as_mut())), b"plain");
        assert!(body.is_end_stream());
    }

    #[test]
    fn test_gzip_chunks_round_trip() {
        let inner = Chunks(VecDeque::from([&b"hello, "[..], b"wor", b"ld"]));
        let mut body = pin!(CompressionBody::compressed(inner, encoder(Codec::Gzip)));
        assert_eq!(body.codec(), Some(Codec::Gzip));
        assert_eq!(body.size_hint().exact(), None);

        let wire = data_of(frames(body.as_mut()));
        assert!(body.is_end_stream());

        let mut decoded = String::new();
        flate2::read::GzDecoder::new(&wire[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "hello, world");
    }

    #[test]
    fn test_deflate_empty_body_is_valid_stream() {
        let inner = Chunks(VecDeque::new());
        let body = pin!(CompressionBody::compressed(inner, encoder(Codec::Deflate)));

        let wire = data_of(frames(body));
        let mut decoded = Vec::new();
        flate2::read::ZlibDecoder::new(&wire[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert!(decoded.is_empty());
    }

    #[cfg(feature = "brotli")]
    #[test]
    fn test_brotli_many_small_chunks_never_stall() {
        let chunks: VecDeque<&'static [u8]> = std::iter::repeat_n(&b"ab"[..], 500).collect();
        let body = pin!(CompressionBody::compressed(Chunks(chunks), encoder(Codec::Brotli)));

        let wire = data_of(frames(body));
        let mut decoded = Vec::new();
        brotli::Decompressor::new(&wire[..], 4096)
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, b"ab".repeat(500));
    }

    #[test]
    fn test_trailers_follow_compressed_data() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-digest", "abc".parse().unwrap());
        let expected = trailers.clone();

        let inner = Full::new(Bytes::from_static(b"payload"))
            .with_trailers(async move { Some(Ok(trailers)) });
        let body = pin!(CompressionBody::compressed(inner, encoder(Codec::Gzip)));

        let mut frames = frames(body);
        let last = frames.pop().unwrap().unwrap();
        assert_eq!(last.into_trailers().unwrap(), expected);

        let mut decoded = String::new();
        flate2::read::GzDecoder::new(&data_of(frames)[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "payload");
    }

    #[test]
    fn test_inner_error_becomes_io_error() {
        let mut body = pin!(CompressionBody::compressed(Broken, encoder(Codec::Gzip)));

        let frames = frames(body.as_mut());
        assert_eq!(frames.len(), 1);
        let err = frames.into_iter().next().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "gone");
        assert!(body.is_end_stream());
    }
}
