use crate::codec::Codec;
use crate::config::Config;
use crate::negotiate::negotiate;
use crate::stream::CompressStream;
use crate::transport::{Event, Listener, Transport};
use bytes::Bytes;
use http::{HeaderMap, Request, header};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::sync::Arc;

/// Where a response stands with respect to compression.
enum Stage<T> {
    /// The head has not been sent yet. `drain` listeners wait here until it
    /// is known which stream they belong to.
    Undecided { listeners: Vec<Listener> },
    /// Sent as is.
    Identity,
    /// Body bytes flow through a compressing stream.
    Compressing {
        codec: Codec,
        stream: Rc<RefCell<CompressStream<T>>>,
    },
}

/// A response transport that transparently compresses its body.
///
/// Created by [`CompressionLayer::intercept`](crate::CompressionLayer::intercept).
/// Use it exactly like the wrapped transport: set headers, then
/// [`write`](Self::write) and [`end`](Self::end). Whether to compress is
/// decided once, when the response head is sent, either explicitly through
/// [`write_head`](Self::write_head) or implicitly by the first write or end.
pub struct CompressedResponse<T> {
    transport: Rc<RefCell<T>>,
    request: Request<()>,
    config: Arc<Config>,
    stage: Stage<T>,
    /// Body length estimated from a lone `end(chunk)`.
    length: Option<u64>,
    ended: bool,
}

impl<T: Transport + 'static> CompressedResponse<T> {
    pub(crate) fn new(request: Request<()>, transport: Rc<RefCell<T>>, config: Arc<Config>) -> Self {
        // Too late to change anything once the head is out.
        let stage = if transport.borrow().headers_sent() {
            Stage::Identity
        } else {
            Stage::Undecided {
                listeners: Vec::new(),
            }
        };

        Self {
            transport,
            request,
            config,
            stage,
            length: None,
            ended: false,
        }
    }

    /// Returns the response headers.
    pub fn headers(&self) -> Ref<'_, HeaderMap> {
        Ref::map(self.transport.borrow(), |t| t.headers())
    }

    /// Returns the response headers for modification.
    pub fn headers_mut(&mut self) -> RefMut<'_, HeaderMap> {
        RefMut::map(self.transport.borrow_mut(), |t| t.headers_mut())
    }

    /// Returns whether the response head has been sent.
    pub fn headers_sent(&self) -> bool {
        self.transport.borrow().headers_sent()
    }

    /// Decides on compression and sends the response head.
    ///
    /// If the head already went out through the transport itself, there is
    /// nothing left to decide and the body is sent as is.
    pub fn write_head(&mut self) {
        if self.headers_sent() {
            self.bypass();
            return;
        }
        self.decide();
        self.transport.borrow_mut().write_head();
    }

    /// Writes a body chunk.
    ///
    /// Returns `false` if the caller should wait for [`Event::Drain`] before
    /// writing more, or if the response has already ended.
    pub fn write(&mut self, chunk: impl Into<Bytes>) -> bool {
        if self.ended {
            return false;
        }
        self.write_head();

        let chunk = chunk.into();
        match &self.stage {
            Stage::Compressing { stream, .. } => CompressStream::write(stream, &chunk),
            _ => self.transport.borrow_mut().write(chunk),
        }
    }

    /// Writes an optional final chunk and ends the response.
    ///
    /// When this is the first call to touch the body and no `Content-Length`
    /// is set, the chunk's size stands in for the body length. Returns
    /// `false` if the response had already ended.
    pub fn end(&mut self, chunk: Option<Bytes>) -> bool {
        if self.ended {
            return false;
        }

        if !self.headers_sent() && !self.headers().contains_key(header::CONTENT_LENGTH) {
            self.length = Some(chunk.as_ref().map_or(0, |c| c.len() as u64));
        }
        self.write_head();

        self.ended = true;
        match &self.stage {
            Stage::Compressing { stream, .. } => CompressStream::end(stream, chunk.as_deref()),
            _ => self.transport.borrow_mut().end(chunk),
        }
    }

    /// Pushes any compressed bytes held by the encoder to the transport.
    /// Does nothing unless the response is being compressed.
    pub fn flush(&mut self) {
        if let Stage::Compressing { stream, .. } = &self.stage {
            CompressStream::flush(stream);
        }
    }

    /// Registers a listener.
    ///
    /// `drain` listeners follow the body: registered before the head is sent
    /// they are held back, then attached to whichever stream the body ends
    /// up flowing through. Every other event goes straight to the transport.
    pub fn on(&mut self, event: Event, listener: Listener) {
        if event != Event::Drain {
            self.transport.borrow_mut().on(event, listener);
            return;
        }

        match &mut self.stage {
            Stage::Undecided { listeners } => listeners.push(listener),
            Stage::Compressing { stream, .. } => CompressStream::on(stream, event, listener),
            Stage::Identity => self.transport.borrow_mut().on(event, listener),
        }
    }

    /// Returns the codec compressing the body, if any.
    pub fn codec(&self) -> Option<Codec> {
        match &self.stage {
            Stage::Compressing { codec, .. } => Some(*codec),
            _ => None,
        }
    }

    /// Returns whether the response has ended.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Runs the one-shot compression decision.
    fn decide(&mut self) {
        let Stage::Undecided { listeners } = mem::replace(&mut self.stage, Stage::Identity) else {
            return;
        };

        let codec = {
            let mut transport = self.transport.borrow_mut();
            negotiate(
                &self.request,
                transport.headers_mut(),
                self.length.take(),
                &self.config,
            )
        };

        match codec {
            Some(codec) => {
                let stream = CompressStream::new(codec.encoder(&self.config), self.transport.clone());
                for listener in listeners {
                    CompressStream::on(&stream, Event::Drain, listener);
                }
                self.stage = Stage::Compressing { codec, stream };
            }
            None => self.replay_onto_transport(listeners),
        }
    }

    /// Leaves the undecided stage without negotiating.
    fn bypass(&mut self) {
        if let Stage::Undecided { listeners } = &mut self.stage {
            let listeners = mem::take(listeners);
            self.stage = Stage::Identity;
            self.replay_onto_transport(listeners);
        }
    }

    fn replay_onto_transport(&self, listeners: Vec<Listener>) {
        let mut transport = self.transport.borrow_mut();
        for listener in listeners {
            transport.on(Event::Drain, listener);
        }
    }
}

impl<T> fmt::Debug for CompressedResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match &self.stage {
            Stage::Undecided { .. } => "undecided",
            Stage::Identity => "identity",
            Stage::Compressing { codec, .. } => codec.content_encoding(),
        };
        f.debug_struct("CompressedResponse")
            .field("method", self.request.method())
            .field("stage", &stage)
            .field("ended", &self.ended)
            .finish()
    }
}
