use crate::codec::Encoder;
use crate::transport::{Event, Listener, Listeners, Transport, run};
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

/// Lifecycle of a [`CompressStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamState {
    /// Accepting input.
    Open,
    /// Input is complete; waiting for the transport to take the rest of the
    /// compressed output.
    Ending,
    /// The transport has been ended.
    Finished,
    /// The encoder failed; the transport has been ended.
    Failed,
}

/// A compressing stream whose output is written to a transport.
///
/// Compressed output goes straight to the transport until a write there
/// returns `false`. The stream then pauses, queueing further output, and only
/// resumes when the transport emits [`Event::Drain`]. While paused,
/// [`write`](Self::write) returns `false`; once the queue has been handed to
/// the transport the stream emits its own `drain` to its listeners.
pub(crate) struct CompressStream<T> {
    encoder: Encoder,
    transport: Rc<RefCell<T>>,
    pending: VecDeque<Bytes>,
    paused: bool,
    need_drain: bool,
    state: StreamState,
    listeners: Listeners,
}

impl<T: Transport + 'static> CompressStream<T> {
    /// Creates a stream compressing into `transport` and subscribes it to the
    /// transport's `drain` event.
    ///
    /// The transport must not be borrowed.
    pub(crate) fn new(encoder: Encoder, transport: Rc<RefCell<T>>) -> Rc<RefCell<Self>> {
        let stream = Rc::new(RefCell::new(Self {
            encoder,
            transport: transport.clone(),
            pending: VecDeque::new(),
            paused: false,
            need_drain: false,
            state: StreamState::Open,
            listeners: Listeners::new(),
        }));

        let weak = Rc::downgrade(&stream);
        transport.borrow_mut().on(
            Event::Drain,
            Box::new(move || {
                if let Some(stream) = weak.upgrade() {
                    Self::resume(&stream);
                }
            }),
        );

        stream
    }

    /// Compresses `chunk`. Returns `false` if the caller should wait for
    /// `drain` before writing more.
    pub(crate) fn write(this: &Rc<RefCell<Self>>, chunk: &[u8]) -> bool {
        let mut stream = this.borrow_mut();
        if stream.state != StreamState::Open {
            return false;
        }

        match stream.encoder.encode(chunk) {
            Ok(output) => stream.push(output),
            Err(e) => {
                stream.fail(e);
                return false;
            }
        }

        if stream.paused {
            stream.need_drain = true;
            false
        } else {
            true
        }
    }

    /// Compresses an optional final chunk and finishes the stream. The
    /// transport is ended once it has accepted all compressed output.
    pub(crate) fn end(this: &Rc<RefCell<Self>>, chunk: Option<&[u8]>) -> bool {
        let mut stream = this.borrow_mut();
        if stream.state != StreamState::Open {
            return false;
        }

        let encoded = match chunk {
            Some(chunk) => stream.encoder.encode(chunk),
            None => Ok(Bytes::new()),
        };
        let finished = encoded.and_then(|output| {
            stream.push(output);
            stream.encoder.finish()
        });

        match finished {
            Ok(output) => {
                stream.push(output);
                stream.state = StreamState::Ending;
                stream.end_transport_if_done();
                true
            }
            Err(e) => {
                stream.fail(e);
                false
            }
        }
    }

    /// Pushes everything compressed so far towards the transport.
    pub(crate) fn flush(this: &Rc<RefCell<Self>>) {
        let mut stream = this.borrow_mut();
        if stream.state != StreamState::Open {
            return;
        }

        match stream.encoder.flush() {
            Ok(output) => stream.push(output),
            Err(e) => stream.fail(e),
        }
    }

    /// Registers a listener on the stream itself.
    pub(crate) fn on(this: &Rc<RefCell<Self>>, event: Event, listener: Listener) {
        this.borrow_mut().listeners.on(event, listener);
    }

    /// Handles `drain` from the transport: hands over queued output and, if a
    /// writer was told to wait, lets it know it may continue.
    fn resume(this: &Rc<RefCell<Self>>) {
        let mut listeners = {
            let mut stream = this.borrow_mut();
            if !stream.paused || stream.state == StreamState::Failed {
                return;
            }

            tracing::trace!(queued = stream.pending.len(), "transport drained, resuming");
            stream.paused = false;
            while let Some(chunk) = stream.pending.pop_front() {
                if !stream.transport.borrow_mut().write(chunk) {
                    stream.pause();
                    return;
                }
            }

            stream.end_transport_if_done();
            if !stream.need_drain || stream.state != StreamState::Open {
                return;
            }
            stream.need_drain = false;
            stream.listeners.take(Event::Drain)
        };

        run(&mut listeners);
        this.borrow_mut().listeners.restore(Event::Drain, listeners);
    }

    /// Sends compressed output to the transport, or queues it while paused.
    fn push(&mut self, output: Bytes) {
        if output.is_empty() {
            return;
        }
        if self.paused {
            self.pending.push_back(output);
            return;
        }
        if !self.transport.borrow_mut().write(output) {
            self.pause();
        }
    }

    fn pause(&mut self) {
        tracing::trace!("transport backpressure, pausing compression");
        self.paused = true;
    }

    fn end_transport_if_done(&mut self) {
        if self.state == StreamState::Ending && !self.paused && self.pending.is_empty() {
            self.state = StreamState::Finished;
            self.transport.borrow_mut().end(None);
        }
    }

    fn fail(&mut self, error: io::Error) {
        tracing::error!(%error, codec = %self.encoder.codec(), "response compression failed");
        self.state = StreamState::Failed;
        self.pending.clear();
        self.transport.borrow_mut().end(None);
    }
}

impl<T> CompressStream<T> {
    pub(crate) fn state(&self) -> StreamState {
        self.state
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused
    }
}
