//! The push-style response transport that [`CompressedResponse`] decorates.
//!
//! [`CompressedResponse`]: crate::CompressedResponse

use bytes::Bytes;
use http::HeaderMap;
use std::fmt;
use std::mem;

/// Events a transport (or a compressing stream) can signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// The sink can accept more data after a write returned `false`.
    Drain,
    /// All data has been flushed to the underlying system.
    Finish,
    /// The underlying connection was closed.
    Close,
    /// The transport failed.
    Error,
}

/// A registered event callback. Listeners stay registered and run on every
/// emission of their event.
pub type Listener = Box<dyn FnMut()>;

/// A writable HTTP response.
///
/// Writes follow the usual backpressure contract: `false` from
/// [`write`](Self::write) means the caller should wait for [`Event::Drain`]
/// before writing more. Implementations must invoke listeners without holding
/// a borrow of themselves, since a listener may write to the transport again.
pub trait Transport {
    /// Returns the response headers.
    fn headers(&self) -> &HeaderMap;

    /// Returns the response headers for modification. Changes made after the
    /// head has been sent have no effect on the wire.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Returns whether the response head has been sent.
    fn headers_sent(&self) -> bool;

    /// Sends the response head.
    fn write_head(&mut self);

    /// Writes a body chunk, returning `false` if the caller should wait for
    /// [`Event::Drain`].
    fn write(&mut self, chunk: Bytes) -> bool;

    /// Writes an optional final chunk and ends the response.
    fn end(&mut self, chunk: Option<Bytes>) -> bool;

    /// Registers a listener for `event`.
    fn on(&mut self, event: Event, listener: Listener);
}

/// A registry of event listeners.
///
/// Emission is split into [`take`](Self::take) and [`restore`](Self::restore)
/// so the listeners can run while their owner is not borrowed.
#[derive(Default)]
pub struct Listeners {
    entries: Vec<(Event, Listener)>,
}

impl Listeners {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for `event`.
    pub fn on(&mut self, event: Event, listener: Listener) {
        self.entries.push((event, listener));
    }

    /// Returns the number of listeners registered for `event`.
    pub fn count(&self, event: Event) -> usize {
        self.entries.iter().filter(|(e, _)| *e == event).count()
    }

    /// Removes and returns the listeners for `event`, in registration order.
    pub fn take(&mut self, event: Event) -> Vec<Listener> {
        let (taken, kept) = mem::take(&mut self.entries)
            .into_iter()
            .partition::<Vec<_>, _>(|(e, _)| *e == event);
        self.entries = kept;
        taken.into_iter().map(|(_, listener)| listener).collect()
    }

    /// Puts back listeners previously returned by [`take`](Self::take), ahead
    /// of any registered for `event` in the meantime.
    pub fn restore(&mut self, event: Event, listeners: Vec<Listener>) {
        let restored = listeners.into_iter().map(|listener| (event, listener));
        let newer = mem::take(&mut self.entries);
        self.entries = restored.chain(newer).collect();
    }

    /// Runs every listener for `event` in place.
    ///
    /// Only usable when the listeners cannot reach back into the owner of this
    /// registry; otherwise use [`take`](Self::take) and
    /// [`restore`](Self::restore).
    pub fn emit(&mut self, event: Event) {
        for (_, listener) in self.entries.iter_mut().filter(|(e, _)| *e == event) {
            listener();
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(event, _)| event))
            .finish()
    }
}

/// Runs `listeners` in order.
pub(crate) fn run(listeners: &mut [Listener]) {
    for listener in listeners {
        listener();
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! An in-memory transport for tests.

    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records everything written and simulates a socket with a bounded
    /// buffer.
    #[derive(Debug, Default)]
    pub(crate) struct MockTransport {
        pub(crate) headers: HeaderMap,
        pub(crate) head_written: bool,
        pub(crate) head_snapshot: Option<HeaderMap>,
        pub(crate) body: Vec<u8>,
        pub(crate) writes: usize,
        pub(crate) ended: bool,
        /// Writes return `false` once this many bytes are buffered.
        pub(crate) capacity: Option<usize>,
        pub(crate) buffered: usize,
        pub(crate) listeners: Listeners,
    }

    impl MockTransport {
        pub(crate) fn new() -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self::default()))
        }

        pub(crate) fn with_capacity(capacity: usize) -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self {
                capacity: Some(capacity),
                ..Self::default()
            }))
        }

        /// Empties the simulated socket buffer and emits `drain`.
        pub(crate) fn drain(this: &Rc<RefCell<Self>>) {
            Self::emit(this, Event::Drain, |t| t.buffered = 0);
        }

        pub(crate) fn close(this: &Rc<RefCell<Self>>) {
            Self::emit(this, Event::Close, |_| {});
        }

        fn emit(this: &Rc<RefCell<Self>>, event: Event, before: impl FnOnce(&mut Self)) {
            let mut listeners = {
                let mut transport = this.borrow_mut();
                before(&mut transport);
                transport.listeners.take(event)
            };
            run(&mut listeners);
            this.borrow_mut().listeners.restore(event, listeners);
        }

        fn accept(&mut self, chunk: &[u8]) -> bool {
            if !self.head_written {
                self.write_head();
            }
            self.body.extend_from_slice(chunk);
            self.writes += 1;
            self.buffered += chunk.len();
            self.capacity.is_none_or(|cap| self.buffered < cap)
        }
    }

    impl Transport for MockTransport {
        fn headers(&self) -> &HeaderMap {
            &self.headers
        }

        fn headers_mut(&mut self) -> &mut HeaderMap {
            &mut self.headers
        }

        fn headers_sent(&self) -> bool {
            self.head_written
        }

        fn write_head(&mut self) {
            if !self.head_written {
                self.head_written = true;
                self.head_snapshot = Some(self.headers.clone());
            }
        }

        fn write(&mut self, chunk: Bytes) -> bool {
            assert!(!self.ended, "write after end");
            self.accept(&chunk)
        }

        fn end(&mut self, chunk: Option<Bytes>) -> bool {
            assert!(!self.ended, "end after end");
            if let Some(chunk) = chunk {
                self.accept(&chunk);
            } else if !self.head_written {
                self.write_head();
            }
            self.ended = true;
            true
        }

        fn on(&mut self, event: Event, listener: Listener) {
            self.listeners.on(event, listener);
        }
    }
}
