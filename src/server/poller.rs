//! Readiness notification.
//!
//! Workers only talk to the OS through [`Multiplexer`], so the same worker
//! loop runs on top of any readiness facility. [`MioPoller`] is the default
//! backend (epoll on Linux, kqueue on the BSDs).
//!
//! Notifications are edge-triggered: after a [`EventKind::Read`] the caller
//! must keep reading until the socket reports would-block, or it may never
//! hear about that socket again.

use std::io;
use std::net::TcpStream as StdTcpStream;
use std::sync::Arc;
use std::time::Duration;

use mio::net::TcpStream;
use mio::{Events, Poll, Token, Waker};

/// Events fetched per wait call.
pub const EVENT_CAPACITY: usize = 128;

/// Reserved for the cross-thread waker; connection tags stay below it.
pub const MAX_TAG: usize = usize::MAX;
const WAKE_TOKEN: Token = Token(MAX_TAG);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Read,
    Write,
    /// Peer hung up or the socket is in an error state.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub tag: usize,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    ReadWrite,
}

/// Interrupts a blocked [`Multiplexer::wait`] from another thread.
pub trait Notify: Send + Sync {
    fn notify(&self) -> io::Result<()>;
}

pub trait Multiplexer: Send + Sized + 'static {
    type Stream: io::Read + io::Write + Send;

    fn open() -> io::Result<Self>;

    /// Switches an accepted socket to non-blocking mode and wraps it for
    /// registration.
    fn adopt(&self, stream: StdTcpStream) -> io::Result<Self::Stream>;

    fn register(&mut self, stream: &mut Self::Stream, tag: usize, interest: Interest)
    -> io::Result<()>;

    fn reregister(
        &mut self,
        stream: &mut Self::Stream,
        tag: usize,
        interest: Interest,
    ) -> io::Result<()>;

    fn deregister(&mut self, stream: &mut Self::Stream) -> io::Result<()>;

    fn notifier(&self) -> Arc<dyn Notify>;

    /// Blocks until at least one registered socket is ready, a notifier
    /// fires or the timeout elapses, then replaces `events` with what is
    /// ready.
    fn wait(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()>;
}

pub struct MioPoller {
    poll: Poll,
    events: Events,
    waker: Arc<Waker>,
}

impl Notify for Waker {
    fn notify(&self) -> io::Result<()> {
        self.wake()
    }
}

impl From<Interest> for mio::Interest {
    fn from(interest: Interest) -> Self {
        match interest {
            Interest::Read => mio::Interest::READABLE,
            Interest::ReadWrite => mio::Interest::READABLE.add(mio::Interest::WRITABLE),
        }
    }
}

impl Multiplexer for MioPoller {
    type Stream = TcpStream;

    fn open() -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        Ok(Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            waker,
        })
    }

    fn adopt(&self, stream: StdTcpStream) -> io::Result<TcpStream> {
        stream.set_nonblocking(true)?;
        Ok(TcpStream::from_std(stream))
    }

    fn register(&mut self, stream: &mut TcpStream, tag: usize, interest: Interest) -> io::Result<()> {
        self.poll
            .registry()
            .register(stream, Token(tag), interest.into())
    }

    fn reregister(
        &mut self,
        stream: &mut TcpStream,
        tag: usize,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll
            .registry()
            .reregister(stream, Token(tag), interest.into())
    }

    fn deregister(&mut self, stream: &mut TcpStream) -> io::Result<()> {
        self.poll.registry().deregister(stream)
    }

    fn notifier(&self) -> Arc<dyn Notify> {
        self.waker.clone()
    }

    fn wait(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()> {
        events.clear();
        loop {
            match self.poll.poll(&mut self.events, timeout) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other?,
            }
        }

        for ev in self.events.iter() {
            if ev.token() == WAKE_TOKEN {
                continue;
            }
            let tag = ev.token().0;
            if ev.is_error() {
                events.push(Event { tag, kind: EventKind::Close });
                continue;
            }
            // Readable data is handed out even when the peer already hung
            // up; the read that returns EOF closes the connection.
            if ev.is_writable() {
                events.push(Event { tag, kind: EventKind::Write });
            }
            if ev.is_readable() {
                events.push(Event { tag, kind: EventKind::Read });
            } else if !ev.is_writable() && (ev.is_read_closed() || ev.is_write_closed()) {
                events.push(Event { tag, kind: EventKind::Close });
            }
        }
        Ok(())
    }
}
