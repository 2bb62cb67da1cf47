//! Worker threads.
//!
//! Each worker owns one [`Multiplexer`] and a dedicated OS thread. The
//! acceptor hands it sockets through a channel and wakes it with the
//! multiplexer's notifier; from then on the socket is read and written by
//! that worker only.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::error::ServerError;
use crate::http::connection::{Connection, ConnectionError, Flow};
use crate::http::handler::Handler;
use crate::server::poller::{EVENT_CAPACITY, Event, EventKind, Interest, MAX_TAG, Multiplexer, Notify};

/// Decides which worker receives the next accepted connection.
pub trait AssignPolicy: Send {
    /// Returns an index below `workers`.
    fn pick(&mut self, workers: usize) -> usize;
}

/// Hands connections to workers in turn.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: usize,
}

impl AssignPolicy for RoundRobin {
    fn pick(&mut self, workers: usize) -> usize {
        let index = self.next % workers;
        self.next = (index + 1) % workers;
        index
    }
}

struct Slot<S> {
    conn: Connection<S>,
    peer: Option<SocketAddr>,
    interest: Interest,
}

pub struct Worker<M: Multiplexer> {
    id: usize,
    poller: M,
    inbox: Receiver<TcpStream>,
    handler: Arc<dyn Handler>,
    connections: HashMap<usize, Slot<M::Stream>>,
    next_tag: usize,
}

impl<M: Multiplexer> Worker<M> {
    pub fn new(id: usize, poller: M, inbox: Receiver<TcpStream>, handler: Arc<dyn Handler>) -> Self {
        Self {
            id,
            poller,
            inbox,
            handler,
            connections: HashMap::new(),
            next_tag: 0,
        }
    }

    /// Serves connections until the multiplexer fails.
    pub fn run(mut self) -> std::io::Result<()> {
        info!(worker = self.id, "worker started");
        let mut events = Vec::with_capacity(EVENT_CAPACITY);
        loop {
            self.poller.wait(&mut events, None)?;
            self.adopt_pending();
            for event in events.drain(..) {
                self.dispatch(event);
            }
        }
    }

    fn adopt_pending(&mut self) {
        while let Ok(stream) = self.inbox.try_recv() {
            self.adopt(stream);
        }
    }

    fn adopt(&mut self, stream: TcpStream) {
        let peer = stream.peer_addr().ok();
        let mut stream = match self.poller.adopt(stream) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(worker = self.id, peer = ?peer, error = %e, "could not prepare socket");
                return;
            }
        };

        let tag = self.next_tag();
        if let Err(e) = self.poller.register(&mut stream, tag, Interest::Read) {
            warn!(worker = self.id, peer = ?peer, error = %e, "could not register socket");
            return;
        }

        debug!(worker = self.id, peer = ?peer, tag, "connection registered");
        self.connections.insert(
            tag,
            Slot {
                conn: Connection::new(stream),
                peer,
                interest: Interest::Read,
            },
        );
    }

    fn next_tag(&mut self) -> usize {
        loop {
            let tag = self.next_tag;
            self.next_tag = (self.next_tag + 1) % MAX_TAG;
            if !self.connections.contains_key(&tag) {
                return tag;
            }
        }
    }

    fn dispatch(&mut self, event: Event) {
        // Tags of connections closed earlier in the same batch are skipped.
        let Some(slot) = self.connections.get_mut(&event.tag) else {
            return;
        };

        let result = match event.kind {
            EventKind::Close => Ok(Flow::Close),
            EventKind::Read | EventKind::Write => slot.conn.drive(self.handler.as_ref()),
        };

        let want = match result {
            Ok(Flow::Read) => Interest::Read,
            Ok(Flow::Write) => Interest::ReadWrite,
            Ok(Flow::Close) => return self.close(event.tag, None),
            Err(e) => return self.close(event.tag, Some(e)),
        };

        if slot.interest != want {
            if let Err(e) = self.poller.reregister(slot.conn.stream_mut(), event.tag, want) {
                return self.close(event.tag, Some(e.into()));
            }
            slot.interest = want;
        }
    }

    fn close(&mut self, tag: usize, err: Option<ConnectionError>) {
        let Some(mut slot) = self.connections.remove(&tag) else {
            return;
        };
        if let Err(e) = self.poller.deregister(slot.conn.stream_mut()) {
            debug!(worker = self.id, tag, error = %e, "deregister failed");
        }

        let served = slot.conn.served();
        match err {
            None => debug!(worker = self.id, peer = ?slot.peer, served, "connection closed"),
            Some(ConnectionError::UnexpectedEof) => {
                debug!(worker = self.id, peer = ?slot.peer, served, "peer left mid-request")
            }
            Some(e) => warn!(worker = self.id, peer = ?slot.peer, served, error = %e, "connection failed"),
        }
        // Dropping the slot closes the socket.
    }
}

struct WorkerHandle {
    sender: Sender<TcpStream>,
    notifier: Arc<dyn Notify>,
    _thread: JoinHandle<()>,
}

/// Fixed set of workers plus the policy that spreads connections over them.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    policy: Box<dyn AssignPolicy>,
}

impl WorkerPool {
    /// Starts `size` workers with round-robin assignment.
    pub fn spawn<M: Multiplexer>(size: usize, handler: Arc<dyn Handler>) -> Result<Self, ServerError> {
        Self::with_policy::<M>(size, handler, Box::new(RoundRobin::default()))
    }

    pub fn with_policy<M: Multiplexer>(
        size: usize,
        handler: Arc<dyn Handler>,
        policy: Box<dyn AssignPolicy>,
    ) -> Result<Self, ServerError> {
        if size == 0 {
            return Err(ServerError::Config("worker pool needs at least one worker".into()));
        }

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let poller = M::open().map_err(ServerError::Poller)?;
            let notifier = poller.notifier();
            let (sender, inbox) = channel::unbounded();
            let worker = Worker::new(id, poller, inbox, handler.clone());

            let thread = thread::Builder::new()
                .name(format!("lantern-worker-{id}"))
                .spawn(move || {
                    if let Err(e) = worker.run() {
                        error!(worker = id, error = %e, "worker stopped");
                    }
                })
                .map_err(ServerError::Spawn)?;

            workers.push(WorkerHandle {
                sender,
                notifier,
                _thread: thread,
            });
        }

        Ok(Self { workers, policy })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Hands an accepted socket to the next worker, returning its index.
    pub fn dispatch(&mut self, stream: TcpStream) -> Result<usize, ServerError> {
        let id = self.policy.pick(self.workers.len());
        let worker = &self.workers[id];
        worker
            .sender
            .send(stream)
            .map_err(|_| ServerError::WorkerGone(id))?;
        worker.notifier.notify().map_err(ServerError::Poller)?;
        Ok(id)
    }
}
