use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, error, info, trace};

use crate::config::Config;
use crate::error::ServerError;
use crate::http::handler::Handler;
use crate::server::poller::{MioPoller, Multiplexer};
use crate::server::worker::WorkerPool;

/// The acceptor: a listening socket plus the worker pool it feeds.
pub struct Server {
    listener: TcpListener,
    pool: WorkerPool,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the configured address and starts the workers.
    pub fn bind<H: Handler>(cfg: &Config, handler: H) -> Result<Self, ServerError> {
        Self::bind_with::<MioPoller, H>(cfg, handler)
    }

    /// Like [`Server::bind`], with an explicit readiness backend.
    pub fn bind_with<M: Multiplexer, H: Handler>(
        cfg: &Config,
        handler: H,
    ) -> Result<Self, ServerError> {
        cfg.validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        let listener = open_listener(&cfg.listen_addr, cfg.backlog)?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: cfg.listen_addr.clone(),
            source,
        })?;

        let pool = WorkerPool::spawn::<M>(cfg.workers, Arc::new(handler))?;
        info!(addr = %local_addr, workers = pool.len(), "listening");

        Ok(Self {
            listener,
            pool,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections forever. Only returns on a fatal error.
    pub fn run(mut self) -> ServerError {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    return ServerError::Accept(e);
                }
            };
            debug!(peer = %peer, "accepted connection");

            match self.pool.dispatch(stream) {
                Ok(worker) => trace!(peer = %peer, worker, "assigned connection"),
                Err(e) => {
                    error!(error = %e, "could not hand off connection");
                    return e;
                }
            }
        }
    }
}

/// Binds `cfg.listen_addr`, runs the server and returns the error that
/// stopped it.
pub fn serve<H: Handler>(cfg: &Config, handler: H) -> ServerError {
    match Server::bind(cfg, handler) {
        Ok(server) => server.run(),
        Err(e) => e,
    }
}

/// Resolves `addr` and binds the first address that accepts a listener.
pub fn open_listener(addr: &str, backlog: i32) -> Result<TcpListener, ServerError> {
    let candidates = addr.to_socket_addrs().map_err(|source| ServerError::Resolve {
        addr: addr.to_owned(),
        source,
    })?;

    let mut last_err = None;
    for candidate in candidates {
        match bind_socket(candidate, backlog) {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                debug!(addr = %candidate, error = %e, "bind attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(ServerError::Bind {
        addr: addr.to_owned(),
        source: last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "address resolved to nothing")
        }),
    })
}

fn bind_socket(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    Ok(socket.into())
}
