//! The accept/event loop.
//!
//! One thread owns the poller, the listening socket, and the fd-keyed
//! connection table; workers only ever see `Arc<Mutex<Connection>>` clones
//! handed to them one turn at a time. The mutex is the type-level witness
//! of an exclusivity the one-shot registration already enforces, so it is
//! uncontended by construction.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};
use std::sync::{Arc, Mutex, TryLockError};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::http::connection::{self, Connection};
use crate::server::poller::{Event, Poller};
use crate::server::workers::WorkerPool;

pub struct Server {
    listener: TcpListener,
    poller: Arc<Poller>,
    cfg: Arc<Config>,
    connections: HashMap<RawFd, Arc<Mutex<Connection>>>,
}

impl Server {
    /// Binds the listening socket and registers it with a fresh poller.
    pub fn bind(cfg: Config) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&cfg.server.listen_addr)
            .with_context(|| format!("binding {}", cfg.server.listen_addr))?;
        listener.set_nonblocking(true)?;

        let poller = Poller::new().context("creating the epoll instance")?;
        poller.add_listener(listener.as_raw_fd())?;

        Ok(Self {
            listener,
            poller: Arc::new(poller),
            cfg: Arc::new(cfg),
            connections: HashMap::new(),
        })
    }

    /// The bound address; useful when the configured port was 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the event loop until the process exits.
    pub fn run(mut self) -> anyhow::Result<()> {
        let pool = WorkerPool::new(self.cfg.server.workers)?;
        info!("Listening on {}", self.listener.local_addr()?);

        let listen_fd = self.listener.as_raw_fd();
        let mut events = Vec::new();
        loop {
            self.poller.wait(&mut events, None)?;
            for event in &events {
                if event.fd == listen_fd {
                    self.accept_ready();
                } else {
                    self.dispatch(event, &pool);
                }
            }
            self.sweep_closed();
        }
    }

    /// Accepts until the listener reports would-block; mandatory under
    /// edge-triggered notification.
    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if connection::active_connections() >= self.cfg.server.max_connections {
                        warn!("connection limit reached, dropping {}", peer);
                        continue;
                    }
                    info!("Accepted connection from {}", peer);
                    let fd = stream.into_raw_fd();
                    match Connection::open(fd, peer, Arc::clone(&self.poller), Arc::clone(&self.cfg))
                    {
                        Ok(conn) => {
                            // A reused fd number replaces its stale entry.
                            self.connections.insert(fd, Arc::new(Mutex::new(conn)));
                        }
                        Err(e) => warn!("failed to register {}: {}", peer, e),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Hands one readiness turn to the pool. No further event fires for
    /// this fd until the turn re-arms it, so turns never overlap.
    fn dispatch(&self, event: &Event, pool: &WorkerPool) {
        let Some(conn) = self.connections.get(&event.fd) else {
            debug!("event for unknown fd {}", event.fd);
            return;
        };
        let conn = Arc::clone(conn);
        let event = *event;

        pool.execute(move || {
            let Ok(mut conn) = conn.lock() else {
                return;
            };
            if conn.is_closed() {
                return;
            }
            if event.hangup {
                conn.close();
            } else if event.readable {
                conn.on_readable();
            } else if event.writable {
                conn.on_writable();
            }
        });
    }

    /// Drops table entries whose connection has fully closed. Entries a
    /// worker is still holding are kept for the next sweep.
    fn sweep_closed(&mut self) {
        self.connections.retain(|_, conn| match conn.try_lock() {
            Ok(conn) => !conn.is_closed(),
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(_)) => false,
        });
    }
}
