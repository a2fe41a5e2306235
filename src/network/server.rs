//! TCP Server
//!
//! Accepts connections and hands each one to its own thread.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::engine::Engine;
use crate::error::{IdError, Result};

use super::{Clock, Connection, ConnectionRegistry, SystemClock};

/// How long the accept loop sleeps when no connection is pending
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Flag the accept loop watches; cloneable across threads
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    /// Ask the server to stop accepting and close its clients
    pub fn shutdown(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// TCP server for the ID service
pub struct Server {
    config: Config,
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<ConnectionRegistry>,
    shutdown: ShutdownHandle,

    /// Connection threads still running
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Server {
    /// Bind the listen address from `config`
    pub fn bind(config: Config, engine: Arc<Engine>) -> Result<Self> {
        Self::bind_with_clock(config, engine, Arc::new(SystemClock))
    }

    /// Bind with an explicit clock for connection bookkeeping
    pub fn bind_with_clock(config: Config, engine: Arc<Engine>, clock: Arc<dyn Clock>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            IdError::Network(format!("cannot listen on {}: {}", config.listen_addr, e))
        })?;
        listener.set_nonblocking(true)?;

        let registry = Arc::new(ConnectionRegistry::new(clock));
        let dispatcher = Arc::new(Dispatcher::new(engine, Arc::clone(&registry)));

        Ok(Self {
            config,
            listener,
            dispatcher,
            registry,
            shutdown: ShutdownHandle::default(),
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until shutdown is requested (blocking)
    ///
    /// Returns once every connection thread has finished, so nothing spawned
    /// by the server still holds the engine.
    pub fn run(&self) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, "server listening");

        while !self.shutdown.is_shutdown() {
            match self.listener.accept() {
                Ok((stream, peer)) => self.spawn_connection(stream, peer),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.reap_workers();
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            }
        }

        tracing::info!(clients = self.registry.len(), "server shutting down");
        self.registry.close_all();

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("connection thread panicked");
            }
        }
        Ok(())
    }

    fn reap_workers(&self) {
        self.workers.lock().retain(|worker| !worker.is_finished());
    }

    /// Register the client, then serve it on its own thread
    ///
    /// Registration happens here on the accept thread, so the limit check
    /// and the registry insert cannot interleave with another accept.
    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        if self.registry.len() >= self.config.max_connections {
            tracing::warn!(
                peer = %peer,
                max = self.config.max_connections,
                "connection limit reached, refusing client"
            );
            return;
        }

        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!(peer = %peer, error = %e, "cannot configure client socket");
            return;
        }

        let mut connection = match Connection::new(
            stream,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.registry),
        ) {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "failed to set up connection");
                return;
            }
        };
        let client = connection.id();

        // On spawn failure the closure is dropped, and the connection's Drop
        // unregisters it.
        let spawned = thread::Builder::new()
            .name(format!("idserver-conn-{}", client))
            .spawn(move || {
                if let Err(e) = connection.handle() {
                    tracing::debug!(
                        client = %connection.id(),
                        peer = connection.peer_addr(),
                        error = %e,
                        "connection ended with error"
                    );
                }
            });

        match spawned {
            Ok(worker) => self.workers.lock().push(worker),
            Err(e) => tracing::error!(client = %client, error = %e, "failed to spawn connection thread"),
        }
    }
}
