//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::error::{IdError, Result};
use crate::protocol::{read_frame, write_message, Response};

use super::{ClientId, ConnectionRegistry};

/// Handles a single client connection
pub struct Connection {
    /// Identity assigned by the registry
    id: ClientId,

    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Routes messages to the engine
    dispatcher: Arc<Dispatcher>,

    /// Where this connection is registered
    registry: Arc<ConnectionRegistry>,

    /// Peer address for logging
    peer_addr: String,

    /// Set once the connection has been torn down
    closed: bool,
}

impl Connection {
    /// Create a new connection handler and register it
    pub fn new(
        stream: TcpStream,
        dispatcher: Arc<Dispatcher>,
        registry: Arc<ConnectionRegistry>,
    ) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;
        let control_stream = stream.try_clone().ok();
        let write_stream = stream;

        let id = registry.register(peer_addr.clone(), control_stream);
        tracing::info!(client = %id, peer = %peer_addr, "client connected");

        Ok(Self {
            id,
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            dispatcher,
            registry,
            peer_addr,
            closed: false,
        })
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads messages in a loop and sends responses. Returns when the client
    /// disconnects or an error occurs; the connection is torn down either way.
    pub fn handle(&mut self) -> Result<()> {
        let result = self.serve();
        self.close();
        result
    }

    fn serve(&mut self) -> Result<()> {
        loop {
            let payload = match read_frame(&mut self.reader) {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    tracing::debug!(client = %self.id, "end of stream");
                    return Ok(());
                }
                Err(e) if is_disconnect(&e) => {
                    tracing::debug!(client = %self.id, error = %e, "connection dropped by client");
                    return Ok(());
                }
                Err(e @ IdError::Protocol(_)) => {
                    tracing::warn!(client = %self.id, error = %e, "unrecoverable stream error");
                    let _ = self.send(&Response::fault(&e));
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(client = %self.id, error = %e, "connection error");
                    return Err(e);
                }
            };

            self.registry.touch(self.id);

            let Some(response) = self.dispatcher.handle_frame(self.id, &payload) else {
                continue;
            };

            if let Err(e) = self.send(&response) {
                // The client went away before the answer; the work is done
                // and the reply is simply dropped.
                if is_disconnect(&e) {
                    tracing::debug!(client = %self.id, error = %e, "client disconnected before response could be sent");
                    return Ok(());
                }
                tracing::warn!(client = %self.id, error = %e, "error writing to client");
                return Err(e);
            }
        }
    }

    /// Send a response to the client
    fn send(&mut self, response: &Response) -> Result<()> {
        write_message(&mut self.writer, response)
    }

    /// Tear the connection down; later calls do nothing
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
        self.registry.remove(self.id);
        tracing::info!(client = %self.id, peer = %self.peer_addr, "client has disconnected");
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_disconnect(e: &IdError) -> bool {
    match e {
        IdError::Io(io_err) => matches!(
            io_err.kind(),
            ErrorKind::UnexpectedEof
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::NotConnected
        ),
        _ => false,
    }
}
