//! Connection registry
//!
//! Bookkeeping for connected clients: identity, connect time and last
//! activity. Nothing here evicts idle clients.

use std::collections::HashMap;
use std::fmt;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

/// Source of wall-clock time for connection bookkeeping
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Identity of one client connection, unique for the registry's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// What is known about a connected client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: ClientId,
    pub peer_addr: String,
    pub connected_at: SystemTime,
    pub last_activity: SystemTime,
}

struct Entry {
    info: ClientInfo,

    /// Handle used to force the socket closed on server shutdown
    stream: Option<TcpStream>,
}

/// Registry of live connections
pub struct ConnectionRegistry {
    clients: Mutex<HashMap<ClientId, Entry>>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl ConnectionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            clock,
        }
    }

    /// Register a new connection and hand out its identity
    pub fn register(&self, peer_addr: impl Into<String>, stream: Option<TcpStream>) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let now = self.clock.now();
        let info = ClientInfo {
            id,
            peer_addr: peer_addr.into(),
            connected_at: now,
            last_activity: now,
        };
        self.clients.lock().insert(id, Entry { info, stream });
        id
    }

    /// Record activity on a connection
    pub fn touch(&self, id: ClientId) {
        let now = self.clock.now();
        if let Some(entry) = self.clients.lock().get_mut(&id) {
            entry.info.last_activity = now;
        }
    }

    /// Forget a connection; `false` if it was already gone
    pub fn remove(&self, id: ClientId) -> bool {
        self.clients.lock().remove(&id).is_some()
    }

    pub fn get(&self, id: ClientId) -> Option<ClientInfo> {
        self.clients.lock().get(&id).map(|entry| entry.info.clone())
    }

    /// Shut down every registered socket; their handlers then tear down
    pub fn close_all(&self) {
        for entry in self.clients.lock().values() {
            if let Some(stream) = &entry.stream {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
