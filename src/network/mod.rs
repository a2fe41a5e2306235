//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread
//! - One thread per connection
//! - Messages routed through the Dispatcher
//! - Connection Registry tracks who is connected

mod connection;
mod registry;
mod server;

pub use connection::Connection;
pub use registry::{ClientId, ClientInfo, Clock, ConnectionRegistry, SystemClock};
pub use server::{Server, ShutdownHandle};
