//! Command Dispatcher
//!
//! Validates inbound messages and routes them to the engine. Holds no
//! per-message state; each message gets at most one response.

use std::sync::Arc;

use serde_json::Value;

use crate::engine::Engine;
use crate::error::IdError;
use crate::network::{ClientId, ConnectionRegistry};
use crate::protocol::{CommandType, DumpStats, Request, Response};

/// Routes protocol messages to the engine
pub struct Dispatcher {
    engine: Arc<Engine>,
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(engine: Arc<Engine>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { engine, registry }
    }

    /// Handle one raw message from `client`
    ///
    /// Messages that are not valid JSON are logged and dropped.
    pub fn handle_frame(&self, client: ClientId, payload: &[u8]) -> Option<Response> {
        match serde_json::from_slice::<Value>(payload) {
            Ok(message) => self.dispatch(client, &message),
            Err(e) => {
                tracing::warn!(
                    client = %client,
                    error = %e,
                    original = %String::from_utf8_lossy(payload),
                    "client sent invalid JSON"
                );
                None
            }
        }
    }

    /// Handle one decoded message from `client`
    pub fn dispatch(&self, client: ClientId, message: &Value) -> Option<Response> {
        let request = match Request::parse(message, self.engine.config().max_batch) {
            Ok(request) => request,
            Err(rejection) => return Some(rejection),
        };

        let response = match request {
            Request::Ask { mid, key, n } => match self.engine.allocate(&key, n) {
                Ok(ids) => Response::ids(mid, ids),
                Err(e) => {
                    tracing::error!(client = %client, key = %key, n, error = %e, "error asking for ids");
                    Response::answer_error(CommandType::Ask, Some(mid), &e)
                }
            },

            Request::Last { mid, key } => match self.engine.current_value(&key) {
                Ok(id) => Response::last(mid, id),
                Err(e) => {
                    tracing::error!(client = %client, key = %key, error = %e, "error getting last id");
                    Response::answer_error(CommandType::Last, mid, &e)
                }
            },

            Request::Dump => {
                let stats = self.engine.stats();
                Response::dump(DumpStats {
                    keys: stats.keys,
                    dirty: stats.dirty,
                    clients: self.registry.len(),
                })
            }

            Request::Answer { to } => {
                tracing::warn!(client = %client, to = ?to, "answer to a command never sent");
                Response::fault(&IdError::UnknownAnswer(to))
            }

            Request::PeerError(body) => {
                tracing::warn!(
                    client = %client,
                    code = %body.code,
                    description = %body.description,
                    "client reported an error"
                );
                return None;
            }

            Request::Unknown { command } => {
                tracing::warn!(client = %client, command = ?command, "unknown command");
                Response::fault(&IdError::UnknownCommand(command))
            }
        };

        Some(response)
    }
}
