//! Inbound request parsing
//!
//! Turns a decoded JSON message into a validated [`Request`], or into the
//! error response the sender gets instead.

use serde_json::Value;

use crate::error::{ErrorBody, IdError};
use crate::journal::is_valid_key;

use super::{CommandType, Response};

/// A validated inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ask { mid: String, key: String, n: usize },
    Last { mid: Option<String>, key: String },
    Dump,

    /// An answer sent to the server; it never asks peers anything
    Answer { to: Option<String> },

    /// A protocol-level error reported by the peer
    PeerError(ErrorBody),

    Unknown { command: Option<String> },
}

impl Request {
    /// Validate a message; `max_batch` bounds `n` for `ask`
    pub fn parse(message: &Value, max_batch: usize) -> Result<Request, Response> {
        let command = message.get("command").and_then(Value::as_str);

        let Some(command) = command else {
            if let Some(error) = message.get("error") {
                if let Ok(body) = serde_json::from_value::<ErrorBody>(error.clone()) {
                    return Ok(Request::PeerError(body));
                }
            }
            return Ok(Request::Unknown {
                command: message.get("command").map(Value::to_string),
            });
        };

        match CommandType::from_name(command) {
            Some(CommandType::Ask) => Self::parse_ask(message, max_batch),
            Some(CommandType::Last) => Self::parse_last(message),
            Some(CommandType::Dump) => Ok(Request::Dump),
            Some(CommandType::Answer) => Ok(Request::Answer {
                to: message.get("to").and_then(Value::as_str).map(str::to_string),
            }),
            None => Ok(Request::Unknown {
                command: Some(command.to_string()),
            }),
        }
    }

    fn parse_ask(message: &Value, max_batch: usize) -> Result<Request, Response> {
        let mid = match string_field(message, "mid") {
            Some(mid) if !mid.is_empty() => mid,
            _ => {
                return Err(Response::answer_error(CommandType::Ask, None, &IdError::InvalidMid));
            }
        };

        let Some(key) = key_field(message) else {
            return Err(Response::answer_error(
                CommandType::Ask,
                Some(mid),
                &IdError::InvalidKey,
            ));
        };

        let n = message
            .get("n")
            .and_then(Value::as_u64)
            .filter(|&n| n <= max_batch as u64);
        let Some(n) = n else {
            return Err(Response::answer_error(
                CommandType::Ask,
                Some(mid),
                &IdError::InvalidCount,
            ));
        };

        Ok(Request::Ask {
            mid,
            key,
            n: n as usize,
        })
    }

    fn parse_last(message: &Value) -> Result<Request, Response> {
        let mid = string_field(message, "mid");
        match key_field(message) {
            Some(key) => Ok(Request::Last { mid, key }),
            None => Err(Response::answer_error(
                CommandType::Last,
                mid,
                &IdError::InvalidKey,
            )),
        }
    }
}

fn string_field(message: &Value, name: &str) -> Option<String> {
    message.get(name).and_then(Value::as_str).map(str::to_string)
}

fn key_field(message: &Value) -> Option<String> {
    string_field(message, "key").filter(|key| is_valid_key(key))
}
