//! Command definitions
//!
//! Commands as a client puts them on the wire.

use serde::Serialize;

/// Command names understood by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Ask,
    Last,
    Dump,
    Answer,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Ask => "ask",
            CommandType::Last => "last",
            CommandType::Dump => "dump",
            CommandType::Answer => "answer",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ask" => Some(CommandType::Ask),
            "last" => Some(CommandType::Last),
            "dump" => Some(CommandType::Dump),
            "answer" => Some(CommandType::Answer),
            _ => None,
        }
    }
}

/// An outbound command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Command {
    /// Ask for `n` new IDs of `key`
    Ask { mid: String, key: String, n: usize },

    /// Ask for the current value of `key`
    Last { mid: String, key: String },

    /// Ask for server introspection
    Dump,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Ask { .. } => CommandType::Ask,
            Command::Last { .. } => CommandType::Last,
            Command::Dump => CommandType::Dump,
        }
    }

    /// Request ID the answer will carry
    pub fn mid(&self) -> Option<&str> {
        match self {
            Command::Ask { mid, .. } | Command::Last { mid, .. } => Some(mid),
            Command::Dump => None,
        }
    }
}
