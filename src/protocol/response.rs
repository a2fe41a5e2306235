//! Response definitions
//!
//! Messages the server sends back: answers to a command, or a bare
//! protocol-level error.

use serde::{Deserialize, Serialize};

use crate::counter::CounterValue;
use crate::error::{ErrorBody, IdError};

use super::CommandType;

/// Value of the `command` field on every answer
pub const ANSWER: &str = "answer";

/// Answer to a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// Always `"answer"`
    pub command: String,

    /// Command being answered
    pub to: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,

    /// Batch issued by `ask`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<CounterValue>>,

    /// Value returned by `last`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CounterValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,

    // dump introspection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirty: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients: Option<usize>,
}

impl Answer {
    fn new(to: CommandType, mid: Option<String>) -> Self {
        Self {
            command: ANSWER.to_string(),
            to: to.as_str().to_string(),
            mid,
            ids: None,
            id: None,
            ok: None,
            error: None,
            keys: None,
            dirty: None,
            clients: None,
        }
    }
}

/// Server introspection returned by `dump`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpStats {
    pub keys: usize,
    pub dirty: usize,
    pub clients: usize,
}

/// Any message the server sends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Answer(Answer),

    /// Protocol-level failure not tied to a request
    Fault { error: ErrorBody },
}

impl Response {
    /// Successful `ask`
    pub fn ids(mid: String, ids: Vec<CounterValue>) -> Self {
        let mut answer = Answer::new(CommandType::Ask, Some(mid));
        answer.ids = Some(ids);
        Response::Answer(answer)
    }

    /// Successful `last`
    pub fn last(mid: Option<String>, id: CounterValue) -> Self {
        let mut answer = Answer::new(CommandType::Last, mid);
        answer.id = Some(id);
        Response::Answer(answer)
    }

    /// `dump` acknowledgment
    pub fn dump(stats: DumpStats) -> Self {
        let mut answer = Answer::new(CommandType::Dump, None);
        answer.ok = Some(true);
        answer.keys = Some(stats.keys);
        answer.dirty = Some(stats.dirty);
        answer.clients = Some(stats.clients);
        Response::Answer(answer)
    }

    /// Failed command, answered with its error
    pub fn answer_error(to: CommandType, mid: Option<String>, error: &IdError) -> Self {
        let mut answer = Answer::new(to, mid);
        answer.error = Some(error.to_body());
        Response::Answer(answer)
    }

    /// Protocol-level error
    pub fn fault(error: &IdError) -> Self {
        Response::Fault {
            error: error.to_body(),
        }
    }

    /// Error carried by this response, if any
    pub fn error(&self) -> Option<&ErrorBody> {
        match self {
            Response::Answer(answer) => answer.error.as_ref(),
            Response::Fault { error } => Some(error),
        }
    }
}
