//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Message Format
//! One JSON object per length-prefixed frame (see [`codec`]).
//!
//! ### Client → Server
//! ```text
//! {"command":"ask","mid":"<string>","key":"<string>","n":<integer>}
//! {"command":"last","key":"<string>","mid":"<string>"}
//! {"command":"dump"}
//! ```
//!
//! ### Server → Client
//! ```text
//! {"command":"answer","to":"ask","mid":"<string>","ids":[...]}
//! {"command":"answer","to":"ask","mid":"<string>","error":{...}}
//! {"command":"answer","to":"last","mid":"<string>","id":<value>}
//! {"command":"answer","to":"dump","ok":true,...}
//! {"error":{"code":"<string>","description":"<string>",...}}
//! ```

pub mod codec;
mod command;
mod request;
mod response;

pub use codec::{encode_frame, encode_message, read_frame, write_frame, write_message};
pub use command::{Command, CommandType};
pub use request::Request;
pub use response::{Answer, DumpStats, Response, ANSWER};
