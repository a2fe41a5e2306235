//! Journal Module
//!
//! Write-ahead journal of counter advances.
//!
//! ## Responsibilities
//! - Append the terminal value of every batch before it is acknowledged
//! - fsync each append
//! - Replay the records left behind by a crash on startup
//! - Checkpoint (truncate) once the snapshot store holds everything
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ key1 \r value1 \n                        │
//! │ key2 \r value2 \n                        │
//! │ ...                                      │
//! │ keyN \r valueN \n \0                     │
//! └──────────────────────────────────────────┘
//! ```
//!
//! The trailing `\0` sentinel marks the end of genuinely written data. Every
//! append starts on top of the previous sentinel and leaves a new one behind,
//! so anything after the first `\0` is garbage from an interrupted write.

mod record;
mod replay;
mod writer;

pub use record::{is_valid_key, JournalRecord, SENTINEL, SEPARATOR, TERMINATOR};
pub use replay::{JournalReplay, ReplayStats};
pub use writer::{Journal, JournalMark};
