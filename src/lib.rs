//! # idserver
//!
//! A centralized unique-ID issuance service:
//! - Per-key monotonic counters, numeric or pattern based
//! - Write-ahead journal so no issued ID is reissued after a crash
//! - Periodic commits of changed counters to a snapshot store
//! - Length-prefixed JSON protocol over TCP
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │                  (Multiple Clients)                          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Command Dispatcher                           │
//! │              (validation, routing)                           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Allocation Engine                            │
//! │               (per-key locks)                                │
//! └──────────┬──────────────────────────────┬───────────────────┘
//!            │                              │
//!            ▼                              ▼
//!     ┌─────────────┐               ┌──────────────┐
//!     │   Journal   │  checkpoint   │ Counter Map  │
//!     │  (append)   │◄──────────────│   (dirty)    │
//!     └─────────────┘               └──────┬───────┘
//!                                          │ commit
//!                                          ▼
//!                                   ┌──────────────┐
//!                                   │   Snapshot   │
//!                                   │    Store     │
//!                                   └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod pattern;
pub mod counter;
pub mod locks;
pub mod journal;
pub mod store;
pub mod commit;
pub mod engine;
pub mod protocol;
pub mod dispatch;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use client::Client;
pub use commit::{CommitOutcome, CommitScheduler};
pub use config::Config;
pub use counter::CounterValue;
pub use engine::Engine;
pub use error::{IdError, Result};
pub use pattern::Pattern;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of idserver
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
