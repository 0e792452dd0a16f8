//! Core engine for the multi-round elimination lottery: domain types, the
//! append-only ledger, the versioned round store, the state machine service
//! and the event fanout. The `wheeld` crate hosts the scheduler and binary.

pub mod api;
pub mod error;
pub mod fanout;
pub mod ledger;
pub mod service;
pub mod storage;
pub mod types;

pub use error::{EngineError, ErrorKind, Result};
