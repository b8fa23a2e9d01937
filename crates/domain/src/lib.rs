//! Shared domain types for Nexus Core.
//!
//! This crate is the leaf of the workspace: branded identifiers, the
//! error taxonomy, provider-agnostic messages and stream events, the
//! execution-trace data model, and project/agent configuration types.
//! Everything here is plain data — no I/O, no async.

pub mod config;
pub mod error;
pub mod id;
pub mod message;
pub mod stream;
pub mod trace;

pub use error::{Error, Result};
