//! The agent runtime: turn loop, tool dispatch, cost enforcement,
//! prompt assembly, tracing, approvals, scheduling, and the inter-agent
//! bus.

pub mod approval;
pub mod cancel;
pub mod comms;
pub mod compact;
pub mod cost;
pub mod cron;
pub mod proactive;
pub mod prompt;
pub mod registry;
pub mod runner;
pub mod schedule;
pub mod schema;
pub mod session_lock;
pub mod trace;
pub mod usage;

pub use runner::{run_agent, RunRequest};
