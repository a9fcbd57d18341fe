//! Cooperative cancellation for provisioning runs.
//!
//! A run checks its token between node completions. Calls already in flight
//! are awaited and recorded before the run stops.

mod token;

pub use token::CancellationToken;
