//! Utility functions for run ids and timestamp handling.

mod ids;
pub mod timestamps;

pub use ids::generate_run_id;
pub use timestamps::{iso_timestamp, now_utc, Timestamp};
