//! Observability utilities.

mod logging;

pub use logging::{init_tracing, subscriber, LogFormat, SpanTimer};
