//! Testing utilities for infraflow.
//!
//! This module provides:
//! - [`FakeCloud`], an in-memory implementation of every provider service
//! - [`RecordingProvider`], a kind-agnostic provider with failure injection
//! - Node fixtures for common graph shapes

mod cloud;
mod fixtures;
mod mocks;

pub use cloud::{CloudCall, FakeCloud, StoredPipeline};
pub use fixtures::{bucket, chain, fan_in, layered};
pub use mocks::{RecordedCall, RecordingProvider};
