//! Shared utilities for spudshut integration tests.
//!
//! - `TestHarness` gives each test its own input, work and output
//!   directories plus a file-backed job store
//! - `FakeEngine` and `FakeConverter` stand in for ffmpeg and the voice API

pub mod fakes;
pub mod harness;

pub use fakes::{ConverterMode, FakeConverter, FakeEngine};
pub use harness::TestHarness;
