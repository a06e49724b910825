//! Shared test utilities for reportflow integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring every component over a temp-file database
//! - `ConfigBuilder` for test configurations
//! - `ScriptedCollector`, an evidence collector driven per section

pub mod builders;
pub mod harness;
pub mod scripted;

pub use builders::*;
pub use harness::TestHarness;
pub use scripted::ScriptedCollector;
