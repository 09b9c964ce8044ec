//! Common test utilities for the integration tests.
//!
//! This module provides shared functionality across the tests:
//! - Test projects with shell-script workers
//! - Polling assertions for asynchronous queue state

pub mod assertions;
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
