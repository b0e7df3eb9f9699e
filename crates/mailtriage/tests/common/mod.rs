//! Shared test utilities for mailtriage integration tests.
//!
//! This module provides:
//! - In-memory fakes for the mailbox gateway, connector, classifier and processor
//! - Builders for messages and classifications

pub mod builders;
pub mod fakes;

pub use builders::*;
pub use fakes::*;
