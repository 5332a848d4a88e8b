//! Core types and utilities for the nodeflow workflow engine.
//!
//! This crate provides the foundational types shared by the engine,
//! the built-in executors and the runner binary.

pub mod error;
pub mod id;
pub mod secret;

pub use error::Result;
pub use id::{ExecutionId, ParseIdError};
pub use secret::{REDACTED, Secrets};
