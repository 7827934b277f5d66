//! # billtrace-core
//!
//! Core types and abstractions for billtrace.
//!
//! This crate provides the foundational data structures, error taxonomy and
//! defaults that the other billtrace crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
