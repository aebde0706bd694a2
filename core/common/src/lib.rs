//! Common utilities and types shared across drivestore crates.
//!
//! This module provides the error type and the small value types that every
//! storage backend and the CLI agree on.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{FileId, SensitiveBytes};
