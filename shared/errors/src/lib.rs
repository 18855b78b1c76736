//! PayGuard Error Handling Library
//!
//! This library provides error handling for all PayGuard services. It includes
//! the shared error type, HTTP error responses, and error conversion utilities.

pub mod http;
pub mod types;

// Re-export commonly used types
pub use http::*;
pub use types::*;

// Re-export external dependencies
pub use anyhow::{anyhow, Context, Result as AnyhowResult};
pub use thiserror::Error;
