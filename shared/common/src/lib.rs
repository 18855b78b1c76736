//! PayGuard Common Library
//!
//! This library provides common constants and utilities used across all
//! PayGuard services.

pub mod constants;
pub mod utils;

// Re-export commonly used types
pub use constants::*;
pub use utils::*;

// Re-export external dependencies for consistency
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;
