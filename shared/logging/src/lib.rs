//! PayGuard Logging Library
//!
//! Structured logging setup shared by all PayGuard services. Initializes a
//! `tracing` subscriber honoring `RUST_LOG`, falling back to `info` for the
//! service itself.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber for a service.
///
/// Safe to call more than once; subsequent calls are no-ops (relevant in
/// tests where several entry points initialize telemetry).
pub fn init_telemetry(service_name: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,{}=info", service_name)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

// Re-export the macros services use day to day
pub use tracing::{debug, error, info, trace, warn};

#[cfg(test)]
mod tests {
    #[test]
    fn test_init_is_idempotent() {
        super::init_telemetry("payguard_test");
        super::init_telemetry("payguard_test");
    }
}
