//! Tracing and logging setup shared by every binary.

/// Initialize process-wide observability (JSON logs, `RUST_LOG` filter).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{LogFormat, init_with};
