//! Tracing/logging setup shared by the Tillwise binaries and embedders.

/// Initialize process-wide observability (JSON logs).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize human-readable logs for interactive use (the CLI).
///
/// Same filtering as [`init`]; also a no-op if a subscriber is installed.
pub fn init_pretty() {
    tracing::init_pretty();
}

/// Tracing configuration (filters, layers).
pub mod tracing;
