//! Tracing and logging setup shared by the orders storage crates.

/// Tracing configuration (filters, formatters).
pub mod tracing;

/// Initialize process-wide logging with JSON output.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize logging for tests: human-readable, captured by the test harness.
pub fn init_for_tests() {
    tracing::init_for_tests();
}
