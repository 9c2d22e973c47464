//! Test utilities for schema-linker
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration tests.
//!
//! - [`init_test_logging`] installs a tracing subscriber once per process
//! - [`MockParser`] reads a minimal header format instead of real schema text
//! - [`CountingLinker`] counts `link` calls and can delay, hold or fail them

mod linker;
mod parser;

pub use linker::{CountingLinker, LinkGate, LinkedSchema};
pub use parser::MockParser;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`. Without either, logging stays off.
///
/// ```bash
/// RUST_LOG=schema::cache=trace cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
