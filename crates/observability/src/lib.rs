//! Process-wide logging setup shared by the binaries and test harnesses.

pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize structured logging from `RUST_LOG` / `LOG_FORMAT`.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init() {
    tracing::init(LogFormat::from_env());
}
