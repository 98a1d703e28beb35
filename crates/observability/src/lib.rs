//! Process-wide logging setup.

pub mod tracing;

pub use self::tracing::{LogFormat, LogFormatError};

/// Install the global subscriber using `LOG_FORMAT` (default JSON) and `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let format = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_default();
    self::tracing::init(format);
}
