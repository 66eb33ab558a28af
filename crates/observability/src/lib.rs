//! Process-wide tracing setup shared by the binaries.

pub mod subscriber;

pub use subscriber::LogFormat;

/// Install the global subscriber, reading `RUST_LOG` and `LOG_FORMAT`.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    let format = std::env::var("LOG_FORMAT")
        .ok()
        .map(|raw| LogFormat::parse(&raw))
        .unwrap_or_default();
    subscriber::init_with(format);
}
