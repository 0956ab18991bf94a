//! Logger setup for hosts and tests.

use log::LevelFilter;

/// Default level when the host does not pass one.
#[cfg(feature = "debug-logs")]
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::Debug;
#[cfg(not(feature = "debug-logs"))]
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// Parse a level name, falling back to [`DEFAULT_LEVEL`].
pub fn parse_level(name: &str) -> LevelFilter {
    match name.to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => DEFAULT_LEVEL,
    }
}

/// Install `env_logger`. `RUST_LOG` still overrides per-target levels.
/// Calling it again is a no-op.
pub fn init(level: LevelFilter) {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .is_test(cfg!(test))
        .try_init();
}
