/// Config sync timing constants.
///
/// These are the defaults the settings layer falls back to when a host does
/// not override them.

/// How long the swarm keeps a config blob.
pub const CONFIG_TTL_MS: i64 = 30 * 24 * 60 * 60 * 1000; // 30 days

/// Coalescing window for bursts of local edits.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1_000;

/// Delay between attempts of a failed push cycle.
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1_000;

/// Buffered notifications per subscriber before it starts lagging.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

/// Body written over a message that was deleted for everyone.
pub const DELETED_MESSAGE_PLACEHOLDER: &str = "This message was deleted";

/// Convert a seconds-based watermark from a config snapshot to milliseconds.
pub fn secs_to_ms(secs: i64) -> i64 {
    secs.saturating_mul(1_000)
}
