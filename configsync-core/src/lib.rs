// Crate-level lint configuration: suppress stylistic warnings that don't affect correctness.
#![allow(
    clippy::empty_line_after_doc_comments,
    clippy::doc_lazy_continuation,
    clippy::too_many_arguments,
    clippy::type_complexity,
    clippy::new_without_default
)]

// ── Re-export protocol modules ──────────────────────────────────────────────
// The data model and collaborator contracts live in `configsync-protocol`.
pub use configsync_protocol::address;
pub use configsync_protocol::ids;
pub use configsync_protocol::limits;
pub use configsync_protocol::signing;
pub use configsync_protocol::snapshot;
pub use configsync_protocol::storage;
pub use configsync_protocol::store;
pub use configsync_protocol::types;

// ── Local modules ───────────────────────────────────────────────────────────
pub mod bus;
pub mod clock;
pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod factory;
pub mod identity;
pub mod logging;
pub mod memory;
pub mod projector;
pub mod retry;
pub mod settings;
pub mod swarm;

#[cfg(test)]
mod tests;

// ── Re-export main types ────────────────────────────────────────────────────
pub use bus::{NotificationBus, NotificationReceiver};
pub use clock::{Clock, FixedClock, SystemClock};
pub use coordinator::ConfigPushCoordinator;
pub use error::{Result, SyncError};
pub use factory::{ConfigFactory, GroupPushes};
pub use identity::LocalIdentity;
pub use projector::{ConfigProjector, NoopHooks, ProjectionHooks};
pub use settings::SyncSettings;
pub use swarm::{Node, SwarmClient, SwarmError};

pub use configsync_protocol::{
    AccountId, Address, AdminKey, ConfigMessage, ConfigType, GroupAuthority, MergeNotification,
    PushPayload, PushResult, SwarmAuth, UserConfigType,
};

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version
pub fn get_version() -> &'static str {
    VERSION
}
