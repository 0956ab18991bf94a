//! # Config Sync Protocol
//!
//! **Data model and collaborator contracts for multi-device configuration sync.**
//!
//! A user's contacts, groups and conversation metadata live in mergeable
//! config stores that are replicated through a swarm of storage nodes. This
//! crate holds everything that is independent of the async runtime:
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`ids`] | Prefixed account ids |
//! | [`address`] | Conversation addresses (one-to-one, groups, communities) |
//! | [`types`] | Config kinds and namespaces, push payloads, notifications |
//! | [`snapshot`] | Materialized config snapshots and priorities |
//! | [`store`] | Config store contract and per-account / per-group bundles |
//! | [`storage`] | Local database contract |
//! | [`signing`] | Swarm request signing with user or admin keys |
//! | [`limits`] | Timing constants |

// Crate-level lint configuration: suppress stylistic warnings that don't affect correctness.
#![allow(
    clippy::empty_line_after_doc_comments,
    clippy::doc_lazy_continuation,
    clippy::too_many_arguments
)]

// ── Public modules ──────────────────────────────────────────────────────────

/// Prefixed account identifiers.
pub mod ids;

/// Conversation addresses.
pub mod address;

/// Config kinds, push payloads and results, notifications, group authority.
pub mod types;

/// Materialized config snapshots.
pub mod snapshot;

/// Config store contract.
pub mod store;

/// Local database contract.
pub mod storage;

/// Swarm request signing.
pub mod signing;

/// Timing constants.
pub mod limits;

// ── Re-exports for convenience ──────────────────────────────────────────────

pub use address::{Address, AddressError};
pub use ids::{AccountId, IdError, IdPrefix};
pub use signing::{AdminKey, DeleteRequest, SigningError, StoreRequest, SwarmAuth};
pub use storage::{LocalDatabase, MessageRecord, StorageError};
pub use store::{ConfigStore, GroupConfigs, StoreError, UserConfigs};
pub use types::{
    ConfigMessage, ConfigType, GroupAuthority, MergeNotification, PushPayload, PushResult,
    PushedConfig, UserConfigType,
};

// ── Library metadata ────────────────────────────────────────────────────────

/// Protocol crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the protocol crate version string.
pub fn version() -> &'static str {
    VERSION
}

// ── Tests ───────────────────────────────────────────────────────────────────
