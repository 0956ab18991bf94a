//! In-memory collaborators.
//!
//! Complete implementations of the config store, swarm and local database
//! contracts backed by process memory. Hosts use them for demos and offline
//! runs; the crate's own tests drive the coordinator and projector through
//! them.

pub mod config;
pub mod database;
pub mod swarm;

pub use config::{
    memory_group_configs, memory_user_configs, MemoryConfigStore, MemoryContacts,
    MemoryConvoInfoVolatile, MemoryGroupInfo, MemoryGroupKeys, MemoryGroupMembers,
    MemoryUserGroups, MemoryUserProfile,
};
pub use database::{DatabaseDump, InMemoryDatabase, NewMessage};
pub use swarm::{InMemorySwarm, SwarmCall};

/// Hex BLAKE3 hash of a blob, used as its swarm hash.
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}
