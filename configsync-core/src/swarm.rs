//! Swarm client contract.
//!
//! The coordinator and projector only ever reach the network through this
//! trait. Implementations pick a storage node from the account's replica set
//! and submit signed store / delete requests to it.

use async_trait::async_trait;
use configsync_protocol::{AccountId, DeleteRequest, PushResult, StoreRequest};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwarmError {
    #[error("No storage node available for {0}")]
    NoNodes(String),
    #[error("Node unreachable: {0}")]
    Unreachable(String),
    #[error("Request rejected ({status}): {reason}")]
    Rejected { status: u16, reason: String },
    #[error("Request signature rejected")]
    Unauthorized,
    #[error("Request timed out")]
    Timeout,
}

/// One storage node of a swarm.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Node {
    pub host: String,
    pub port: u16,
    pub ed25519_pubkey: String,
}

impl Node {
    pub fn new(host: impl Into<String>, port: u16, ed25519_pubkey: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            ed25519_pubkey: ed25519_pubkey.into(),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}:{})", self.host, self.port)
    }
}

#[async_trait]
pub trait SwarmClient: Send + Sync {
    /// Select a storage node from `account`'s replica set.
    async fn resolve_node(&self, account: &AccountId) -> Result<Node, SwarmError>;

    async fn store(&self, node: &Node, request: StoreRequest) -> Result<PushResult, SwarmError>;

    /// Best effort; callers log and ignore failures.
    async fn delete(&self, node: &Node, request: DeleteRequest) -> Result<(), SwarmError>;
}
