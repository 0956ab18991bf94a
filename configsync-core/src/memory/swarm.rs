//! In-memory swarm.
//!
//! Verifies request signatures, stores blobs under their BLAKE3 hash and
//! records every call in order so tests can assert on what reached the
//! network. Failures can be injected per operation.

use async_trait::async_trait;
use configsync_protocol::{AccountId, DeleteRequest, PushResult, StoreRequest};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::content_hash;
use crate::swarm::{Node, SwarmClient, SwarmError};

/// One call that reached the swarm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SwarmCall {
    Store {
        account: String,
        namespace: i32,
        hash: String,
        timestamp_ms: i64,
    },
    Delete {
        account: String,
        hashes: Vec<String>,
    },
}

#[derive(Default)]
struct SwarmState {
    calls: Vec<SwarmCall>,
    resolve_calls: usize,
    delete_attempts: usize,
    /// account -> namespace -> hash -> blob
    blobs: HashMap<String, HashMap<i32, HashMap<String, Vec<u8>>>>,
    failing_stores: u32,
    failing_resolves: u32,
    failing_deletes: bool,
}

#[derive(Default)]
pub struct InMemorySwarm {
    state: Mutex<SwarmState>,
}

impl InMemorySwarm {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SwarmState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `count` store calls with `Unreachable`.
    pub fn fail_next_stores(&self, count: u32) {
        self.lock().failing_stores = count;
    }

    pub fn fail_next_resolves(&self, count: u32) {
        self.lock().failing_resolves = count;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.lock().failing_deletes = fail;
    }

    pub fn calls(&self) -> Vec<SwarmCall> {
        self.lock().calls.clone()
    }

    pub fn store_calls(&self, namespace: i32) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, SwarmCall::Store { namespace: ns, .. } if *ns == namespace))
            .count()
    }

    pub fn delete_calls(&self) -> Vec<Vec<String>> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                SwarmCall::Delete { hashes, .. } => Some(hashes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn resolve_calls(&self) -> usize {
        self.lock().resolve_calls
    }

    /// Delete requests received, including ones that were made to fail.
    pub fn delete_attempts(&self) -> usize {
        self.lock().delete_attempts
    }

    /// Blob stored under `hash`, if it has not been deleted.
    pub fn blob(&self, account: &AccountId, namespace: i32, hash: &str) -> Option<Vec<u8>> {
        self.lock()
            .blobs
            .get(&account.to_hex())
            .and_then(|namespaces| namespaces.get(&namespace))
            .and_then(|blobs| blobs.get(hash))
            .cloned()
    }
}

#[async_trait]
impl SwarmClient for InMemorySwarm {
    async fn resolve_node(&self, account: &AccountId) -> Result<Node, SwarmError> {
        let mut state = self.lock();
        state.resolve_calls += 1;
        if state.failing_resolves > 0 {
            state.failing_resolves -= 1;
            return Err(SwarmError::NoNodes(account.to_hex()));
        }
        let pubkey = hex::encode(&account.key_bytes()[..8]);
        Ok(Node::new("127.0.0.1", 22021, pubkey))
    }

    async fn store(&self, node: &Node, request: StoreRequest) -> Result<PushResult, SwarmError> {
        if !request.verify().unwrap_or(false) {
            return Err(SwarmError::Unauthorized);
        }
        let data = request.decode_data().map_err(|e| SwarmError::Rejected {
            status: 400,
            reason: e.to_string(),
        })?;

        let mut state = self.lock();
        if state.failing_stores > 0 {
            state.failing_stores -= 1;
            return Err(SwarmError::Unreachable(format!("{node:?}")));
        }

        let hash = content_hash(&data);
        state
            .blobs
            .entry(request.pubkey.clone())
            .or_default()
            .entry(request.namespace)
            .or_default()
            .insert(hash.clone(), data);
        state.calls.push(SwarmCall::Store {
            account: request.pubkey,
            namespace: request.namespace,
            hash: hash.clone(),
            timestamp_ms: request.timestamp_ms,
        });
        Ok(PushResult {
            hash,
            timestamp_ms: request.timestamp_ms,
        })
    }

    async fn delete(&self, node: &Node, request: DeleteRequest) -> Result<(), SwarmError> {
        if !request.verify().unwrap_or(false) {
            return Err(SwarmError::Unauthorized);
        }
        let mut state = self.lock();
        state.delete_attempts += 1;
        if state.failing_deletes {
            return Err(SwarmError::Unreachable(format!("{node:?}")));
        }
        if let Some(namespaces) = state.blobs.get_mut(&request.pubkey) {
            for blobs in namespaces.values_mut() {
                for hash in &request.messages {
                    blobs.remove(hash);
                }
            }
        }
        state.calls.push(SwarmCall::Delete {
            account: request.pubkey,
            hashes: request.messages,
        });
        Ok(())
    }
}
