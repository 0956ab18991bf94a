//! Local durable storage contract.
//!
//! This module defines the contract the projector writes through. The actual
//! database (e.g. SQLCipher) is implemented by the application; the core only
//! relies on the operations below and on `in_transaction` grouping them so a
//! single projection pass is applied atomically.

use crate::address::Address;
use crate::ids::AccountId;
use crate::snapshot::Contact;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Thread {0} not found")]
    ThreadNotFound(ThreadId),
    #[error("Message {0} not found")]
    MessageNotFound(MessageId),
    #[error("Group {0} not found")]
    GroupNotFound(AccountId),
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),
    #[error("Storage I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

pub type ThreadId = i64;
pub type MessageId = i64;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Message fields the projector needs to decide how to delete it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub timestamp_ms: i64,
    /// Hash under which the swarm stores the message, when known.
    pub server_hash: Option<String>,
    /// Group updates, expiry changes and other non-content messages.
    pub is_control: bool,
    pub has_attachments: bool,
    pub is_voice_note: bool,
    pub deleted_locally: bool,
}

/// Full state of a legacy closed group materialized from the user-groups config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyGroupRecord {
    pub group_id: AccountId,
    pub name: String,
    pub members: Vec<AccountId>,
    pub admins: Vec<AccountId>,
    pub formation_ms: i64,
}

/// Shared X25519 key pair of a legacy closed group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptionKeyPair {
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Local database contract (app implements)
// ---------------------------------------------------------------------------

/// Relational storage for threads, messages and recipients.
///
/// Every mutating operation must be safe to repeat: applying it to a row
/// already in the requested state changes nothing.
pub trait LocalDatabase: Send + Sync {
    // ── Threads ────────────────────────────────────────────────────────────

    fn thread_id(&self, address: &Address) -> Result<Option<ThreadId>>;

    /// Return the existing thread for `address`, creating it if needed.
    fn get_or_create_thread(&self, address: &Address) -> Result<ThreadId>;

    /// Every thread with its address.
    fn threads(&self) -> Result<Vec<(ThreadId, Address)>>;

    fn set_pinned(&self, thread: ThreadId, pinned: bool) -> Result<()>;

    fn set_creation_date(&self, thread: ThreadId, timestamp_ms: i64) -> Result<()>;

    /// Refresh the thread's last-updated marker.
    fn update_thread(&self, thread: ThreadId) -> Result<()>;

    /// Delete the thread and every message in it.
    fn delete_thread(&self, thread: ThreadId) -> Result<()>;

    fn last_seen(&self, thread: ThreadId) -> Result<i64>;

    /// Move the read marker to `last_read_ms`, marking older messages read.
    fn mark_conversation_read(&self, thread: ThreadId, last_read_ms: i64) -> Result<()>;

    fn set_has_sent(&self, thread: ThreadId, has_sent: bool) -> Result<()>;

    fn set_note_to_self_hidden(&self, hidden: bool) -> Result<()>;

    // ── Messages ───────────────────────────────────────────────────────────

    /// Messages in `thread` sent at or before `timestamp_ms`.
    fn messages_before(&self, thread: ThreadId, timestamp_ms: i64) -> Result<Vec<MessageRecord>>;

    /// Replace the body with `placeholder` and drop attachments, keeping the row.
    fn mark_deleted_locally(&self, message: MessageId, placeholder: &str) -> Result<()>;

    fn delete_messages(&self, messages: &[MessageId]) -> Result<()>;

    /// Delete every message in `thread`, returning how many were removed.
    fn clear_messages(&self, thread: ThreadId) -> Result<usize>;

    // ── Recipients ─────────────────────────────────────────────────────────

    /// Reconcile the full contact list. `update_timestamp` tags a batch
    /// that echoes a local edit.
    fn add_contacts(&self, contacts: &[Contact], update_timestamp: Option<i64>) -> Result<()>;

    fn set_approved(&self, address: &Address, approved: bool) -> Result<()>;

    fn set_approved_me(&self, address: &Address, approved_me: bool) -> Result<()>;

    fn is_approved(&self, address: &Address) -> Result<bool>;

    /// Register a legacy group's key for polling.
    fn add_closed_group_public_key(&self, group: &AccountId) -> Result<()>;

    fn remove_closed_group_public_key(&self, group: &AccountId) -> Result<()>;

    // ── Legacy groups ──────────────────────────────────────────────────────

    fn create_legacy_group(&self, record: &LegacyGroupRecord) -> Result<()>;

    fn set_group_active(&self, group: &AccountId, active: bool) -> Result<()>;

    fn remove_group_member(&self, group: &AccountId, member: &AccountId) -> Result<()>;

    fn add_encryption_key_pair(
        &self,
        group: &AccountId,
        pair: &EncryptionKeyPair,
        timestamp_ms: i64,
    ) -> Result<()>;

    fn remove_encryption_key_pairs(&self, group: &AccountId) -> Result<()>;

    // ── Transactions ───────────────────────────────────────────────────────

    /// Run `work` atomically: if it fails, none of its writes persist.
    fn in_transaction(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}
