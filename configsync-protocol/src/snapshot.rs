//! Materialized config snapshots.
//!
//! These are the read views a config store exposes after merging. The
//! projector only ever sees these types, never the stores' encoded form.

use crate::address::Address;
use crate::ids::AccountId;
use crate::signing::AdminKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Conversation is hidden from the list.
pub const PRIORITY_HIDDEN: i64 = -1;
/// Conversation is shown in normal order.
pub const PRIORITY_VISIBLE: i64 = 0;
/// Conversation is pinned to the top.
pub const PRIORITY_PINNED: i64 = 1;

/// Pinned means any priority above visible.
pub fn is_pinned(priority: i64) -> bool {
    priority > PRIORITY_VISIBLE
}

pub fn is_hidden(priority: i64) -> bool {
    priority == PRIORITY_HIDDEN
}

// ---------------------------------------------------------------------------
// User-scoped snapshots
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    /// Priority of the note-to-self conversation.
    pub nts_priority: i64,
    pub nts_expiry_secs: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub account_id: AccountId,
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub approved: bool,
    pub approved_me: bool,
    pub blocked: bool,
    pub priority: i64,
    pub expiry_secs: Option<i64>,
}

impl Contact {
    pub fn new(account_id: AccountId) -> Self {
        Contact {
            account_id,
            name: None,
            nickname: None,
            approved: false,
            approved_me: false,
            blocked: false,
            priority: PRIORITY_VISIBLE,
            expiry_secs: None,
        }
    }

    pub fn address(&self) -> Address {
        Address::Standard(self.account_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityInfo {
    pub base_url: String,
    pub room: String,
    pub pubkey_hex: String,
    pub priority: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyGroupInfo {
    pub account_id: AccountId,
    pub name: String,
    /// Member id to admin flag.
    pub members: BTreeMap<AccountId, bool>,
    pub enc_pub_key: Vec<u8>,
    pub enc_sec_key: Vec<u8>,
    pub priority: i64,
    pub joined_at_secs: i64,
}

impl LegacyGroupInfo {
    pub fn admins(&self) -> Vec<AccountId> {
        self.members
            .iter()
            .filter(|(_, admin)| **admin)
            .map(|(id, _)| *id)
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedGroupInfo {
    pub group_id: AccountId,
    pub name: Option<String>,
    pub admin_key: Option<AdminKey>,
    pub auth_data: Option<Vec<u8>>,
    pub priority: i64,
    pub joined_at_secs: i64,
    pub invited: bool,
    pub kicked: bool,
    pub destroyed: bool,
}

impl ClosedGroupInfo {
    pub fn new(group_id: AccountId) -> Self {
        ClosedGroupInfo {
            group_id,
            name: None,
            admin_key: None,
            auth_data: None,
            priority: PRIORITY_VISIBLE,
            joined_at_secs: 0,
            invited: false,
            kicked: false,
            destroyed: false,
        }
    }
}

/// One entry of the user-groups config. The three kinds share nothing but
/// being reconciled against local threads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupEntry {
    Community(CommunityInfo),
    LegacyGroup(LegacyGroupInfo),
    ClosedGroup(ClosedGroupInfo),
}

impl GroupEntry {
    pub fn address(&self) -> Address {
        match self {
            GroupEntry::Community(c) => Address::community(&c.base_url, &c.room),
            GroupEntry::LegacyGroup(g) => Address::LegacyGroup(g.account_id),
            GroupEntry::ClosedGroup(g) => Address::Group(g.group_id),
        }
    }

    pub fn priority(&self) -> i64 {
        match self {
            GroupEntry::Community(c) => c.priority,
            GroupEntry::LegacyGroup(g) => g.priority,
            GroupEntry::ClosedGroup(g) => g.priority,
        }
    }
}

/// Per-conversation read state shared across devices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub address: Address,
    pub last_read_ms: i64,
    pub unread: bool,
}

// ---------------------------------------------------------------------------
// Group-scoped snapshots
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_secs: Option<i64>,
    pub destroyed: bool,
    /// Messages at or before this time are deleted for everyone.
    pub delete_before_secs: Option<i64>,
    /// Attachments at or before this time are deleted for everyone.
    pub delete_attachments_before_secs: Option<i64>,
    pub expiry_timer_secs: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub account_id: AccountId,
    pub name: Option<String>,
    pub admin: bool,
    pub invite_pending: bool,
    pub removed: bool,
}

impl GroupMember {
    pub fn new(account_id: AccountId) -> Self {
        GroupMember {
            account_id,
            name: None,
            admin: false,
            invite_pending: false,
            removed: false,
        }
    }
}
