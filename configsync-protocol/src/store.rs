//! Config store contract (implemented by the mergeable config library).
//!
//! One store per config kind. The coordinator drives `needs_push` / `push` /
//! `confirm_pushed`; polling drives `merge`; the projector reads snapshots
//! through the typed sub-traits. Nothing here says how a store encodes or
//! merges its state.

use crate::address::Address;
use crate::ids::AccountId;
use crate::snapshot::{
    ClosedGroupInfo, Contact, ConversationEntry, GroupEntry, GroupInfo, GroupMember, UserProfile,
};
use crate::types::{ConfigMessage, ConfigType, PushPayload, UserConfigType};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to encode {0} push")]
    Encode(ConfigType),
    #[error("Failed to decode {config_type} message {hash}")]
    Decode { config_type: ConfigType, hash: String },
    #[error("Store is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Base contract
// ---------------------------------------------------------------------------

pub trait ConfigStore: Send {
    fn config_type(&self) -> ConfigType;

    /// Remote namespace, fixed per config kind.
    fn namespace(&self) -> i32 {
        self.config_type().namespace()
    }

    fn needs_push(&self) -> bool;

    /// Produce the current unpushed state. Calling again before confirmation
    /// returns the same sequence number.
    fn push(&mut self) -> Result<PushPayload>;

    /// Record that the payload with `seq_no` was stored under `hash`.
    ///
    /// A confirmation whose `seq_no` no longer matches the store's pending
    /// push (because a newer local edit landed in between) must be ignored,
    /// leaving the store dirty.
    fn confirm_pushed(&mut self, seq_no: i64, hash: &str);

    /// Merge remote blobs, returning how many were accepted.
    fn merge(&mut self, messages: &[ConfigMessage]) -> Result<usize>;

    /// Hashes of remote blobs the store currently reflects.
    fn current_hashes(&self) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Typed readers
// ---------------------------------------------------------------------------

pub trait UserProfileConfig: ConfigStore {
    fn profile(&self) -> UserProfile;
    fn set_profile(&mut self, profile: UserProfile);
}

pub trait ContactsConfig: ConfigStore {
    fn all(&self) -> Vec<Contact>;
    fn get(&self, account_id: &AccountId) -> Option<Contact>;
    fn set(&mut self, contact: Contact);
    fn erase(&mut self, account_id: &AccountId) -> bool;
}

pub trait ConvoInfoVolatileConfig: ConfigStore {
    fn all(&self) -> Vec<ConversationEntry>;
    fn set(&mut self, entry: ConversationEntry);
    fn erase(&mut self, address: &Address) -> bool;
}

pub trait UserGroupsConfig: ConfigStore {
    fn all(&self) -> Vec<GroupEntry>;
    fn closed_group(&self, group_id: &AccountId) -> Option<ClosedGroupInfo>;
    fn set(&mut self, entry: GroupEntry);
    fn erase(&mut self, address: &Address) -> bool;
}

pub trait GroupInfoConfig: ConfigStore {
    fn info(&self) -> GroupInfo;
    fn set_info(&mut self, info: GroupInfo);
}

pub trait GroupMembersConfig: ConfigStore {
    fn all(&self) -> Vec<GroupMember>;
    fn set(&mut self, member: GroupMember);
    fn erase(&mut self, account_id: &AccountId) -> bool;
}

/// Key-rotation layer of a closed group. Its pushes carry no sequence
/// number and never delete obsolete blobs.
pub trait GroupKeysConfig: Send {
    /// Encoded rotation waiting to be stored, if any.
    fn pending_config(&self) -> Option<Vec<u8>>;

    /// Activate the pending rotation once stored. Returns false when
    /// `pending` is no longer the pending rotation.
    fn load_key(&mut self, pending: &[u8], hash: &str, timestamp_ms: i64) -> bool;

    fn merge(&mut self, messages: &[ConfigMessage]) -> Result<usize>;

    fn current_hashes(&self) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Bundles
// ---------------------------------------------------------------------------

/// All user-scoped stores of one logged-in account.
pub struct UserConfigs {
    pub profile: Box<dyn UserProfileConfig>,
    pub contacts: Box<dyn ContactsConfig>,
    pub convo_info_volatile: Box<dyn ConvoInfoVolatileConfig>,
    pub user_groups: Box<dyn UserGroupsConfig>,
}

impl UserConfigs {
    pub fn needs_push(&self, t: UserConfigType) -> bool {
        match t {
            UserConfigType::Contacts => self.contacts.needs_push(),
            UserConfigType::UserProfile => self.profile.needs_push(),
            UserConfigType::ConvoInfoVolatile => self.convo_info_volatile.needs_push(),
            UserConfigType::UserGroups => self.user_groups.needs_push(),
        }
    }

    pub fn any_needs_push(&self) -> bool {
        UserConfigType::ALL.iter().any(|t| self.needs_push(*t))
    }

    pub fn push(&mut self, t: UserConfigType) -> Result<PushPayload> {
        match t {
            UserConfigType::Contacts => self.contacts.push(),
            UserConfigType::UserProfile => self.profile.push(),
            UserConfigType::ConvoInfoVolatile => self.convo_info_volatile.push(),
            UserConfigType::UserGroups => self.user_groups.push(),
        }
    }

    pub fn confirm_pushed(&mut self, t: UserConfigType, seq_no: i64, hash: &str) {
        match t {
            UserConfigType::Contacts => self.contacts.confirm_pushed(seq_no, hash),
            UserConfigType::UserProfile => self.profile.confirm_pushed(seq_no, hash),
            UserConfigType::ConvoInfoVolatile => {
                self.convo_info_volatile.confirm_pushed(seq_no, hash)
            }
            UserConfigType::UserGroups => self.user_groups.confirm_pushed(seq_no, hash),
        }
    }

    pub fn merge(&mut self, t: UserConfigType, messages: &[ConfigMessage]) -> Result<usize> {
        match t {
            UserConfigType::Contacts => self.contacts.merge(messages),
            UserConfigType::UserProfile => self.profile.merge(messages),
            UserConfigType::ConvoInfoVolatile => self.convo_info_volatile.merge(messages),
            UserConfigType::UserGroups => self.user_groups.merge(messages),
        }
    }
}

/// All stores of one closed group.
pub struct GroupConfigs {
    pub info: Box<dyn GroupInfoConfig>,
    pub members: Box<dyn GroupMembersConfig>,
    pub keys: Box<dyn GroupKeysConfig>,
}

impl GroupConfigs {
    pub fn merge(&mut self, t: ConfigType, messages: &[ConfigMessage]) -> Result<usize> {
        match t {
            ConfigType::GroupInfo => self.info.merge(messages),
            ConfigType::GroupMembers => self.members.merge(messages),
            ConfigType::GroupKeys => self.keys.merge(messages),
            other => {
                log::warn!("Ignoring {} messages merged into group configs", other);
                Ok(0)
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        self.info.needs_push() || self.members.needs_push() || self.keys.pending_config().is_some()
    }
}
