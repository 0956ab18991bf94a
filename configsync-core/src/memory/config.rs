//! In-memory config stores.
//!
//! `MemoryConfigStore<T>` keeps a serde snapshot `T` and the push
//! bookkeeping every real store has: a sequence number bumped on the first
//! edit after a push, a dirty/pushed/clean state, the hash the swarm assigned
//! to the last confirmed push, and hashes made obsolete since. Remote merges
//! are last-writer-wins by sequence number.

use configsync_protocol::address::Address;
use configsync_protocol::ids::AccountId;
use configsync_protocol::snapshot::{
    ClosedGroupInfo, Contact, ConversationEntry, GroupEntry, GroupInfo, GroupMember, UserProfile,
};
use configsync_protocol::store::{
    ConfigStore, ContactsConfig, ConvoInfoVolatileConfig, GroupConfigs, GroupInfoConfig,
    GroupKeysConfig, GroupMembersConfig, Result, StoreError, UserConfigs, UserGroupsConfig,
    UserProfileConfig,
};
use configsync_protocol::types::{ConfigMessage, ConfigType, PushPayload};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type MemoryUserProfile = MemoryConfigStore<UserProfile>;
pub type MemoryContacts = MemoryConfigStore<Vec<Contact>>;
pub type MemoryConvoInfoVolatile = MemoryConfigStore<Vec<ConversationEntry>>;
pub type MemoryUserGroups = MemoryConfigStore<Vec<GroupEntry>>;
pub type MemoryGroupInfo = MemoryConfigStore<GroupInfo>;
pub type MemoryGroupMembers = MemoryConfigStore<Vec<GroupMember>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PushState {
    Clean,
    Dirty,
    /// Pushed, waiting for confirmation.
    Pushed,
}

#[derive(Serialize, Deserialize)]
struct Envelope<S> {
    seq_no: i64,
    state: S,
}

pub struct MemoryConfigStore<T> {
    config_type: ConfigType,
    state: T,
    seq_no: i64,
    push_state: PushState,
    current_hash: Option<String>,
    obsolete: BTreeSet<String>,
}

impl<T> MemoryConfigStore<T>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send,
{
    pub fn new(config_type: ConfigType, initial: T) -> Self {
        Self {
            config_type,
            state: initial,
            seq_no: 0,
            push_state: PushState::Clean,
            current_hash: None,
            obsolete: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> &T {
        &self.state
    }

    pub fn seq_no(&self) -> i64 {
        self.seq_no
    }

    /// Apply a local edit. Returns false when it changed nothing.
    pub fn mutate<F: FnOnce(&mut T)>(&mut self, f: F) -> bool {
        let mut next = self.state.clone();
        f(&mut next);
        if next == self.state {
            return false;
        }
        self.state = next;
        if self.push_state != PushState::Dirty {
            self.seq_no += 1;
            self.push_state = PushState::Dirty;
        }
        true
    }
}

impl<T> ConfigStore for MemoryConfigStore<T>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send,
{
    fn config_type(&self) -> ConfigType {
        self.config_type
    }

    fn needs_push(&self) -> bool {
        self.push_state != PushState::Clean
    }

    fn push(&mut self) -> Result<PushPayload> {
        let envelope = Envelope {
            seq_no: self.seq_no,
            state: &self.state,
        };
        let data =
            serde_json::to_vec(&envelope).map_err(|_| StoreError::Encode(self.config_type))?;
        if self.push_state == PushState::Dirty {
            self.push_state = PushState::Pushed;
        }
        Ok(PushPayload {
            data,
            seq_no: self.seq_no,
            obsolete_hashes: self.obsolete.clone(),
        })
    }

    fn confirm_pushed(&mut self, seq_no: i64, hash: &str) {
        if self.push_state != PushState::Pushed || seq_no != self.seq_no {
            log::debug!(
                target: "configsync::memory",
                "Ignoring stale {} confirmation (seq {} vs {})",
                self.config_type,
                seq_no,
                self.seq_no
            );
            return;
        }
        self.push_state = PushState::Clean;
        // Everything obsolete went out with the confirmed payload
        self.obsolete.clear();
        if let Some(prior) = self.current_hash.replace(hash.to_string()) {
            if prior != hash {
                self.obsolete.insert(prior);
            }
        }
    }

    fn merge(&mut self, messages: &[ConfigMessage]) -> Result<usize> {
        let mut accepted = 0;
        for message in messages {
            if self.current_hash.as_deref() == Some(message.hash.as_str())
                || self.obsolete.contains(&message.hash)
            {
                continue;
            }
            let envelope: Envelope<T> =
                serde_json::from_slice(&message.data).map_err(|_| StoreError::Decode {
                    config_type: self.config_type,
                    hash: message.hash.clone(),
                })?;
            if envelope.seq_no <= self.seq_no {
                continue;
            }
            if let Some(prior) = self.current_hash.replace(message.hash.clone()) {
                self.obsolete.insert(prior);
            }
            self.state = envelope.state;
            self.seq_no = envelope.seq_no;
            self.push_state = PushState::Clean;
            accepted += 1;
        }
        Ok(accepted)
    }

    fn current_hashes(&self) -> Vec<String> {
        self.current_hash.iter().cloned().collect()
    }
}

fn upsert<T, K: PartialEq>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> K) {
    let k = key(&item);
    match items.iter_mut().find(|existing| key(existing) == k) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

// ---------------------------------------------------------------------------
// Typed stores
// ---------------------------------------------------------------------------

impl UserProfileConfig for MemoryUserProfile {
    fn profile(&self) -> UserProfile {
        self.state.clone()
    }

    fn set_profile(&mut self, profile: UserProfile) {
        self.mutate(|state| *state = profile);
    }
}

impl ContactsConfig for MemoryContacts {
    fn all(&self) -> Vec<Contact> {
        self.state.clone()
    }

    fn get(&self, account_id: &AccountId) -> Option<Contact> {
        self.state.iter().find(|c| &c.account_id == account_id).cloned()
    }

    fn set(&mut self, contact: Contact) {
        self.mutate(|contacts| upsert(contacts, contact, |c| c.account_id));
    }

    fn erase(&mut self, account_id: &AccountId) -> bool {
        self.mutate(|contacts| contacts.retain(|c| &c.account_id != account_id))
    }
}

impl ConvoInfoVolatileConfig for MemoryConvoInfoVolatile {
    fn all(&self) -> Vec<ConversationEntry> {
        self.state.clone()
    }

    fn set(&mut self, entry: ConversationEntry) {
        self.mutate(|entries| upsert(entries, entry, |e| e.address.clone()));
    }

    fn erase(&mut self, address: &Address) -> bool {
        self.mutate(|entries| entries.retain(|e| &e.address != address))
    }
}

impl UserGroupsConfig for MemoryUserGroups {
    fn all(&self) -> Vec<GroupEntry> {
        self.state.clone()
    }

    fn closed_group(&self, group_id: &AccountId) -> Option<ClosedGroupInfo> {
        self.state.iter().find_map(|entry| match entry {
            GroupEntry::ClosedGroup(info) if &info.group_id == group_id => Some(info.clone()),
            _ => None,
        })
    }

    fn set(&mut self, entry: GroupEntry) {
        self.mutate(|entries| upsert(entries, entry, GroupEntry::address));
    }

    fn erase(&mut self, address: &Address) -> bool {
        self.mutate(|entries| entries.retain(|e| &e.address() != address))
    }
}

impl GroupInfoConfig for MemoryGroupInfo {
    fn info(&self) -> GroupInfo {
        self.state.clone()
    }

    fn set_info(&mut self, info: GroupInfo) {
        self.mutate(|state| *state = info);
    }
}

impl GroupMembersConfig for MemoryGroupMembers {
    fn all(&self) -> Vec<GroupMember> {
        self.state.clone()
    }

    fn set(&mut self, member: GroupMember) {
        self.mutate(|members| upsert(members, member, |m| m.account_id));
    }

    fn erase(&mut self, account_id: &AccountId) -> bool {
        self.mutate(|members| members.retain(|m| &m.account_id != account_id))
    }
}

// ---------------------------------------------------------------------------
// Group keys
// ---------------------------------------------------------------------------

/// A rotation the swarm has stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedKey {
    pub generation: u64,
    pub hash: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Default)]
pub struct MemoryGroupKeys {
    generation: u64,
    pending: Option<Vec<u8>>,
    active: Option<LoadedKey>,
    hashes: BTreeSet<String>,
}

impl MemoryGroupKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a key rotation, returning its encoded form.
    pub fn rotate(&mut self) -> Vec<u8> {
        self.generation += 1;
        let encoded = format!("{{\"generation\":{}}}", self.generation).into_bytes();
        self.pending = Some(encoded.clone());
        encoded
    }

    pub fn active_key(&self) -> Option<&LoadedKey> {
        self.active.as_ref()
    }
}

impl GroupKeysConfig for MemoryGroupKeys {
    fn pending_config(&self) -> Option<Vec<u8>> {
        self.pending.clone()
    }

    fn load_key(&mut self, pending: &[u8], hash: &str, timestamp_ms: i64) -> bool {
        if self.pending.as_deref() != Some(pending) {
            return false;
        }
        self.pending = None;
        self.hashes.insert(hash.to_string());
        self.active = Some(LoadedKey {
            generation: self.generation,
            hash: hash.to_string(),
            timestamp_ms,
        });
        true
    }

    fn merge(&mut self, messages: &[ConfigMessage]) -> Result<usize> {
        Ok(messages
            .iter()
            .filter(|m| self.hashes.insert(m.hash.clone()))
            .count())
    }

    fn current_hashes(&self) -> Vec<String> {
        self.hashes.iter().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Bundles
// ---------------------------------------------------------------------------

/// Fresh, empty user-scoped stores.
pub fn memory_user_configs() -> UserConfigs {
    UserConfigs {
        profile: Box::new(MemoryUserProfile::new(
            ConfigType::UserProfile,
            UserProfile::default(),
        )),
        contacts: Box::new(MemoryContacts::new(ConfigType::Contacts, Vec::new())),
        convo_info_volatile: Box::new(MemoryConvoInfoVolatile::new(
            ConfigType::ConvoInfoVolatile,
            Vec::new(),
        )),
        user_groups: Box::new(MemoryUserGroups::new(ConfigType::UserGroups, Vec::new())),
    }
}

/// Fresh, empty stores for one closed group.
pub fn memory_group_configs() -> GroupConfigs {
    GroupConfigs {
        info: Box::new(MemoryGroupInfo::new(ConfigType::GroupInfo, GroupInfo::default())),
        members: Box::new(MemoryGroupMembers::new(ConfigType::GroupMembers, Vec::new())),
        keys: Box::new(MemoryGroupKeys::new()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::content_hash;
    use configsync_protocol::ids::IdPrefix;
    use configsync_protocol::snapshot::PRIORITY_PINNED;

    fn contact(fill: u8) -> Contact {
        Contact::new(AccountId::new(IdPrefix::Standard, [fill; 32]))
    }

    fn as_message(payload: &PushPayload) -> ConfigMessage {
        ConfigMessage {
            hash: content_hash(&payload.data),
            data: payload.data.clone(),
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_edit_marks_dirty_and_bumps_seq() {
        let mut store = MemoryContacts::new(ConfigType::Contacts, Vec::new());
        assert!(!store.needs_push());

        store.set(contact(1));
        store.set(contact(2));
        assert!(store.needs_push());
        // One bump for the whole unpushed batch
        assert_eq!(store.seq_no(), 1);
    }

    #[test]
    fn test_noop_edit_stays_clean() {
        let mut store = MemoryUserProfile::new(ConfigType::UserProfile, UserProfile::default());
        store.set_profile(UserProfile::default());
        assert!(!store.needs_push());
        assert_eq!(store.seq_no(), 0);
    }

    #[test]
    fn test_confirm_clears_dirty() {
        let mut store = MemoryContacts::new(ConfigType::Contacts, Vec::new());
        store.set(contact(1));
        let payload = store.push().unwrap();
        assert!(store.needs_push());

        store.confirm_pushed(payload.seq_no, "h1");
        assert!(!store.needs_push());
        assert_eq!(store.current_hashes(), vec!["h1".to_string()]);
    }

    #[test]
    fn test_stale_confirmation_is_ignored() {
        let mut store = MemoryContacts::new(ConfigType::Contacts, Vec::new());
        store.set(contact(1));
        let first = store.push().unwrap();

        // Edit lands while the push is in flight
        store.set(contact(2));
        assert_eq!(store.seq_no(), first.seq_no + 1);

        store.confirm_pushed(first.seq_no, "h1");
        assert!(store.needs_push());
        assert!(store.current_hashes().is_empty());

        let second = store.push().unwrap();
        assert_eq!(second.seq_no, first.seq_no + 1);
        store.confirm_pushed(second.seq_no, "h2");
        assert!(!store.needs_push());
    }

    #[test]
    fn test_superseded_hashes_become_obsolete() {
        let mut remote = MemoryContacts::new(ConfigType::Contacts, Vec::new());
        let mut local = MemoryContacts::new(ConfigType::Contacts, Vec::new());

        local.set(contact(1));
        let payload = local.push().unwrap();
        local.confirm_pushed(payload.seq_no, "h1");

        // Another device pushes twice
        remote.mutate(|c| c.push(contact(5)));
        remote.mutate(|c| c.push(contact(6)));
        let r1 = remote.push().unwrap();
        remote.confirm_pushed(r1.seq_no, "r1");
        remote.set(contact(7));
        let r2 = remote.push().unwrap();

        let m1 = as_message(&r1);
        let m2 = as_message(&r2);
        assert_eq!(local.merge(&[m1.clone()]).unwrap(), 0); // same seq as ours
        remote.set(contact(8));
        let r3 = remote.push().unwrap();
        assert_eq!(local.merge(&[m2.clone(), as_message(&r3)]).unwrap(), 2);
        assert_eq!(local.state().len(), 4);

        local.set(contact(9));
        let next = local.push().unwrap();
        let expected: BTreeSet<String> = ["h1".to_string(), m2.hash].into_iter().collect();
        assert_eq!(next.obsolete_hashes, expected);
    }

    #[test]
    fn test_merge_ignores_known_and_older() {
        let mut a = MemoryUserGroups::new(ConfigType::UserGroups, Vec::new());
        let mut b = MemoryUserGroups::new(ConfigType::UserGroups, Vec::new());
        let gid = AccountId::new(IdPrefix::Group, [3u8; 32]);
        let mut info = ClosedGroupInfo::new(gid);
        info.priority = PRIORITY_PINNED;
        a.set(GroupEntry::ClosedGroup(info));
        let message = as_message(&a.push().unwrap());

        assert_eq!(b.merge(&[message.clone()]).unwrap(), 1);
        assert_eq!(b.merge(&[message]).unwrap(), 0);
        assert_eq!(b.closed_group(&gid).unwrap().priority, PRIORITY_PINNED);
        assert!(!b.needs_push());
    }

    #[test]
    fn test_merge_rejects_garbage() {
        let mut store = MemoryGroupInfo::new(ConfigType::GroupInfo, GroupInfo::default());
        let bad = ConfigMessage {
            hash: "bad".into(),
            data: b"\x00\x01".to_vec(),
            timestamp_ms: 0,
        };
        assert!(matches!(store.merge(&[bad]), Err(StoreError::Decode { .. })));
    }

    #[test]
    fn test_group_keys_load_only_current_pending() {
        let mut keys = MemoryGroupKeys::new();
        assert!(keys.pending_config().is_none());

        let first = keys.rotate();
        let second = keys.rotate();
        assert!(!keys.load_key(&first, "k1", 10));
        assert!(keys.load_key(&second, "k2", 20));
        assert!(keys.pending_config().is_none());
        assert_eq!(keys.active_key().unwrap().generation, 2);
        assert_eq!(keys.current_hashes(), vec!["k2".to_string()]);
    }
}
