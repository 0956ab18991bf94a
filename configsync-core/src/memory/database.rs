//! In-memory local database.
//!
//! Tables are plain maps behind one mutex. `in_transaction` snapshots the
//! tables and restores them if the work fails, so a failed projection pass
//! leaves no partial writes behind.

use configsync_protocol::address::Address;
use configsync_protocol::ids::AccountId;
use configsync_protocol::snapshot::{is_hidden, Contact, PRIORITY_PINNED};
use configsync_protocol::storage::{
    EncryptionKeyPair, LegacyGroupRecord, LocalDatabase, MessageId, MessageRecord, Result,
    StorageError, ThreadId,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadRow {
    pub address: Option<Address>,
    pub pinned: bool,
    pub creation_ms: i64,
    pub updated_ms: i64,
    pub last_seen_ms: i64,
    pub has_sent: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRow {
    pub record: MessageRecord,
    pub body: String,
    pub read: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecipientRow {
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub approved: bool,
    pub approved_me: bool,
    pub blocked: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyGroupRow {
    pub record: LegacyGroupRecord,
    pub active: bool,
}

/// Message to seed into a thread.
#[derive(Clone, Debug, Default)]
pub struct NewMessage {
    pub timestamp_ms: i64,
    pub body: String,
    pub server_hash: Option<String>,
    pub is_control: bool,
    pub has_attachments: bool,
    pub is_voice_note: bool,
}

/// Every table, comparable as a whole.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatabaseDump {
    pub threads: BTreeMap<ThreadId, ThreadRow>,
    pub messages: BTreeMap<MessageId, MessageRow>,
    pub recipients: BTreeMap<Address, RecipientRow>,
    pub polled_group_keys: BTreeSet<AccountId>,
    pub legacy_groups: BTreeMap<AccountId, LegacyGroupRow>,
    pub key_pairs: BTreeMap<AccountId, Vec<(EncryptionKeyPair, i64)>>,
    pub note_to_self_hidden: bool,
}

#[derive(Default)]
struct DbState {
    next_thread: ThreadId,
    next_message: MessageId,
    tables: DatabaseDump,
    add_contacts_calls: Vec<(Vec<Contact>, Option<i64>)>,
    transactions: usize,
}

impl DbState {
    fn thread_mut(&mut self, thread: ThreadId) -> Result<&mut ThreadRow> {
        self.tables
            .threads
            .get_mut(&thread)
            .ok_or(StorageError::ThreadNotFound(thread))
    }

    fn thread_for(&self, address: &Address) -> Option<ThreadId> {
        self.tables
            .threads
            .iter()
            .find(|(_, row)| row.address.as_ref() == Some(address))
            .map(|(id, _)| *id)
    }

    fn get_or_create(&mut self, address: &Address) -> ThreadId {
        if let Some(id) = self.thread_for(address) {
            return id;
        }
        self.next_thread += 1;
        let id = self.next_thread;
        self.tables.threads.insert(
            id,
            ThreadRow {
                address: Some(address.clone()),
                ..ThreadRow::default()
            },
        );
        id
    }

    fn delete_thread(&mut self, thread: ThreadId) {
        self.tables.threads.remove(&thread);
        self.tables.messages.retain(|_, m| m.record.thread_id != thread);
    }

    fn recipient(&mut self, address: &Address) -> &mut RecipientRow {
        self.tables.recipients.entry(address.clone()).or_default()
    }
}

#[derive(Default)]
pub struct InMemoryDatabase {
    state: Mutex<DbState>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DbState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_message(&self, thread: ThreadId, message: NewMessage) -> MessageId {
        let mut state = self.lock();
        state.next_message += 1;
        let id = state.next_message;
        state.tables.messages.insert(
            id,
            MessageRow {
                record: MessageRecord {
                    id,
                    thread_id: thread,
                    timestamp_ms: message.timestamp_ms,
                    server_hash: message.server_hash,
                    is_control: message.is_control,
                    has_attachments: message.has_attachments,
                    is_voice_note: message.is_voice_note,
                    deleted_locally: false,
                },
                body: message.body,
                read: false,
            },
        );
        id
    }

    pub fn message(&self, id: MessageId) -> Option<MessageRow> {
        self.lock().tables.messages.get(&id).cloned()
    }

    pub fn message_count(&self, thread: ThreadId) -> usize {
        self.lock()
            .tables
            .messages
            .values()
            .filter(|m| m.record.thread_id == thread)
            .count()
    }

    pub fn thread(&self, address: &Address) -> Option<ThreadRow> {
        let state = self.lock();
        state
            .thread_for(address)
            .and_then(|id| state.tables.threads.get(&id).cloned())
    }

    pub fn recipient_row(&self, address: &Address) -> Option<RecipientRow> {
        self.lock().tables.recipients.get(address).cloned()
    }

    pub fn legacy_group(&self, group: &AccountId) -> Option<LegacyGroupRow> {
        self.lock().tables.legacy_groups.get(group).cloned()
    }

    pub fn key_pairs(&self, group: &AccountId) -> Vec<(EncryptionKeyPair, i64)> {
        self.lock()
            .tables
            .key_pairs
            .get(group)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_polling(&self, group: &AccountId) -> bool {
        self.lock().tables.polled_group_keys.contains(group)
    }

    pub fn note_to_self_hidden(&self) -> bool {
        self.lock().tables.note_to_self_hidden
    }

    pub fn add_contacts_calls(&self) -> Vec<(Vec<Contact>, Option<i64>)> {
        self.lock().add_contacts_calls.clone()
    }

    pub fn transaction_count(&self) -> usize {
        self.lock().transactions
    }

    pub fn dump(&self) -> DatabaseDump {
        self.lock().tables.clone()
    }
}

impl LocalDatabase for InMemoryDatabase {
    fn thread_id(&self, address: &Address) -> Result<Option<ThreadId>> {
        Ok(self.lock().thread_for(address))
    }

    fn get_or_create_thread(&self, address: &Address) -> Result<ThreadId> {
        Ok(self.lock().get_or_create(address))
    }

    fn threads(&self) -> Result<Vec<(ThreadId, Address)>> {
        Ok(self
            .lock()
            .tables
            .threads
            .iter()
            .filter_map(|(id, row)| row.address.clone().map(|address| (*id, address)))
            .collect())
    }

    fn set_pinned(&self, thread: ThreadId, pinned: bool) -> Result<()> {
        self.lock().thread_mut(thread)?.pinned = pinned;
        Ok(())
    }

    fn set_creation_date(&self, thread: ThreadId, timestamp_ms: i64) -> Result<()> {
        self.lock().thread_mut(thread)?.creation_ms = timestamp_ms;
        Ok(())
    }

    fn update_thread(&self, thread: ThreadId) -> Result<()> {
        let mut state = self.lock();
        let latest = state
            .tables
            .messages
            .values()
            .filter(|m| m.record.thread_id == thread)
            .map(|m| m.record.timestamp_ms)
            .max()
            .unwrap_or(0);
        let row = state.thread_mut(thread)?;
        row.updated_ms = latest.max(row.last_seen_ms);
        Ok(())
    }

    fn delete_thread(&self, thread: ThreadId) -> Result<()> {
        self.lock().delete_thread(thread);
        Ok(())
    }

    fn last_seen(&self, thread: ThreadId) -> Result<i64> {
        Ok(self.lock().thread_mut(thread)?.last_seen_ms)
    }

    fn mark_conversation_read(&self, thread: ThreadId, last_read_ms: i64) -> Result<()> {
        let mut state = self.lock();
        let row = state.thread_mut(thread)?;
        row.last_seen_ms = row.last_seen_ms.max(last_read_ms);
        for message in state.tables.messages.values_mut() {
            if message.record.thread_id == thread && message.record.timestamp_ms <= last_read_ms {
                message.read = true;
            }
        }
        Ok(())
    }

    fn set_has_sent(&self, thread: ThreadId, has_sent: bool) -> Result<()> {
        self.lock().thread_mut(thread)?.has_sent = has_sent;
        Ok(())
    }

    fn set_note_to_self_hidden(&self, hidden: bool) -> Result<()> {
        self.lock().tables.note_to_self_hidden = hidden;
        Ok(())
    }

    fn messages_before(&self, thread: ThreadId, timestamp_ms: i64) -> Result<Vec<MessageRecord>> {
        Ok(self
            .lock()
            .tables
            .messages
            .values()
            .filter(|m| m.record.thread_id == thread && m.record.timestamp_ms <= timestamp_ms)
            .map(|m| m.record.clone())
            .collect())
    }

    fn mark_deleted_locally(&self, message: MessageId, placeholder: &str) -> Result<()> {
        let mut state = self.lock();
        let row = state
            .tables
            .messages
            .get_mut(&message)
            .ok_or(StorageError::MessageNotFound(message))?;
        row.body = placeholder.to_string();
        row.record.deleted_locally = true;
        row.record.has_attachments = false;
        Ok(())
    }

    fn delete_messages(&self, messages: &[MessageId]) -> Result<()> {
        let mut state = self.lock();
        for id in messages {
            state.tables.messages.remove(id);
        }
        Ok(())
    }

    fn clear_messages(&self, thread: ThreadId) -> Result<usize> {
        let mut state = self.lock();
        let before = state.tables.messages.len();
        state.tables.messages.retain(|_, m| m.record.thread_id != thread);
        Ok(before - state.tables.messages.len())
    }

    fn add_contacts(&self, contacts: &[Contact], update_timestamp: Option<i64>) -> Result<()> {
        let mut state = self.lock();
        state
            .add_contacts_calls
            .push((contacts.to_vec(), update_timestamp));

        for contact in contacts {
            let address = contact.address();
            let row = state.recipient(&address);
            row.name = contact.name.clone();
            row.nickname = contact.nickname.clone();
            row.approved = contact.approved;
            row.approved_me = contact.approved_me;
            row.blocked = contact.blocked;

            if is_hidden(contact.priority) {
                if let Some(thread) = state.thread_for(&address) {
                    state.delete_thread(thread);
                }
            } else {
                let existed = state.thread_for(&address).is_some();
                let thread = state.get_or_create(&address);
                let row = state.thread_mut(thread)?;
                if !existed {
                    row.creation_ms = 0;
                }
                row.pinned = contact.priority == PRIORITY_PINNED;
            }
        }

        // Threads of contacts that left the config go away
        let kept: BTreeSet<Address> = contacts.iter().map(Contact::address).collect();
        let stale: Vec<ThreadId> = state
            .tables
            .threads
            .iter()
            .filter(|(_, row)| match &row.address {
                Some(address @ Address::Standard(_)) => {
                    !kept.contains(address) && state.tables.recipients.contains_key(address)
                }
                _ => false,
            })
            .map(|(id, _)| *id)
            .collect();
        for thread in stale {
            state.delete_thread(thread);
        }
        Ok(())
    }

    fn set_approved(&self, address: &Address, approved: bool) -> Result<()> {
        self.lock().recipient(address).approved = approved;
        Ok(())
    }

    fn set_approved_me(&self, address: &Address, approved_me: bool) -> Result<()> {
        self.lock().recipient(address).approved_me = approved_me;
        Ok(())
    }

    fn is_approved(&self, address: &Address) -> Result<bool> {
        Ok(self
            .lock()
            .tables
            .recipients
            .get(address)
            .is_some_and(|r| r.approved))
    }

    fn add_closed_group_public_key(&self, group: &AccountId) -> Result<()> {
        self.lock().tables.polled_group_keys.insert(*group);
        Ok(())
    }

    fn remove_closed_group_public_key(&self, group: &AccountId) -> Result<()> {
        self.lock().tables.polled_group_keys.remove(group);
        Ok(())
    }

    fn create_legacy_group(&self, record: &LegacyGroupRecord) -> Result<()> {
        self.lock().tables.legacy_groups.insert(
            record.group_id,
            LegacyGroupRow {
                record: record.clone(),
                active: true,
            },
        );
        Ok(())
    }

    fn set_group_active(&self, group: &AccountId, active: bool) -> Result<()> {
        let mut state = self.lock();
        let row = state
            .tables
            .legacy_groups
            .get_mut(group)
            .ok_or(StorageError::GroupNotFound(*group))?;
        row.active = active;
        Ok(())
    }

    fn remove_group_member(&self, group: &AccountId, member: &AccountId) -> Result<()> {
        let mut state = self.lock();
        if let Some(row) = state.tables.legacy_groups.get_mut(group) {
            row.record.members.retain(|m| m != member);
            row.record.admins.retain(|m| m != member);
        }
        Ok(())
    }

    fn add_encryption_key_pair(
        &self,
        group: &AccountId,
        pair: &EncryptionKeyPair,
        timestamp_ms: i64,
    ) -> Result<()> {
        let mut state = self.lock();
        let pairs = state.tables.key_pairs.entry(*group).or_default();
        if !pairs.iter().any(|(existing, _)| existing == pair) {
            pairs.push((pair.clone(), timestamp_ms));
        }
        Ok(())
    }

    fn remove_encryption_key_pairs(&self, group: &AccountId) -> Result<()> {
        self.lock().tables.key_pairs.remove(group);
        Ok(())
    }

    fn in_transaction(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let saved = {
            let mut state = self.lock();
            state.transactions += 1;
            state.tables.clone()
        };
        let result = work();
        if result.is_err() {
            self.lock().tables = saved;
        }
        result
    }
}
