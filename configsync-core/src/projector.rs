/// Config Projector
///
/// Applies the materialized state of merged configs to the local database:
/// threads appear and disappear, pin state follows priorities, and group
/// deletion watermarks redact old messages. Every pass reads the current
/// snapshot and reconciles against what is stored, so applying the same
/// snapshot twice leaves the database unchanged after the first pass.
///
/// Missing preconditions (no local account, no thread for a group) skip the
/// affected step with a log line; they never fail the pass.

use configsync_protocol::address::Address;
use configsync_protocol::ids::AccountId;
use configsync_protocol::limits::secs_to_ms;
use configsync_protocol::signing::SwarmAuth;
use configsync_protocol::snapshot::{
    is_hidden, is_pinned, ClosedGroupInfo, CommunityInfo, Contact, GroupEntry, LegacyGroupInfo,
};
use configsync_protocol::storage::{
    self, EncryptionKeyPair, LegacyGroupRecord, LocalDatabase, MessageId, StorageError, ThreadId,
};
use configsync_protocol::store::UserGroupsConfig;
use configsync_protocol::types::{MergeNotification, UserConfigType};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::bus::NotificationReceiver;
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SyncError};
use crate::factory::ConfigFactory;
use crate::identity::LocalIdentity;
use crate::settings::SyncSettings;
use crate::swarm::SwarmClient;

const TARGET: &str = "configsync::projector";

/// Side effects of projection that live outside the database.
///
/// All methods default to no-ops.
pub trait ProjectionHooks: Send + Sync {
    /// A community in the snapshot has no local thread yet.
    fn schedule_community_join(&self, _server_url: &str, _room: &str, _pubkey_hex: &str) {}

    fn leave_community(&self, _server_url: &str, _room: &str) {}

    fn subscribe_legacy_group_push(&self, _group: &AccountId) {}

    fn unsubscribe_legacy_group_push(&self, _group: &AccountId) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default)]
pub struct NoopHooks;

impl ProjectionHooks for NoopHooks {}

pub struct ConfigProjector {
    factory: Arc<ConfigFactory>,
    db: Arc<dyn LocalDatabase>,
    swarm: Arc<dyn SwarmClient>,
    identity: Arc<LocalIdentity>,
    hooks: Arc<dyn ProjectionHooks>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ConfigProjector {
    pub fn new(
        factory: Arc<ConfigFactory>,
        db: Arc<dyn LocalDatabase>,
        swarm: Arc<dyn SwarmClient>,
        identity: Arc<LocalIdentity>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            factory,
            db,
            swarm,
            identity,
            hooks: Arc::new(NoopHooks),
            clock: Arc::new(SystemClock),
            settings,
            listener: Mutex::new(None),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ProjectionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Project every merge notification as it arrives, one transaction per
    /// notification.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if listener.is_some() {
            return Err(SyncError::AlreadyStarted);
        }
        let handle = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let this = Arc::clone(self);
        let notifications = self.factory.subscribe();
        *listener = Some(handle.spawn(async move { this.listen(notifications).await }));
        log::info!(target: TARGET, "Config projector started");
        Ok(())
    }

    pub fn shutdown(&self) {
        if let Some(listener) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            listener.abort();
        }
    }

    async fn listen(&self, mut notifications: NotificationReceiver) {
        loop {
            match notifications.recv().await {
                Ok(MergeNotification::UserConfigsMerged(config_type)) => {
                    self.project_user_configs(config_type)
                }
                Ok(MergeNotification::GroupConfigsUpdated(group_id)) => {
                    self.project_group_configs(&group_id)
                }
                Ok(MergeNotification::UserConfigsModified) => {}
                Err(RecvError::Lagged(skipped)) => {
                    // Missed merges are recovered by projecting everything
                    log::warn!(target: TARGET, "Projector lagged by {} notifications", skipped);
                    for config_type in UserConfigType::ALL {
                        self.project_user_configs(config_type);
                    }
                    for group_id in self.factory.active_group_ids() {
                        self.project_group_configs(&group_id);
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    fn project_user_configs(&self, config_type: UserConfigType) {
        let result = self.project_in_transaction(&mut |departed| {
            self.apply_user_configs(config_type, None, departed)
        });
        if let Err(e) = result {
            log::error!(target: TARGET, "Failed to project {}: {}", config_type, e);
        }
    }

    /// Run one projection pass in a transaction. Stores of groups the pass
    /// removed are dropped only after it commits.
    fn project_in_transaction(
        &self,
        work: &mut dyn FnMut(&mut Vec<AccountId>) -> storage::Result<()>,
    ) -> storage::Result<()> {
        let mut departed = Vec::new();
        self.db.in_transaction(&mut || {
            departed.clear();
            work(&mut departed)
        })?;
        self.drop_group_configs(&departed);
        Ok(())
    }

    fn drop_group_configs(&self, departed: &[AccountId]) {
        for group_id in departed {
            self.factory.remove_group_configs(group_id);
        }
    }

    fn project_group_configs(&self, group_id: &AccountId) {
        let result = self
            .db
            .in_transaction(&mut || self.sync_group_configs(group_id));
        if let Err(e) = result {
            log::error!(target: TARGET, "Failed to project {:?}: {}", group_id, e);
        }
    }

    // ── User configs ───────────────────────────────────────────────────────

    /// Apply one user config type's snapshot.
    ///
    /// `update_timestamp` tags a contacts batch that echoes a local edit.
    /// Callers wrap the pass in a transaction. Stores of closed groups that
    /// left the config are dropped once the pass has succeeded.
    pub fn sync_user_configs(
        &self,
        config_type: UserConfigType,
        update_timestamp: Option<i64>,
    ) -> storage::Result<()> {
        let mut departed = Vec::new();
        self.apply_user_configs(config_type, update_timestamp, &mut departed)?;
        self.drop_group_configs(&departed);
        Ok(())
    }

    fn apply_user_configs(
        &self,
        config_type: UserConfigType,
        update_timestamp: Option<i64>,
        departed: &mut Vec<AccountId>,
    ) -> storage::Result<()> {
        if !self.factory.is_logged_in() {
            log::debug!(target: TARGET, "No user configs loaded, skipping {}", config_type);
            return Ok(());
        }
        match config_type {
            UserConfigType::UserProfile => self.sync_user_profile(),
            UserConfigType::Contacts => self.sync_contacts(update_timestamp),
            UserConfigType::ConvoInfoVolatile => self.sync_convo_info_volatile(),
            UserConfigType::UserGroups => self.sync_user_groups(departed),
        }
    }

    fn sync_user_profile(&self) -> storage::Result<()> {
        let Some(profile) = self.factory.with_user_configs(|c| c.profile.profile()) else {
            return Ok(());
        };
        if is_hidden(profile.nts_priority) {
            return self.db.set_note_to_self_hidden(true);
        }
        let Some(me) = self.identity.account_id() else {
            log::warn!(target: TARGET, "No local account, skipping note to self");
            return Ok(());
        };

        let thread = self.db.get_or_create_thread(&Address::Standard(me))?;
        self.db.set_has_sent(thread, true)?;
        self.db.set_pinned(thread, is_pinned(profile.nts_priority))?;
        self.db.set_note_to_self_hidden(false)
    }

    fn sync_contacts(&self, update_timestamp: Option<i64>) -> storage::Result<()> {
        let Some(contacts) = self.factory.with_user_configs(|c| c.contacts.all()) else {
            return Ok(());
        };
        let contacts: Vec<Contact> = contacts
            .into_iter()
            .filter(|contact| !contact.account_id.is_blinded())
            .collect();
        log::debug!(target: TARGET, "Syncing {} contact(s)", contacts.len());
        self.db.add_contacts(&contacts, update_timestamp)
    }

    fn sync_convo_info_volatile(&self) -> storage::Result<()> {
        let Some(entries) = self
            .factory
            .with_user_configs(|c| c.convo_info_volatile.all())
        else {
            return Ok(());
        };

        for entry in entries {
            if entry.address.is_blinded() {
                continue;
            }
            let Some(thread) = self.db.thread_id(&entry.address)? else {
                continue;
            };
            if entry.last_read_ms > self.db.last_seen(thread)? {
                self.db.mark_conversation_read(thread, entry.last_read_ms)?;
                self.db.update_thread(thread)?;
            }
        }
        Ok(())
    }

    fn sync_user_groups(&self, departed: &mut Vec<AccountId>) -> storage::Result<()> {
        let Some(entries) = self.factory.with_user_configs(|c| c.user_groups.all()) else {
            return Ok(());
        };
        let wanted: HashSet<Address> = entries.iter().map(GroupEntry::address).collect();

        for (thread, address) in self.db.threads()? {
            if wanted.contains(&address) {
                continue;
            }
            match &address {
                Address::Community { server_url, room } => {
                    log::info!(target: TARGET, "Leaving community {}", room);
                    self.hooks.leave_community(server_url, room);
                    self.db.delete_thread(thread)?;
                }
                Address::LegacyGroup(group) => self.remove_legacy_group(thread, group)?,
                Address::Group(group) => {
                    log::info!(target: TARGET, "Group {:?} left the config, removing", group);
                    self.db.delete_thread(thread)?;
                    departed.push(*group);
                }
                _ => {}
            }
        }

        for entry in &entries {
            match entry {
                GroupEntry::Community(community) => self.sync_community(community)?,
                GroupEntry::LegacyGroup(group) => self.sync_legacy_group(group)?,
                GroupEntry::ClosedGroup(group) => self.sync_closed_group(group)?,
            }
        }
        Ok(())
    }

    fn sync_community(&self, community: &CommunityInfo) -> storage::Result<()> {
        let address = Address::community(&community.base_url, &community.room);
        match self.db.thread_id(&address)? {
            Some(thread) => self.db.set_pinned(thread, is_pinned(community.priority)),
            None => {
                self.hooks.schedule_community_join(
                    &community.base_url,
                    &community.room,
                    &community.pubkey_hex,
                );
                Ok(())
            }
        }
    }

    fn sync_legacy_group(&self, group: &LegacyGroupInfo) -> storage::Result<()> {
        let address = Address::LegacyGroup(group.account_id);
        if let Some(thread) = self.db.thread_id(&address)? {
            return self.db.set_pinned(thread, is_pinned(group.priority));
        }

        let formation_ms = secs_to_ms(group.joined_at_secs);
        self.db.create_legacy_group(&LegacyGroupRecord {
            group_id: group.account_id,
            name: group.name.clone(),
            members: group.members.keys().copied().collect(),
            admins: group.admins(),
            formation_ms,
        })?;
        self.db.add_closed_group_public_key(&group.account_id)?;
        if !group.enc_pub_key.is_empty() && !group.enc_sec_key.is_empty() {
            let pair = EncryptionKeyPair {
                public_key: group.enc_pub_key.clone(),
                secret_key: group.enc_sec_key.clone(),
            };
            self.db
                .add_encryption_key_pair(&group.account_id, &pair, self.clock.now_ms())?;
        }
        self.hooks.subscribe_legacy_group_push(&group.account_id);

        let thread = self.db.get_or_create_thread(&address)?;
        self.db.set_creation_date(thread, formation_ms)?;
        self.db.set_pinned(thread, is_pinned(group.priority))?;
        log::info!(target: TARGET, "Joined legacy group {:?}", group.account_id);
        Ok(())
    }

    fn remove_legacy_group(&self, thread: ThreadId, group: &AccountId) -> storage::Result<()> {
        match self.db.set_group_active(group, false) {
            Ok(()) | Err(StorageError::GroupNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.db.remove_closed_group_public_key(group)?;
        self.db.remove_encryption_key_pairs(group)?;
        if let Some(me) = self.identity.account_id() {
            self.db.remove_group_member(group, &me)?;
        }
        self.hooks.unsubscribe_legacy_group_push(group);
        self.db.delete_thread(thread)?;
        log::info!(target: TARGET, "Removed legacy group {:?}", group);
        Ok(())
    }

    fn sync_closed_group(&self, group: &ClosedGroupInfo) -> storage::Result<()> {
        let address = Address::Group(group.group_id);
        match self.db.thread_id(&address)? {
            Some(thread) => {
                if group.destroyed {
                    self.purge_destroyed_group(thread, &group.group_id)?;
                }
                self.db.set_pinned(thread, is_pinned(group.priority))
            }
            None if group.destroyed => Ok(()),
            None => {
                let thread = self.db.get_or_create_thread(&address)?;
                self.db
                    .set_creation_date(thread, secs_to_ms(group.joined_at_secs))?;
                self.db.set_pinned(thread, is_pinned(group.priority))
            }
        }
    }

    fn purge_destroyed_group(&self, thread: ThreadId, group: &AccountId) -> storage::Result<()> {
        let removed = self.db.clear_messages(thread)?;
        if removed > 0 {
            log::info!(
                target: TARGET,
                "Group {:?} destroyed, purged {} message(s)",
                group,
                removed
            );
        }
        Ok(())
    }

    // ── Group configs ──────────────────────────────────────────────────────

    /// Apply one group's info snapshot: name mirror, destruction and
    /// deletion watermarks.
    pub fn sync_group_configs(&self, group_id: &AccountId) -> storage::Result<()> {
        let Some(info) = self
            .factory
            .with_group_configs(group_id, |g| g.info.info())
        else {
            log::debug!(target: TARGET, "No configs loaded for {:?}", group_id);
            return Ok(());
        };

        let Some(thread) = self.db.thread_id(&Address::Group(*group_id))? else {
            log::debug!(target: TARGET, "No thread for {:?}, skipping", group_id);
            return Ok(());
        };

        // An unnamed info leaves the user-groups name as it is
        if let Some(name) = &info.name {
            self.mirror_group_name(group_id, name);
        }

        if info.destroyed {
            return self.purge_destroyed_group(thread, group_id);
        }

        let mut remote_hashes = Vec::new();
        if let Some(secs) = info.delete_before_secs {
            self.apply_delete_before(thread, secs_to_ms(secs), &mut remote_hashes)?;
        }
        if let Some(secs) = info.delete_attachments_before_secs {
            self.apply_delete_attachments_before(thread, secs_to_ms(secs))?;
        }
        if !remote_hashes.is_empty() {
            self.delete_remote_messages(group_id, remote_hashes);
        }
        Ok(())
    }

    fn mirror_group_name(&self, group_id: &AccountId, name: &str) {
        let stale = self
            .factory
            .with_user_configs(|c| c.user_groups.closed_group(group_id))
            .flatten()
            .filter(|entry| entry.name.as_deref() != Some(name));
        if let Some(mut entry) = stale {
            entry.name = Some(name.to_string());
            self.factory.with_mutable_user_configs(|c| {
                c.user_groups.set(GroupEntry::ClosedGroup(entry))
            });
        }
    }

    /// Redact visible messages and hard-delete control messages at or before
    /// the watermark.
    fn apply_delete_before(
        &self,
        thread: ThreadId,
        before_ms: i64,
        remote_hashes: &mut Vec<String>,
    ) -> storage::Result<()> {
        let mut control: Vec<MessageId> = Vec::new();
        let mut redacted = 0usize;
        for message in self.db.messages_before(thread, before_ms)? {
            if message.is_control {
                control.push(message.id);
            } else if !message.deleted_locally {
                self.db
                    .mark_deleted_locally(message.id, &self.settings.deleted_message_placeholder)?;
                redacted += 1;
            } else {
                continue;
            }
            remote_hashes.extend(message.server_hash.filter(|hash| !hash.is_empty()));
        }
        if !control.is_empty() {
            self.db.delete_messages(&control)?;
        }
        if redacted > 0 || !control.is_empty() {
            log::info!(
                target: TARGET,
                "Redacted {} and deleted {} message(s) before {}",
                redacted,
                control.len(),
                before_ms
            );
        }
        Ok(())
    }

    /// Redact attachment messages at or before the watermark. Local only.
    fn apply_delete_attachments_before(&self, thread: ThreadId, before_ms: i64) -> storage::Result<()> {
        for message in self.db.messages_before(thread, before_ms)? {
            if !message.has_attachments || message.is_voice_note || message.deleted_locally {
                continue;
            }
            self.db
                .mark_deleted_locally(message.id, &self.settings.deleted_message_placeholder)?;
        }
        Ok(())
    }

    /// Ask the group swarm to drop the same messages. Admins only, fire and
    /// forget: nothing tracks whether it landed.
    fn delete_remote_messages(&self, group_id: &AccountId, hashes: Vec<String>) {
        let admin_key = self
            .factory
            .group_authority(group_id)
            .and_then(|authority| authority.admin_key);
        let Some(admin_key) = admin_key else {
            log::debug!(target: TARGET, "Not an admin of {:?}, keeping remote messages", group_id);
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            log::warn!(target: TARGET, "No runtime for remote message delete");
            return;
        };

        let swarm = Arc::clone(&self.swarm);
        let group_id = *group_id;
        let auth = SwarmAuth::for_group(group_id, &admin_key);
        handle.spawn(async move {
            let count = hashes.len();
            let result = match swarm.resolve_node(&group_id).await {
                Ok(node) => swarm.delete(&node, auth.delete_request(hashes)).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => log::debug!(
                    target: TARGET,
                    "Deleted {} message(s) from {:?} swarm",
                    count,
                    group_id
                ),
                Err(e) => log::warn!(
                    target: TARGET,
                    "Failed to delete messages from {:?} swarm: {}",
                    group_id,
                    e
                ),
            }
        });
    }
}
