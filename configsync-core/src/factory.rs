/// Config Factory
///
/// Owns every config store of the logged-in account: one user bundle and
/// one bundle per joined closed group. All access goes through short
/// closures under the bundle's lock, and every state change that others
/// must react to is published on the notification bus.
///
/// Lock order is user bundle before group map; no method holds both.

use configsync_protocol::ids::AccountId;
use configsync_protocol::store::{ConfigStore, GroupConfigs, UserConfigs, UserGroupsConfig};
use configsync_protocol::types::{
    ConfigMessage, ConfigType, GroupAuthority, MergeNotification, PushPayload, PushResult,
    PushedConfig, UserConfigType,
};
use configsync_protocol::snapshot::GroupEntry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::bus::{NotificationBus, NotificationReceiver};
use crate::error::{Result, SyncError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn pending_push<S: ConfigStore + ?Sized>(store: &mut S, group_id: &AccountId) -> Option<PushPayload> {
    if !store.needs_push() {
        return None;
    }
    match store.push() {
        Ok(payload) => Some(payload),
        Err(e) => {
            log::warn!(
                target: "configsync::factory",
                "Skipping {} push for {:?}: {}",
                store.config_type(),
                group_id,
                e
            );
            None
        }
    }
}

/// Pending pushes of one group, gathered under a single lock.
#[derive(Debug, Default)]
pub struct GroupPushes {
    pub members: Option<PushPayload>,
    pub info: Option<PushPayload>,
    /// Pending key rotation, pushed without an obsolete-hash delete.
    pub keys: Option<Vec<u8>>,
}

impl GroupPushes {
    pub fn is_empty(&self) -> bool {
        self.members.is_none() && self.info.is_none() && self.keys.is_none()
    }
}

pub struct ConfigFactory {
    user: Mutex<Option<UserConfigs>>,
    groups: Mutex<HashMap<AccountId, GroupConfigs>>,
    bus: NotificationBus,
}

impl ConfigFactory {
    pub fn new(bus: NotificationBus) -> Self {
        Self {
            user: Mutex::new(None),
            groups: Mutex::new(HashMap::new()),
            bus,
        }
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn subscribe(&self) -> NotificationReceiver {
        self.bus.subscribe()
    }

    // ── Account lifecycle ──────────────────────────────────────────────────

    /// Install the user stores at account login.
    pub fn login(&self, configs: UserConfigs) {
        *lock(&self.user) = Some(configs);
        log::info!(target: "configsync::factory", "User configs loaded");
    }

    /// Drop every store at logout / account reset.
    pub fn logout(&self) {
        *lock(&self.user) = None;
        lock(&self.groups).clear();
        log::info!(target: "configsync::factory", "All configs dropped");
    }

    pub fn is_logged_in(&self) -> bool {
        lock(&self.user).is_some()
    }

    // ── User configs ───────────────────────────────────────────────────────

    /// Read the user stores. `None` when logged out.
    pub fn with_user_configs<R>(&self, f: impl FnOnce(&UserConfigs) -> R) -> Option<R> {
        lock(&self.user).as_ref().map(f)
    }

    /// Edit the user stores, announcing `UserConfigsModified` if anything is
    /// left to push afterwards.
    pub fn with_mutable_user_configs<R>(&self, f: impl FnOnce(&mut UserConfigs) -> R) -> Option<R> {
        let (result, dirty) = {
            let mut guard = lock(&self.user);
            let configs = guard.as_mut()?;
            let result = f(configs);
            (result, configs.any_needs_push())
        };
        if dirty {
            self.bus.publish(MergeNotification::UserConfigsModified);
        }
        Some(result)
    }

    /// Merge remote blobs into one user store.
    pub fn merge_user_configs(
        &self,
        config_type: UserConfigType,
        messages: &[ConfigMessage],
    ) -> Result<usize> {
        let (accepted, dirty) = {
            let mut guard = lock(&self.user);
            let configs = guard.as_mut().ok_or(SyncError::NotLoggedIn)?;
            let accepted = configs.merge(config_type, messages)?;
            (accepted, configs.needs_push(config_type))
        };
        log::debug!(
            target: "configsync::factory",
            "Merged {}/{} {} messages",
            accepted,
            messages.len(),
            config_type
        );
        if accepted > 0 {
            self.bus
                .publish(MergeNotification::UserConfigsMerged(config_type));
        }
        if dirty {
            self.bus.publish(MergeNotification::UserConfigsModified);
        }
        Ok(accepted)
    }

    /// Gather a payload from every user store that needs a push, in the
    /// fixed enumeration order. A store that fails to produce one is
    /// skipped.
    pub fn pending_user_pushes(&self) -> Result<Vec<(UserConfigType, PushPayload)>> {
        let mut guard = lock(&self.user);
        let configs = guard.as_mut().ok_or(SyncError::NotLoggedIn)?;
        let mut pending = Vec::new();
        for config_type in UserConfigType::ALL {
            if !configs.needs_push(config_type) {
                continue;
            }
            match configs.push(config_type) {
                Ok(payload) => pending.push((config_type, payload)),
                Err(e) => log::warn!(
                    target: "configsync::factory",
                    "Skipping {} push: {}",
                    config_type,
                    e
                ),
            }
        }
        Ok(pending)
    }

    /// Confirm every push of one cycle under a single lock.
    pub fn confirm_user_configs_pushed(
        &self,
        pushed: &[(UserConfigType, PushedConfig)],
    ) -> Result<()> {
        let mut guard = lock(&self.user);
        let configs = guard.as_mut().ok_or(SyncError::NotLoggedIn)?;
        for (config_type, confirmed) in pushed {
            configs.confirm_pushed(*config_type, confirmed.seq_no, &confirmed.result.hash);
        }
        Ok(())
    }

    /// Resolve write authority over a group from the user-groups config.
    /// `None` when the group is unknown.
    pub fn group_authority(&self, group_id: &AccountId) -> Option<GroupAuthority> {
        let entry = self
            .with_user_configs(|configs| configs.user_groups.closed_group(group_id))
            .flatten()?;
        Some(GroupAuthority {
            group_id: *group_id,
            admin_key: entry.admin_key,
        })
    }

    /// Closed groups the user is still part of.
    pub fn active_group_ids(&self) -> Vec<AccountId> {
        self.with_user_configs(|configs| {
            configs
                .user_groups
                .all()
                .into_iter()
                .filter_map(|entry| match entry {
                    GroupEntry::ClosedGroup(g) if !g.destroyed && !g.kicked => Some(g.group_id),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
    }

    // ── Group configs ──────────────────────────────────────────────────────

    /// Install a group's stores when the user joins or creates it.
    pub fn create_group_configs(&self, group_id: AccountId, configs: GroupConfigs) {
        lock(&self.groups).insert(group_id, configs);
        log::debug!(target: "configsync::factory", "Group configs created for {:?}", group_id);
    }

    pub fn has_group_configs(&self, group_id: &AccountId) -> bool {
        lock(&self.groups).contains_key(group_id)
    }

    /// Drop a group's stores when it is left or destroyed.
    pub fn remove_group_configs(&self, group_id: &AccountId) -> bool {
        let removed = lock(&self.groups).remove(group_id).is_some();
        if removed {
            log::debug!(target: "configsync::factory", "Group configs removed for {:?}", group_id);
        }
        removed
    }

    pub fn with_group_configs<R>(
        &self,
        group_id: &AccountId,
        f: impl FnOnce(&GroupConfigs) -> R,
    ) -> Option<R> {
        lock(&self.groups).get(group_id).map(f)
    }

    /// Edit a group's stores, announcing `GroupConfigsUpdated`.
    pub fn with_mutable_group_configs<R>(
        &self,
        group_id: &AccountId,
        f: impl FnOnce(&mut GroupConfigs) -> R,
    ) -> Option<R> {
        let result = lock(&self.groups).get_mut(group_id).map(f)?;
        self.bus
            .publish(MergeNotification::GroupConfigsUpdated(*group_id));
        Some(result)
    }

    pub fn merge_group_configs(
        &self,
        group_id: &AccountId,
        config_type: ConfigType,
        messages: &[ConfigMessage],
    ) -> Result<usize> {
        let accepted = {
            let mut groups = lock(&self.groups);
            let configs = groups
                .get_mut(group_id)
                .ok_or(SyncError::UnknownGroup(*group_id))?;
            configs.merge(config_type, messages)?
        };
        if accepted > 0 {
            self.bus
                .publish(MergeNotification::GroupConfigsUpdated(*group_id));
        }
        Ok(accepted)
    }

    /// Gather members, info and keys pushes for a group. `None` when the
    /// group has no stores. A store that fails to produce a payload is
    /// skipped.
    pub fn pending_group_pushes(&self, group_id: &AccountId) -> Result<Option<GroupPushes>> {
        let mut groups = lock(&self.groups);
        let Some(configs) = groups.get_mut(group_id) else {
            return Ok(None);
        };
        let members = pending_push(configs.members.as_mut(), group_id);
        let info = pending_push(configs.info.as_mut(), group_id);
        let keys = configs.keys.pending_config();
        Ok(Some(GroupPushes { members, info, keys }))
    }

    /// Confirm every push of one group cycle under a single lock. Any part
    /// may be absent.
    pub fn confirm_group_configs_pushed(
        &self,
        group_id: &AccountId,
        members: Option<PushedConfig>,
        info: Option<PushedConfig>,
        keys: Option<(Vec<u8>, PushResult)>,
    ) -> Result<()> {
        let mut groups = lock(&self.groups);
        let configs = groups
            .get_mut(group_id)
            .ok_or(SyncError::UnknownGroup(*group_id))?;
        if let Some(pushed) = members {
            configs
                .members
                .confirm_pushed(pushed.seq_no, &pushed.result.hash);
        }
        if let Some(pushed) = info {
            configs.info.confirm_pushed(pushed.seq_no, &pushed.result.hash);
        }
        if let Some((pending, result)) = keys {
            if !configs
                .keys
                .load_key(&pending, &result.hash, result.timestamp_ms)
            {
                log::debug!(
                    target: "configsync::factory",
                    "Key rotation for {:?} superseded before confirmation",
                    group_id
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{memory_group_configs, memory_user_configs};
    use configsync_protocol::ids::IdPrefix;
    use configsync_protocol::signing::AdminKey;
    use configsync_protocol::snapshot::{ClosedGroupInfo, Contact, GroupInfo, UserProfile};
    use configsync_protocol::store::{
        ContactsConfig, GroupInfoConfig, UserGroupsConfig, UserProfileConfig,
    };
    use tokio::sync::broadcast::error::TryRecvError;

    fn factory() -> ConfigFactory {
        let factory = ConfigFactory::new(NotificationBus::new(16));
        factory.login(memory_user_configs());
        factory
    }

    fn contact(fill: u8) -> Contact {
        Contact::new(AccountId::new(IdPrefix::Standard, [fill; 32]))
    }

    #[test]
    fn test_mutation_publishes_modified() {
        let factory = factory();
        let mut rx = factory.subscribe();

        factory.with_mutable_user_configs(|c| c.contacts.set(contact(1)));
        assert_eq!(rx.try_recv().unwrap(), MergeNotification::UserConfigsModified);

        factory.with_user_configs(|c| c.contacts.all().len());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_pending_pushes_follow_fixed_order() {
        let factory = factory();
        factory.with_mutable_user_configs(|c| {
            c.user_groups
                .set(GroupEntry::ClosedGroup(ClosedGroupInfo::new(AccountId::new(
                    IdPrefix::Group,
                    [3u8; 32],
                ))));
            c.profile.set_profile(UserProfile {
                name: Some("me".into()),
                ..UserProfile::default()
            });
            c.contacts.set(contact(1));
        });

        let order: Vec<UserConfigType> = factory
            .pending_user_pushes()
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        assert_eq!(
            order,
            vec![
                UserConfigType::Contacts,
                UserConfigType::UserProfile,
                UserConfigType::UserGroups
            ]
        );
    }

    #[test]
    fn test_confirm_applies_all_types() {
        let factory = factory();
        factory.with_mutable_user_configs(|c| {
            c.contacts.set(contact(1));
            c.profile.set_profile(UserProfile {
                nts_priority: 1,
                ..UserProfile::default()
            });
        });
        let pending = factory.pending_user_pushes().unwrap();
        let confirmed: Vec<(UserConfigType, PushedConfig)> = pending
            .iter()
            .map(|(t, p)| {
                (
                    *t,
                    PushedConfig {
                        seq_no: p.seq_no,
                        result: PushResult {
                            hash: format!("hash-{t}"),
                            timestamp_ms: 1,
                        },
                    },
                )
            })
            .collect();
        factory.confirm_user_configs_pushed(&confirmed).unwrap();
        assert_eq!(factory.with_user_configs(|c| c.any_needs_push()), Some(false));
    }

    #[test]
    fn test_logged_out() {
        let factory = ConfigFactory::new(NotificationBus::new(4));
        assert!(factory.with_user_configs(|_| ()).is_none());
        assert!(matches!(
            factory.pending_user_pushes(),
            Err(SyncError::NotLoggedIn)
        ));

        factory.login(memory_user_configs());
        factory.create_group_configs(AccountId::new(IdPrefix::Group, [1u8; 32]), memory_group_configs());
        factory.logout();
        assert!(!factory.is_logged_in());
        assert!(!factory.has_group_configs(&AccountId::new(IdPrefix::Group, [1u8; 32])));
    }

    #[test]
    fn test_group_authority_from_user_groups() {
        let factory = factory();
        let admin = AdminKey::generate();
        let gid = admin.group_id();
        assert!(factory.group_authority(&gid).is_none());

        let mut info = ClosedGroupInfo::new(gid);
        info.admin_key = Some(admin.clone());
        factory.with_mutable_user_configs(|c| c.user_groups.set(GroupEntry::ClosedGroup(info)));

        let authority = factory.group_authority(&gid).unwrap();
        assert!(authority.is_admin());
        assert_eq!(authority.admin_key, Some(admin));
        assert_eq!(factory.active_group_ids(), vec![gid]);
    }

    #[test]
    fn test_group_pushes_and_confirmation() {
        let factory = factory();
        let gid = AccountId::new(IdPrefix::Group, [8u8; 32]);
        let mut rx = factory.subscribe();
        assert!(factory.pending_group_pushes(&gid).unwrap().is_none());

        factory.create_group_configs(gid, memory_group_configs());
        assert!(factory.pending_group_pushes(&gid).unwrap().unwrap().is_empty());

        factory.with_mutable_group_configs(&gid, |g| {
            g.info.set_info(GroupInfo {
                name: Some("climbers".into()),
                ..GroupInfo::default()
            })
        });
        assert_eq!(
            rx.try_recv().unwrap(),
            MergeNotification::GroupConfigsUpdated(gid)
        );

        let pushes = factory.pending_group_pushes(&gid).unwrap().unwrap();
        assert!(pushes.members.is_none());
        let info = pushes.info.unwrap();
        factory
            .confirm_group_configs_pushed(
                &gid,
                None,
                Some(PushedConfig {
                    seq_no: info.seq_no,
                    result: PushResult {
                        hash: "info-hash".into(),
                        timestamp_ms: 3,
                    },
                }),
                None,
            )
            .unwrap();
        assert_eq!(factory.with_group_configs(&gid, |g| g.has_pending()), Some(false));

        assert!(factory.remove_group_configs(&gid));
        assert!(matches!(
            factory.confirm_group_configs_pushed(&gid, None, None, None),
            Err(SyncError::UnknownGroup(_))
        ));
    }
}
