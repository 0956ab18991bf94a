/// Config Push Coordinator
///
/// Decides when dirty config state is pushed to the swarm. Two long-lived
/// listen loops, one for user-scoped configs and one for group configs,
/// consume merge notifications, debounce them, and run one push cycle at a
/// time per scope. A cycle gathers every pending payload, stores them
/// concurrently, and confirms all results under one lock.
///
/// Failed cycles are retried at a uniform interval. A cycle that is being
/// retried blocks its own loop, so the next cycle for that scope only starts
/// once it is done.

use anyhow::Context;
use configsync_protocol::ids::AccountId;
use configsync_protocol::signing::{AdminKey, SwarmAuth};
use configsync_protocol::types::{
    ConfigType, MergeNotification, PushPayload, PushResult, PushedConfig,
};
use futures::future::try_join_all;
use std::future::pending;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::bus::NotificationReceiver;
use crate::clock::{Clock, SystemClock};
use crate::debounce::Debouncer;
use crate::error::{Result, SyncError};
use crate::factory::ConfigFactory;
use crate::identity::LocalIdentity;
use crate::retry::retry_with_uniform_interval;
use crate::settings::SyncSettings;
use crate::swarm::{Node, SwarmClient};

const TARGET: &str = "configsync::coordinator";

pub struct ConfigPushCoordinator {
    factory: Arc<ConfigFactory>,
    swarm: Arc<dyn SwarmClient>,
    identity: Arc<LocalIdentity>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    /// Network availability; a rising edge triggers an immediate cycle
    connectivity: Option<watch::Receiver<bool>>,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConfigPushCoordinator {
    pub fn new(
        factory: Arc<ConfigFactory>,
        swarm: Arc<dyn SwarmClient>,
        identity: Arc<LocalIdentity>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            factory,
            swarm,
            identity,
            clock: Arc::new(SystemClock),
            settings,
            connectivity: None,
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Push whenever the network comes back, without waiting for an edit.
    pub fn with_connectivity(mut self, online: watch::Receiver<bool>) -> Self {
        self.connectivity = Some(online);
        self
    }

    /// Spawn the user and group listen loops on the current runtime.
    ///
    /// # Returns
    /// `SyncError::AlreadyStarted` if this coordinator was started before
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SyncError::AlreadyStarted);
        }
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(SyncError::NoRuntime);
            }
        };

        let user_loop = handle.spawn(Arc::clone(self).user_loop(
            self.factory.subscribe(),
            self.connectivity.clone(),
        ));
        let group_loop = handle.spawn(Arc::clone(self).group_loop(
            self.factory.subscribe(),
            self.connectivity.clone(),
        ));
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([user_loop, group_loop]);

        log::info!(target: TARGET, "Config push coordinator started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|task| !task.is_finished())
    }

    /// Stop scheduling cycles. An in-flight push is abandoned.
    pub fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }
        log::info!(target: TARGET, "Config push coordinator shut down");
    }

    // ── Listen loops ───────────────────────────────────────────────────────

    async fn user_loop(
        self: Arc<Self>,
        mut notifications: NotificationReceiver,
        mut online: Option<watch::Receiver<bool>>,
    ) {
        let mut debouncer = Debouncer::new(self.settings.debounce());
        loop {
            let deadline = debouncer.next_deadline();
            tokio::select! {
                received = notifications.recv() => match received {
                    Ok(MergeNotification::UserConfigsModified) => debouncer.trigger(()),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!(target: TARGET, "User loop lagged by {} notifications", skipped);
                        debouncer.trigger(());
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = next_online(&mut online) => debouncer.trigger_now(()),
                _ = sleep_until_deadline(deadline) => {
                    if !debouncer.take_due().is_empty() {
                        self.run_user_cycle().await;
                    }
                }
            }
        }
        log::debug!(target: TARGET, "User loop exited");
    }

    async fn group_loop(
        self: Arc<Self>,
        mut notifications: NotificationReceiver,
        mut online: Option<watch::Receiver<bool>>,
    ) {
        let mut debouncer: Debouncer<AccountId> = Debouncer::new(self.settings.debounce());
        loop {
            let deadline = debouncer.next_deadline();
            tokio::select! {
                received = notifications.recv() => match received {
                    Ok(MergeNotification::GroupConfigsUpdated(group_id)) => debouncer.trigger(group_id),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!(target: TARGET, "Group loop lagged by {} notifications", skipped);
                        for group_id in self.factory.active_group_ids() {
                            debouncer.trigger(group_id);
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = next_online(&mut online) => {
                    for group_id in self.factory.active_group_ids() {
                        debouncer.trigger_now(group_id);
                    }
                }
                _ = sleep_until_deadline(deadline) => {
                    for group_id in debouncer.take_due() {
                        self.run_group_cycle(&group_id).await;
                    }
                }
            }
        }
        log::debug!(target: TARGET, "Group loop exited");
    }

    async fn run_user_cycle(&self) {
        let result = retry_with_uniform_interval(
            self.settings.max_retries,
            self.settings.retry_interval(),
            "user config push",
            move || self.push_user_configs(),
        )
        .await;
        if let Err(e) = result {
            log::error!(target: TARGET, "Giving up on user config push: {:#}", e);
        }
    }

    async fn run_group_cycle(&self, group_id: &AccountId) {
        let result = retry_with_uniform_interval(
            self.settings.max_retries,
            self.settings.retry_interval(),
            "group config push",
            move || self.push_group_configs(group_id),
        )
        .await;
        if let Err(e) = result {
            log::error!(target: TARGET, "Giving up on {:?} config push: {:#}", group_id, e);
        }
    }

    // ── Push cycles ────────────────────────────────────────────────────────

    /// One user push cycle: store every dirty user config concurrently, then
    /// confirm all of them at once. No network call when nothing is dirty.
    pub async fn push_user_configs(&self) -> anyhow::Result<()> {
        let Some(auth) = self.identity.auth() else {
            log::info!(target: TARGET, "No logged-in user, skipping config push");
            return Ok(());
        };
        let pending = match self.factory.pending_user_pushes() {
            Ok(pending) => pending,
            Err(SyncError::NotLoggedIn) => {
                log::info!(target: TARGET, "User configs not loaded, skipping config push");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if pending.is_empty() {
            log::debug!(target: TARGET, "No user config needs a push");
            return Ok(());
        }

        let node = self
            .swarm
            .resolve_node(auth.account_id())
            .await
            .context("resolving user swarm node")?;
        let timestamp_ms = self.clock.now_ms();
        let (node, auth) = (&node, &auth);

        let pushed = try_join_all(pending.into_iter().map(|(config_type, payload)| async move {
            let result = self
                .push_one(node, auth, config_type.namespace(), &payload, timestamp_ms)
                .await
                .with_context(|| format!("pushing {config_type}"))?;
            Ok::<_, anyhow::Error>((
                config_type,
                PushedConfig {
                    seq_no: payload.seq_no,
                    result,
                },
            ))
        }))
        .await?;

        self.factory.confirm_user_configs_pushed(&pushed)?;
        log::info!(target: TARGET, "Pushed {} user config(s)", pushed.len());
        Ok(())
    }

    /// One group push cycle. A silent no-op unless the user holds the
    /// group's admin key.
    pub async fn push_group_configs(&self, group_id: &AccountId) -> anyhow::Result<()> {
        let Some(authority) = self.factory.group_authority(group_id) else {
            log::debug!(target: TARGET, "Unknown group {:?}, nothing to push", group_id);
            return Ok(());
        };
        let Some(admin_key) = authority.admin_key else {
            log::debug!(target: TARGET, "Not an admin of {:?}, nothing to push", group_id);
            return Ok(());
        };
        self.push_group_configs_with(&admin_key, group_id).await
    }

    /// Push a group's pending members, info and keys with an explicit admin
    /// key, e.g. right after creating the group.
    pub async fn push_group_configs_with(
        &self,
        admin_key: &AdminKey,
        group_id: &AccountId,
    ) -> anyhow::Result<()> {
        let Some(pending) = self.factory.pending_group_pushes(group_id)? else {
            log::debug!(target: TARGET, "No configs loaded for {:?}", group_id);
            return Ok(());
        };
        if pending.is_empty() {
            return Ok(());
        }

        let auth = SwarmAuth::for_group(*group_id, admin_key);
        let node = self
            .swarm
            .resolve_node(group_id)
            .await
            .with_context(|| format!("resolving swarm node for {group_id:?}"))?;
        let timestamp_ms = self.clock.now_ms();

        // Members and info are encrypted under the rotation, so it lands first
        let keys = match &pending.keys {
            Some(rotation) => {
                let request = auth.store_request(
                    ConfigType::GroupKeys.namespace(),
                    rotation,
                    self.settings.config_ttl_ms,
                    timestamp_ms,
                );
                let result = self
                    .swarm
                    .store(&node, request)
                    .await
                    .context("pushing group-keys")?;
                Some((rotation.clone(), result))
            }
            None => None,
        };

        let members = self.push_optional(
            &node,
            &auth,
            ConfigType::GroupMembers,
            pending.members.as_ref(),
            timestamp_ms,
        );
        let info = self.push_optional(
            &node,
            &auth,
            ConfigType::GroupInfo,
            pending.info.as_ref(),
            timestamp_ms,
        );
        let (members, info) = futures::try_join!(members, info)?;
        self.factory
            .confirm_group_configs_pushed(group_id, members, info, keys)?;
        log::info!(target: TARGET, "Pushed configs for {:?}", group_id);
        Ok(())
    }

    async fn push_optional(
        &self,
        node: &Node,
        auth: &SwarmAuth,
        config_type: ConfigType,
        payload: Option<&PushPayload>,
        timestamp_ms: i64,
    ) -> anyhow::Result<Option<PushedConfig>> {
        let Some(payload) = payload else {
            return Ok(None);
        };
        let result = self
            .push_one(node, auth, config_type.namespace(), payload, timestamp_ms)
            .await
            .with_context(|| format!("pushing {config_type}"))?;
        Ok(Some(PushedConfig {
            seq_no: payload.seq_no,
            result,
        }))
    }

    /// Store one payload, then delete the blobs it supersedes. The delete is
    /// best effort and never fails the push.
    async fn push_one(
        &self,
        node: &Node,
        auth: &SwarmAuth,
        namespace: i32,
        payload: &PushPayload,
        timestamp_ms: i64,
    ) -> anyhow::Result<PushResult> {
        let request = auth.store_request(
            namespace,
            &payload.data,
            self.settings.config_ttl_ms,
            timestamp_ms,
        );
        let result = self.swarm.store(node, request).await?;

        if !payload.obsolete_hashes.is_empty() {
            let hashes: Vec<String> = payload.obsolete_hashes.iter().cloned().collect();
            let count = hashes.len();
            match self.swarm.delete(node, auth.delete_request(hashes)).await {
                Ok(()) => log::debug!(
                    target: TARGET,
                    "Deleted {} obsolete hash(es) in namespace {}",
                    count,
                    namespace
                ),
                Err(e) => log::warn!(
                    target: TARGET,
                    "Failed to delete {} obsolete hash(es) in namespace {}: {}",
                    count,
                    namespace,
                    e
                ),
            }
        }
        Ok(result)
    }
}

/// Resolve on the next false-to-true transition. Never resolves without a
/// connectivity source.
async fn next_online(online: &mut Option<watch::Receiver<bool>>) {
    loop {
        let Some(rx) = online.as_mut() else {
            return pending().await;
        };
        if rx.changed().await.is_err() {
            *online = None;
            continue;
        }
        if *rx.borrow_and_update() {
            return;
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
