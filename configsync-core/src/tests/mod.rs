pub mod projection_tests;

use crate::bus::NotificationBus;
use crate::clock::FixedClock;
use crate::coordinator::ConfigPushCoordinator;
use crate::factory::ConfigFactory;
use crate::identity::LocalIdentity;
use crate::memory::{memory_user_configs, InMemoryDatabase};
use crate::projector::ConfigProjector;
use crate::settings::SyncSettings;
use crate::swarm::SwarmClient;
use configsync_protocol::ids::{AccountId, IdPrefix};
use configsync_protocol::signing::SwarmAuth;
use configsync_protocol::snapshot::Contact;
use std::sync::Arc;

pub const START_MS: i64 = 1_700_000_000_000;

/// One logged-in device of a user, wired to a shared swarm.
pub struct Device {
    pub factory: Arc<ConfigFactory>,
    pub db: Arc<InMemoryDatabase>,
    pub identity: Arc<LocalIdentity>,
    pub clock: Arc<FixedClock>,
    pub coordinator: Arc<ConfigPushCoordinator>,
    pub projector: Arc<ConfigProjector>,
}

impl Device {
    pub fn me(&self) -> AccountId {
        self.identity
            .account_id()
            .expect("device is logged in")
    }
}

/// Devices built from the same seed belong to the same account.
pub fn device(seed: u8, swarm: Arc<dyn SwarmClient>) -> Device {
    crate::logging::init(log::LevelFilter::Debug);
    let factory = Arc::new(ConfigFactory::new(NotificationBus::new(64)));
    factory.login(memory_user_configs());
    let db = Arc::new(InMemoryDatabase::new());
    let identity = Arc::new(LocalIdentity::logged_in(SwarmAuth::for_user(&[seed; 32])));
    let clock = Arc::new(FixedClock::new(START_MS));

    let coordinator = Arc::new(
        ConfigPushCoordinator::new(
            factory.clone(),
            swarm.clone(),
            identity.clone(),
            SyncSettings::default(),
        )
        .with_clock(clock.clone()),
    );
    let projector = Arc::new(
        ConfigProjector::new(
            factory.clone(),
            db.clone(),
            swarm,
            identity.clone(),
            SyncSettings::default(),
        )
        .with_clock(clock.clone()),
    );

    Device {
        factory,
        db,
        identity,
        clock,
        coordinator,
        projector,
    }
}

pub fn account(fill: u8) -> AccountId {
    AccountId::new(IdPrefix::Standard, [fill; 32])
}

pub fn group_account(fill: u8) -> AccountId {
    AccountId::new(IdPrefix::Group, [fill; 32])
}

pub fn approved_contact(fill: u8) -> Contact {
    let mut contact = Contact::new(account(fill));
    contact.name = Some(format!("contact-{fill}"));
    contact.approved = true;
    contact.approved_me = true;
    contact
}

/// Let spawned tasks on the current-thread runtime run to their next await.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
