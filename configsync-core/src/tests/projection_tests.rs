use super::{account, approved_contact, device, group_account, settle, Device, START_MS};
use crate::memory::{memory_group_configs, InMemorySwarm, NewMessage, SwarmCall};
use configsync_protocol::address::Address;
use configsync_protocol::ids::AccountId;
use configsync_protocol::limits::DELETED_MESSAGE_PLACEHOLDER;
use configsync_protocol::signing::AdminKey;
use configsync_protocol::snapshot::{
    ClosedGroupInfo, CommunityInfo, ConversationEntry, GroupEntry, GroupInfo, LegacyGroupInfo,
    UserProfile, PRIORITY_PINNED,
};
use configsync_protocol::storage::{LocalDatabase, ThreadId};
use configsync_protocol::store::{
    ContactsConfig, ConvoInfoVolatileConfig, GroupInfoConfig, UserGroupsConfig, UserProfileConfig,
};
use configsync_protocol::types::UserConfigType;
use std::collections::BTreeMap;
use std::sync::Arc;

fn closed_group(alice: &Device, admin: Option<AdminKey>, fill: u8) -> (AccountId, ThreadId) {
    let group_id = match &admin {
        Some(key) => key.group_id(),
        None => group_account(fill),
    };
    let mut entry = ClosedGroupInfo::new(group_id);
    entry.name = Some("climbers".into());
    entry.admin_key = admin;
    alice
        .factory
        .with_mutable_user_configs(|c| c.user_groups.set(GroupEntry::ClosedGroup(entry)));
    alice
        .factory
        .create_group_configs(group_id, memory_group_configs());
    alice
        .projector
        .sync_user_configs(UserConfigType::UserGroups, None)
        .unwrap();
    let thread = alice
        .db
        .thread_id(&Address::Group(group_id))
        .unwrap()
        .expect("group thread created");
    (group_id, thread)
}

fn seed(alice: &Device, thread: ThreadId, at_ms: i64, hash: &str, is_control: bool) -> i64 {
    alice.db.insert_message(
        thread,
        NewMessage {
            timestamp_ms: at_ms,
            body: format!("message {hash}"),
            server_hash: Some(hash.to_string()),
            is_control,
            ..NewMessage::default()
        },
    )
}

#[test]
fn test_new_approved_contact_reaches_storage() {
    let alice = device(1, Arc::new(InMemorySwarm::new()));
    let contact = approved_contact(2);
    alice
        .factory
        .with_mutable_user_configs(|c| c.contacts.set(contact.clone()));

    alice
        .projector
        .sync_user_configs(UserConfigType::Contacts, None)
        .unwrap();

    let calls = alice.db.add_contacts_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, vec![contact.clone()]);
    assert_eq!(calls[0].1, None);
    assert!(alice.db.is_approved(&contact.address()).unwrap());
    assert!(alice.db.thread(&contact.address()).is_some());
}

#[test]
fn test_pinned_community_is_pinned_locally() {
    let alice = device(1, Arc::new(InMemorySwarm::new()));
    let address = Address::community("https://open.example", "rust");
    let thread = alice.db.get_or_create_thread(&address).unwrap();
    alice.factory.with_mutable_user_configs(|c| {
        c.user_groups.set(GroupEntry::Community(CommunityInfo {
            base_url: "https://open.example".into(),
            room: "rust".into(),
            pubkey_hex: "ab".repeat(32),
            priority: PRIORITY_PINNED,
        }))
    });

    alice
        .projector
        .sync_user_configs(UserConfigType::UserGroups, None)
        .unwrap();

    assert_eq!(alice.db.thread_id(&address).unwrap(), Some(thread));
    assert!(alice.db.thread(&address).unwrap().pinned);
}

#[tokio::test]
async fn test_destroyed_group_purge_supersedes_delete_before() {
    let swarm = Arc::new(InMemorySwarm::new());
    let alice = device(1, swarm.clone());
    let (group_id, thread) = closed_group(&alice, Some(AdminKey::generate()), 0);
    seed(&alice, thread, 1_000, "h1", false);
    seed(&alice, thread, 2_000, "h2", true);
    seed(&alice, thread, 90_000, "h3", false);

    alice.factory.with_mutable_group_configs(&group_id, |g| {
        g.info.set_info(GroupInfo {
            destroyed: true,
            delete_before_secs: Some(10),
            ..GroupInfo::default()
        })
    });
    alice.projector.sync_group_configs(&group_id).unwrap();
    settle().await;

    assert_eq!(alice.db.message_count(thread), 0);
    assert!(swarm.delete_calls().is_empty());
}

#[tokio::test]
async fn test_destroyed_flag_in_user_groups_purges_thread() {
    let alice = device(1, Arc::new(InMemorySwarm::new()));
    let (group_id, thread) = closed_group(&alice, None, 12);
    seed(&alice, thread, 1_000, "h1", false);

    alice.factory.with_mutable_user_configs(|c| {
        let mut entry = c.user_groups.closed_group(&group_id).unwrap();
        entry.destroyed = true;
        c.user_groups.set(GroupEntry::ClosedGroup(entry));
    });
    alice
        .projector
        .sync_user_configs(UserConfigType::UserGroups, None)
        .unwrap();

    assert_eq!(alice.db.message_count(thread), 0);
    assert!(alice.db.thread(&Address::Group(group_id)).is_some());
}

#[tokio::test]
async fn test_delete_before_redacts_and_asks_swarm_as_admin() {
    let swarm = Arc::new(InMemorySwarm::new());
    let alice = device(1, swarm.clone());
    let admin = AdminKey::generate();
    let (group_id, thread) = closed_group(&alice, Some(admin), 0);
    let visible = seed(&alice, thread, 1_000, "h1", false);
    let control = seed(&alice, thread, 2_000, "h2", true);
    let later = seed(&alice, thread, 90_000, "h3", false);

    alice.factory.with_mutable_group_configs(&group_id, |g| {
        g.info.set_info(GroupInfo {
            delete_before_secs: Some(10),
            ..GroupInfo::default()
        })
    });
    alice.projector.sync_group_configs(&group_id).unwrap();
    settle().await;

    let redacted = alice.db.message(visible).unwrap();
    assert!(redacted.record.deleted_locally);
    assert_eq!(redacted.body, DELETED_MESSAGE_PLACEHOLDER);
    assert!(alice.db.message(control).is_none());
    assert_eq!(alice.db.message(later).unwrap().body, "message h3");

    assert_eq!(
        swarm.calls(),
        vec![SwarmCall::Delete {
            account: group_id.to_hex(),
            hashes: vec!["h1".to_string(), "h2".to_string()],
        }]
    );

    // A second pass finds nothing left to act on
    alice.projector.sync_group_configs(&group_id).unwrap();
    settle().await;
    assert_eq!(swarm.delete_calls().len(), 1);
}

fn populate_everything(alice: &Device) -> AccountId {
    let community = Address::community("https://open.example", "rust");
    alice.db.get_or_create_thread(&community).unwrap();
    let mut members = BTreeMap::new();
    members.insert(account(3), true);
    members.insert(alice.me(), false);

    alice.factory.with_mutable_user_configs(|c| {
        c.profile.set_profile(UserProfile {
            name: Some("Alice".into()),
            nts_priority: PRIORITY_PINNED,
            nts_expiry_secs: None,
        });
        c.contacts.set(approved_contact(2));
        c.contacts.set(approved_contact(3));
        c.convo_info_volatile.set(ConversationEntry {
            address: Address::Standard(account(2)),
            last_read_ms: START_MS,
            unread: false,
        });
        c.user_groups.set(GroupEntry::Community(CommunityInfo {
            base_url: "https://open.example".into(),
            room: "rust".into(),
            pubkey_hex: "ab".repeat(32),
            priority: PRIORITY_PINNED,
        }));
        c.user_groups.set(GroupEntry::LegacyGroup(LegacyGroupInfo {
            account_id: account(30),
            name: "old crew".into(),
            members,
            enc_pub_key: vec![1; 32],
            enc_sec_key: vec![2; 32],
            priority: 0,
            joined_at_secs: 1_600_000_000,
        }));
    });
    let (group_id, thread) = closed_group(alice, Some(AdminKey::generate()), 0);
    seed(alice, thread, 1_000, "g1", false);
    seed(alice, thread, 1_500, "g2", true);
    alice.factory.with_mutable_group_configs(&group_id, |g| {
        g.info.set_info(GroupInfo {
            name: Some("renamed climbers".into()),
            delete_before_secs: Some(5),
            delete_attachments_before_secs: Some(5),
            ..GroupInfo::default()
        })
    });
    group_id
}

fn project_all(alice: &Device, group_id: &AccountId) {
    for config_type in UserConfigType::ALL {
        alice
            .db
            .in_transaction(&mut || alice.projector.sync_user_configs(config_type, None))
            .unwrap();
    }
    alice.projector.sync_group_configs(group_id).unwrap();
}

#[tokio::test]
async fn test_projection_is_idempotent() {
    let alice = device(1, Arc::new(InMemorySwarm::new()));
    let group_id = populate_everything(&alice);

    project_all(&alice, &group_id);
    settle().await;
    let first = alice.db.dump();
    let groups_after_first = alice
        .factory
        .with_user_configs(|c| c.user_groups.all())
        .unwrap();

    project_all(&alice, &group_id);
    settle().await;
    assert_eq!(alice.db.dump(), first);
    assert_eq!(
        alice
            .factory
            .with_user_configs(|c| c.user_groups.all())
            .unwrap(),
        groups_after_first
    );

    // Sanity: the first pass did real work
    assert!(alice.db.thread(&Address::Standard(alice.me())).unwrap().pinned);
    assert!(alice.db.legacy_group(&account(30)).is_some());
    assert_eq!(
        alice.db.last_seen(
            alice
                .db
                .thread_id(&Address::Standard(account(2)))
                .unwrap()
                .unwrap()
        )
        .unwrap(),
        START_MS
    );
}

#[test]
fn test_failed_pass_rolls_back() {
    let alice = device(1, Arc::new(InMemorySwarm::new()));
    alice.factory.with_mutable_user_configs(|c| {
        c.profile.set_profile(UserProfile {
            nts_priority: PRIORITY_PINNED,
            ..UserProfile::default()
        })
    });
    let before = alice.db.dump();

    let result = alice.db.in_transaction(&mut || {
        alice
            .projector
            .sync_user_configs(UserConfigType::UserProfile, None)?;
        alice.db.set_pinned(9_999, true)
    });

    assert!(result.is_err());
    assert_eq!(alice.db.dump(), before);
}
