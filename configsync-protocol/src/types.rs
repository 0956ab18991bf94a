//! Core config sync types: config kinds, push payloads and results,
//! merge notifications, and group write authority.

use crate::ids::AccountId;
use crate::signing::AdminKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Config kinds
// ---------------------------------------------------------------------------

/// Every configuration object kind, with its fixed remote namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfigType {
    UserProfile,
    Contacts,
    ConvoInfoVolatile,
    UserGroups,
    GroupKeys,
    GroupInfo,
    GroupMembers,
}

impl ConfigType {
    /// Namespace on the remote store.
    pub const fn namespace(self) -> i32 {
        match self {
            ConfigType::UserProfile => 2,
            ConfigType::Contacts => 3,
            ConfigType::ConvoInfoVolatile => 4,
            ConfigType::UserGroups => 5,
            ConfigType::GroupKeys => 12,
            ConfigType::GroupInfo => 13,
            ConfigType::GroupMembers => 14,
        }
    }

    pub const fn is_user_scoped(self) -> bool {
        matches!(
            self,
            ConfigType::UserProfile
                | ConfigType::Contacts
                | ConfigType::ConvoInfoVolatile
                | ConfigType::UserGroups
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            ConfigType::UserProfile => "user-profile",
            ConfigType::Contacts => "contacts",
            ConfigType::ConvoInfoVolatile => "convo-info-volatile",
            ConfigType::UserGroups => "user-groups",
            ConfigType::GroupKeys => "group-keys",
            ConfigType::GroupInfo => "group-info",
            ConfigType::GroupMembers => "group-members",
        }
    }
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The four per-account config kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UserConfigType {
    Contacts,
    UserProfile,
    ConvoInfoVolatile,
    UserGroups,
}

impl UserConfigType {
    /// Fixed order in which pending pushes are gathered.
    pub const ALL: [UserConfigType; 4] = [
        UserConfigType::Contacts,
        UserConfigType::UserProfile,
        UserConfigType::ConvoInfoVolatile,
        UserConfigType::UserGroups,
    ];

    pub const fn config_type(self) -> ConfigType {
        match self {
            UserConfigType::Contacts => ConfigType::Contacts,
            UserConfigType::UserProfile => ConfigType::UserProfile,
            UserConfigType::ConvoInfoVolatile => ConfigType::ConvoInfoVolatile,
            UserConfigType::UserGroups => ConfigType::UserGroups,
        }
    }

    pub const fn namespace(self) -> i32 {
        self.config_type().namespace()
    }
}

impl From<UserConfigType> for ConfigType {
    fn from(t: UserConfigType) -> Self {
        t.config_type()
    }
}

impl TryFrom<ConfigType> for UserConfigType {
    type Error = ConfigType;

    fn try_from(t: ConfigType) -> Result<Self, Self::Error> {
        match t {
            ConfigType::Contacts => Ok(UserConfigType::Contacts),
            ConfigType::UserProfile => Ok(UserConfigType::UserProfile),
            ConfigType::ConvoInfoVolatile => Ok(UserConfigType::ConvoInfoVolatile),
            ConfigType::UserGroups => Ok(UserConfigType::UserGroups),
            other => Err(other),
        }
    }
}

impl fmt::Display for UserConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_type().name())
    }
}

// ---------------------------------------------------------------------------
// Push payloads
// ---------------------------------------------------------------------------

/// Unpushed local state produced by a config store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushPayload {
    /// Opaque blob for the remote store.
    pub data: Vec<u8>,
    /// Monotonic per store; confirmations must echo it back.
    pub seq_no: i64,
    /// Previously stored blobs superseded by this one.
    pub obsolete_hashes: BTreeSet<String>,
}

/// Identity and commit time the swarm assigned to a stored blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    pub hash: String,
    pub timestamp_ms: i64,
}

/// A push that went through, paired with the sequence number it carried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushedConfig {
    pub seq_no: i64,
    pub result: PushResult,
}

/// One remote blob retrieved by polling, ready to merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigMessage {
    pub hash: String,
    pub data: Vec<u8>,
    pub timestamp_ms: i64,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Emitted by the config layer whenever a store's materialized state changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeNotification {
    /// Some user-scoped store has local changes to push.
    UserConfigsModified,
    /// Remote state was merged into the given user-scoped store.
    UserConfigsMerged(UserConfigType),
    /// A group's info, members or keys changed.
    GroupConfigsUpdated(AccountId),
}

// ---------------------------------------------------------------------------
// Group authority
// ---------------------------------------------------------------------------

/// Write authority over a group's shared config.
#[derive(Clone, Debug)]
pub struct GroupAuthority {
    pub group_id: AccountId,
    pub admin_key: Option<AdminKey>,
}

impl GroupAuthority {
    pub fn is_admin(&self) -> bool {
        self.admin_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdPrefix;

    #[test]
    fn test_namespaces_are_distinct() {
        let all = [
            ConfigType::UserProfile,
            ConfigType::Contacts,
            ConfigType::ConvoInfoVolatile,
            ConfigType::UserGroups,
            ConfigType::GroupKeys,
            ConfigType::GroupInfo,
            ConfigType::GroupMembers,
        ];
        let namespaces: BTreeSet<i32> = all.iter().map(|t| t.namespace()).collect();
        assert_eq!(namespaces.len(), all.len());
        assert_eq!(ConfigType::GroupKeys.namespace(), 12);
    }

    #[test]
    fn test_user_order_is_fixed() {
        let names: Vec<&str> = UserConfigType::ALL.iter().map(|t| t.config_type().name()).collect();
        assert_eq!(
            names,
            ["contacts", "user-profile", "convo-info-volatile", "user-groups"]
        );
        assert!(UserConfigType::ALL.iter().all(|t| t.config_type().is_user_scoped()));
    }

    #[test]
    fn test_group_types_are_not_user_types() {
        assert_eq!(
            UserConfigType::try_from(ConfigType::GroupInfo),
            Err(ConfigType::GroupInfo)
        );
        assert_eq!(
            UserConfigType::try_from(ConfigType::Contacts),
            Ok(UserConfigType::Contacts)
        );
    }

    #[test]
    fn test_group_authority() {
        let group_id = AccountId::new(IdPrefix::Group, [1u8; 32]);
        let member = GroupAuthority { group_id, admin_key: None };
        assert!(!member.is_admin());

        let admin = GroupAuthority {
            group_id,
            admin_key: Some(AdminKey::from_seed([2u8; 32])),
        };
        assert!(admin.is_admin());
    }
}
