//! Conversation addresses.
//!
//! Every local thread is keyed by an `Address`. The serialized form is what
//! the local database stores, so parsing must accept everything `serialize`
//! produces and reject everything else without panicking.

use crate::ids::{AccountId, IdError, IdPrefix};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Serialized prefix of a legacy (pre-v2) closed group.
pub const LEGACY_GROUP_PREFIX: &str = "__textsecure_group__!";

/// Serialized prefix of a community room.
pub const COMMUNITY_PREFIX: &str = "__community__!";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid account id: {0}")]
    InvalidId(#[from] IdError),
    #[error("Legacy groups must use a standard id")]
    InvalidLegacyGroup,
    #[error("Malformed community address")]
    InvalidCommunity,
    #[error("Unsupported address prefix")]
    UnsupportedPrefix,
}

/// Where a conversation lives.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Address {
    /// One-to-one conversation (includes note-to-self).
    Standard(AccountId),
    /// Pre-v2 closed group, keyed by its shared public key.
    LegacyGroup(AccountId),
    /// v2 closed group, keyed by its `03`-prefixed id.
    Group(AccountId),
    /// Blinded community participant.
    Blinded(AccountId),
    /// Community room on an open group server.
    Community { server_url: String, room: String },
}

impl Address {
    pub fn community(server_url: impl Into<String>, room: impl Into<String>) -> Self {
        Address::Community {
            server_url: server_url.into(),
            room: room.into(),
        }
    }

    /// Account id behind the address, if it has one.
    pub fn account_id(&self) -> Option<&AccountId> {
        match self {
            Address::Standard(id)
            | Address::LegacyGroup(id)
            | Address::Group(id)
            | Address::Blinded(id) => Some(id),
            Address::Community { .. } => None,
        }
    }

    pub fn is_blinded(&self) -> bool {
        matches!(self, Address::Blinded(_))
    }

    pub fn is_community(&self) -> bool {
        matches!(self, Address::Community { .. })
    }

    pub fn is_legacy_group(&self) -> bool {
        matches!(self, Address::LegacyGroup(_))
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Address::Group(_))
    }

    /// Serialized form stored by the local database.
    pub fn serialize(&self) -> String {
        match self {
            Address::Standard(id) | Address::Group(id) | Address::Blinded(id) => id.to_hex(),
            Address::LegacyGroup(id) => format!("{LEGACY_GROUP_PREFIX}{}", id.to_hex()),
            Address::Community { server_url, room } => {
                format!("{COMMUNITY_PREFIX}{room}@{server_url}")
            }
        }
    }

    /// Parse the output of [`Address::serialize`].
    pub fn from_serialized(s: &str) -> Result<Self, AddressError> {
        if let Some(rest) = s.strip_prefix(LEGACY_GROUP_PREFIX) {
            let id = AccountId::from_hex(rest)?;
            if id.prefix() != IdPrefix::Standard {
                return Err(AddressError::InvalidLegacyGroup);
            }
            return Ok(Address::LegacyGroup(id));
        }

        if let Some(rest) = s.strip_prefix(COMMUNITY_PREFIX) {
            // Room names never contain '@', server urls might
            let (room, server_url) = rest.split_once('@').ok_or(AddressError::InvalidCommunity)?;
            if room.is_empty() || server_url.is_empty() {
                return Err(AddressError::InvalidCommunity);
            }
            return Ok(Address::community(server_url, room));
        }

        let id = AccountId::from_hex(s)?;
        match id.prefix() {
            IdPrefix::Standard => Ok(Address::Standard(id)),
            IdPrefix::Group => Ok(Address::Group(id)),
            IdPrefix::Blinded | IdPrefix::BlindedV2 => Ok(Address::Blinded(id)),
            IdPrefix::Unblinded => Err(AddressError::UnsupportedPrefix),
        }
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::from_serialized(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.serialize()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(prefix: IdPrefix, fill: u8) -> AccountId {
        AccountId::new(prefix, [fill; 32])
    }

    #[test]
    fn test_parse_each_kind() {
        let cases = vec![
            Address::Standard(id(IdPrefix::Standard, 1)),
            Address::Group(id(IdPrefix::Group, 2)),
            Address::LegacyGroup(id(IdPrefix::Standard, 3)),
            Address::Blinded(id(IdPrefix::BlindedV2, 4)),
            Address::community("https://open.example.org", "lobby"),
        ];
        for address in cases {
            let parsed = Address::from_serialized(&address.serialize()).unwrap();
            assert_eq!(parsed, address);
        }
    }

    #[test]
    fn test_community_server_with_at_sign() {
        let address = Address::community("http://user@host:8080", "dev");
        assert_eq!(
            Address::from_serialized(&address.serialize()).unwrap(),
            address
        );
    }

    #[test]
    fn test_legacy_group_requires_standard_id() {
        let s = format!("{LEGACY_GROUP_PREFIX}{}", id(IdPrefix::Group, 9).to_hex());
        assert_eq!(
            Address::from_serialized(&s),
            Err(AddressError::InvalidLegacyGroup)
        );
    }

    #[test]
    fn test_malformed_community() {
        assert_eq!(
            Address::from_serialized("__community__!lobby"),
            Err(AddressError::InvalidCommunity)
        );
        assert_eq!(
            Address::from_serialized("__community__!@https://x"),
            Err(AddressError::InvalidCommunity)
        );
    }

    #[test]
    fn test_account_id_accessor() {
        let member = id(IdPrefix::Standard, 7);
        assert_eq!(Address::Standard(member).account_id(), Some(&member));
        assert!(Address::community("https://x", "y").account_id().is_none());
    }
}
