/// Account identity types for the config sync system.
///
/// - `IdPrefix`: the network byte that tags what kind of key follows
/// - `AccountId`: 33-byte prefixed public key, hex-encoded on the wire (66 chars)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of the raw key carried by an `AccountId`.
pub const KEY_LEN: usize = 32;

/// Length of a hex-encoded `AccountId` (prefix byte + key).
pub const ACCOUNT_ID_HEX_LEN: usize = (KEY_LEN + 1) * 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Invalid account id length: {0}")]
    InvalidLength(usize),
    #[error("Account id is not valid hex")]
    InvalidHex,
    #[error("Unknown account id prefix: {0:#04x}")]
    UnknownPrefix(u8),
}

// ---------------------------------------------------------------------------
// IdPrefix
// ---------------------------------------------------------------------------

/// Leading byte of an account id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdPrefix {
    /// Regular user account (X25519-derived).
    Standard,
    /// Shared closed group, owned by whoever holds the admin key.
    Group,
    /// Community-scoped blinded id (v1 blinding).
    Blinded,
    /// Community-scoped blinded id (v2 blinding).
    BlindedV2,
    /// Raw Ed25519 key without blinding.
    Unblinded,
}

impl IdPrefix {
    pub const fn byte(self) -> u8 {
        match self {
            IdPrefix::Standard => 0x05,
            IdPrefix::Group => 0x03,
            IdPrefix::Blinded => 0x15,
            IdPrefix::BlindedV2 => 0x25,
            IdPrefix::Unblinded => 0x00,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x05 => Some(IdPrefix::Standard),
            0x03 => Some(IdPrefix::Group),
            0x15 => Some(IdPrefix::Blinded),
            0x25 => Some(IdPrefix::BlindedV2),
            0x00 => Some(IdPrefix::Unblinded),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// Prefixed public key identifying a user, a group, or a blinded community
/// participant.
///
/// **Ordering**: `(prefix, key)` so ids of the same kind sort together.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId {
    prefix: IdPrefix,
    key: [u8; KEY_LEN],
}

impl AccountId {
    /// Create from a prefix and raw key bytes.
    pub fn new(prefix: IdPrefix, key: [u8; KEY_LEN]) -> Self {
        AccountId { prefix, key }
    }

    pub fn prefix(&self) -> IdPrefix {
        self.prefix
    }

    /// Return the raw key bytes (without the prefix).
    pub fn key_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// True for both blinding generations; such ids never get local threads.
    pub fn is_blinded(&self) -> bool {
        matches!(self.prefix, IdPrefix::Blinded | IdPrefix::BlindedV2)
    }

    /// Hex-encode for display/storage.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(ACCOUNT_ID_HEX_LEN);
        out.push_str(&hex::encode([self.prefix.byte()]));
        out.push_str(&hex::encode(self.key));
        out
    }

    /// Decode from a 66-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        if s.len() != ACCOUNT_ID_HEX_LEN {
            return Err(IdError::InvalidLength(s.len()));
        }
        let bytes = hex::decode(s).map_err(|_| IdError::InvalidHex)?;
        let prefix = IdPrefix::from_byte(bytes[0]).ok_or(IdError::UnknownPrefix(bytes[0]))?;
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes[1..]);
        Ok(AccountId { prefix, key })
    }
}

impl FromStr for AccountId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountId::from_hex(s)
    }
}

impl TryFrom<String> for AccountId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AccountId::from_hex(&value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.to_hex()
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({}..)", &self.to_hex()[..10])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const ALICE: [u8; 32] = hex!("0a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20212223242526272829");

    #[test]
    fn test_account_id_hex_roundtrip() {
        let id = AccountId::new(IdPrefix::Standard, ALICE);
        let hex_str = id.to_hex();
        assert_eq!(hex_str.len(), ACCOUNT_ID_HEX_LEN);
        assert!(hex_str.starts_with("05"));
        assert_eq!(AccountId::from_hex(&hex_str).unwrap(), id);
    }

    #[test]
    fn test_group_prefix() {
        let id = AccountId::new(IdPrefix::Group, ALICE);
        assert!(id.to_hex().starts_with("03"));
        let parsed: AccountId = id.to_hex().parse().unwrap();
        assert_eq!(parsed.prefix(), IdPrefix::Group);
    }

    #[test]
    fn test_blinded_detection() {
        assert!(AccountId::new(IdPrefix::Blinded, ALICE).is_blinded());
        assert!(AccountId::new(IdPrefix::BlindedV2, ALICE).is_blinded());
        assert!(!AccountId::new(IdPrefix::Standard, ALICE).is_blinded());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(AccountId::from_hex("05ab"), Err(IdError::InvalidLength(4)));

        let not_hex = "zz".repeat(33);
        assert_eq!(AccountId::from_hex(&not_hex), Err(IdError::InvalidHex));

        let unknown = format!("99{}", hex::encode(ALICE));
        assert_eq!(AccountId::from_hex(&unknown), Err(IdError::UnknownPrefix(0x99)));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let id = AccountId::new(IdPrefix::Standard, ALICE);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let decoded: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn test_ordering_groups_by_prefix() {
        let group = AccountId::new(IdPrefix::Group, [0xff; 32]);
        let user = AccountId::new(IdPrefix::Standard, [0x00; 32]);
        // Standard is declared before Group
        assert!(user < group);
    }
}
