//! Swarm request authentication.
//!
//! Store and delete requests are signed with Ed25519, either by the user's own
//! key or by a group's admin key:
//!
//! - store:  `"store" || namespace || timestamp_ms`
//! - delete: `"delete" || hash_1 || ... || hash_n`
//!
//! Blobs and signatures travel base64-encoded, keys hex-encoded.

use crate::ids::{AccountId, IdPrefix};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Verification failed")]
    VerificationFailed,
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),
}

pub type Result<T> = std::result::Result<T, SigningError>;

// ---------------------------------------------------------------------------
// Admin key
// ---------------------------------------------------------------------------

/// Secret seed granting write authority over a closed group's config.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct AdminKey([u8; 32]);

impl AdminKey {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        AdminKey(seed)
    }

    pub fn generate() -> Self {
        AdminKey(SigningKey::generate(&mut OsRng).to_bytes())
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.0)
    }

    /// Group id controlled by this key.
    pub fn group_id(&self) -> AccountId {
        AccountId::new(IdPrefix::Group, self.signing_key().verifying_key().to_bytes())
    }
}

impl fmt::Debug for AdminKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminKey(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Authenticated request to store one blob in a namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRequest {
    /// Hex account id owning the namespace.
    pub pubkey: String,
    /// Hex Ed25519 key that produced `signature`.
    pub pubkey_ed25519: String,
    pub namespace: i32,
    /// Base64 blob.
    pub data: String,
    pub ttl_ms: i64,
    pub timestamp_ms: i64,
    /// Base64 signature.
    pub signature: String,
}

impl StoreRequest {
    pub fn decode_data(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| SigningError::InvalidEncoding(e.to_string()))
    }

    pub fn verify(&self) -> Result<bool> {
        let message = store_message(self.namespace, self.timestamp_ms);
        verify_encoded(&message, &self.signature, &self.pubkey_ed25519)
    }
}

/// Authenticated request to delete a batch of stored blobs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub pubkey: String,
    pub pubkey_ed25519: String,
    pub messages: Vec<String>,
    pub signature: String,
}

impl DeleteRequest {
    pub fn verify(&self) -> Result<bool> {
        let message = delete_message(&self.messages);
        verify_encoded(&message, &self.signature, &self.pubkey_ed25519)
    }
}

fn store_message(namespace: i32, timestamp_ms: i64) -> Vec<u8> {
    let mut message = b"store".to_vec();
    message.extend_from_slice(namespace.to_string().as_bytes());
    message.extend_from_slice(timestamp_ms.to_string().as_bytes());
    message
}

fn delete_message(hashes: &[String]) -> Vec<u8> {
    let mut message = b"delete".to_vec();
    for hash in hashes {
        message.extend_from_slice(hash.as_bytes());
    }
    message
}

// ---------------------------------------------------------------------------
// SwarmAuth
// ---------------------------------------------------------------------------

/// Signing capability for one swarm: the user's own or a group's.
#[derive(Clone)]
pub struct SwarmAuth {
    account_id: AccountId,
    signing_key: SigningKey,
}

impl SwarmAuth {
    /// Auth for the user's own swarm, from a 32-byte Ed25519 seed.
    pub fn for_user(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let account_id = AccountId::new(IdPrefix::Standard, signing_key.verifying_key().to_bytes());
        SwarmAuth {
            account_id,
            signing_key,
        }
    }

    /// Auth for a group's swarm; only admins can build one.
    pub fn for_group(group_id: AccountId, admin_key: &AdminKey) -> Self {
        SwarmAuth {
            account_id: group_id,
            signing_key: admin_key.signing_key(),
        }
    }

    pub fn generate_user() -> Self {
        Self::for_user(&SigningKey::generate(&mut OsRng).to_bytes())
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    pub fn ed25519_public_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Build a signed store request.
    ///
    /// # Arguments
    /// * `namespace` - Remote partition for the config kind
    /// * `data` - Opaque config blob
    /// * `ttl_ms` - How long the swarm keeps the blob
    /// * `timestamp_ms` - Signed request time
    pub fn store_request(
        &self,
        namespace: i32,
        data: &[u8],
        ttl_ms: i64,
        timestamp_ms: i64,
    ) -> StoreRequest {
        let signature = self.signing_key.sign(&store_message(namespace, timestamp_ms));
        StoreRequest {
            pubkey: self.account_id.to_hex(),
            pubkey_ed25519: self.ed25519_public_hex(),
            namespace,
            data: STANDARD.encode(data),
            ttl_ms,
            timestamp_ms,
            signature: STANDARD.encode(signature.to_bytes()),
        }
    }

    /// Build a signed delete request for the given hashes.
    pub fn delete_request(&self, hashes: Vec<String>) -> DeleteRequest {
        let signature = self.signing_key.sign(&delete_message(&hashes));
        DeleteRequest {
            pubkey: self.account_id.to_hex(),
            pubkey_ed25519: self.ed25519_public_hex(),
            messages: hashes,
            signature: STANDARD.encode(signature.to_bytes()),
        }
    }
}

impl fmt::Debug for SwarmAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwarmAuth")
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

/// Verify a base64 signature against a hex Ed25519 public key.
///
/// # Returns
/// True if signature is valid
fn verify_encoded(message: &[u8], signature_b64: &str, public_hex: &str) -> Result<bool> {
    let public = hex::decode(public_hex).map_err(|e| SigningError::InvalidEncoding(e.to_string()))?;
    let public: [u8; 32] = public
        .as_slice()
        .try_into()
        .map_err(|_| SigningError::InvalidKeyLength)?;
    let verifying_key = VerifyingKey::from_bytes(&public).map_err(|_| SigningError::InvalidKeyLength)?;

    let signature = STANDARD
        .decode(signature_b64)
        .map_err(|e| SigningError::InvalidEncoding(e.to_string()))?;
    let signature: [u8; 64] = signature
        .as_slice()
        .try_into()
        .map_err(|_| SigningError::InvalidSignature)?;
    let sig = Signature::from_bytes(&signature);

    match verifying_key.verify(message, &sig) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}
