//! The logged-in account's signing identity.

use configsync_protocol::{AccountId, SwarmAuth};
use std::sync::{PoisonError, RwLock};

/// Holds the user's swarm auth between login and logout.
#[derive(Debug, Default)]
pub struct LocalIdentity {
    auth: RwLock<Option<SwarmAuth>>,
}

impl LocalIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logged_in(auth: SwarmAuth) -> Self {
        Self {
            auth: RwLock::new(Some(auth)),
        }
    }

    pub fn login(&self, auth: SwarmAuth) {
        log::info!(target: "configsync::identity", "Logged in as {:?}", auth.account_id());
        *self.auth.write().unwrap_or_else(PoisonError::into_inner) = Some(auth);
    }

    pub fn logout(&self) {
        *self.auth.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn auth(&self) -> Option<SwarmAuth> {
        self.auth
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.auth
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|auth| *auth.account_id())
    }
}
