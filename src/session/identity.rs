//! Who the user is: a Telegram account or a locally stored peer DID.

use std::collections::HashMap;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ReapError;
use crate::store::MemoryStore;

/// Store addressing of the peer DID.
pub mod cells {
    /// Table holding the peer DID.
    pub const TABLE: &str = "peerDID";
    /// Row of the active DID.
    pub const ROW: &str = "current";
    /// DID string.
    pub const DID: &str = "did";
}

/// How the user was identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginMethod {
    /// Telegram user id from the web app init data
    Telegram,
    /// Peer DID generated on this device
    PeerDid,
}

impl std::fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoginMethod::Telegram => write!(f, "telegram"),
            LoginMethod::PeerDid => write!(f, "peerDID"),
        }
    }
}

/// The user's identifier and how it was obtained.
///
/// The identifier doubles as the password of the custodial wallet, so it is
/// redacted from debug output.
#[derive(Clone)]
pub struct Identity {
    user_id: SecretString,
    method: LoginMethod,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
}

impl Identity {
    /// Identity of a Telegram user.
    pub fn telegram(user_id: impl Into<String>) -> Self {
        Self {
            user_id: SecretString::from(user_id.into()),
            method: LoginMethod::Telegram,
        }
    }

    /// Identity backed by a peer DID.
    pub fn peer_did(did: impl Into<String>) -> Self {
        Self {
            user_id: SecretString::from(did.into()),
            method: LoginMethod::PeerDid,
        }
    }

    /// Read the Telegram user from web app init data.
    ///
    /// Init data is a query string whose `user` parameter holds a JSON
    /// object with a numeric `id`.
    pub fn from_init_data(init_data: &str) -> Option<Self> {
        let params: HashMap<String, String> = serde_urlencoded::from_str(init_data).ok()?;
        let user: TelegramUser = serde_json::from_str(params.get("user")?).ok()?;
        Some(Self::telegram(user.id.to_string()))
    }

    /// Resolve the identity: the Telegram user if the init data has one,
    /// otherwise the peer DID stored in `store`.
    pub fn resolve(init_data: Option<&str>, store: &MemoryStore) -> Result<Self, ReapError> {
        if let Some(identity) = init_data.and_then(Self::from_init_data) {
            return Ok(identity);
        }

        tracing::info!("User data not found in init data, falling back to peer DID");
        stored_peer_did(store)
            .map(Self::peer_did)
            .ok_or(ReapError::MissingIdentity)
    }

    /// The secret identifier, used as the wallet password.
    pub fn user_id(&self) -> &SecretString {
        &self.user_id
    }

    /// How the user was identified.
    pub fn method(&self) -> LoginMethod {
        self.method
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &"[REDACTED]")
            .field("method", &self.method)
            .finish()
    }
}

/// The peer DID stored on this device, if any.
pub fn stored_peer_did(store: &MemoryStore) -> Option<String> {
    store
        .get_cell(cells::TABLE, cells::ROW, cells::DID)
        .and_then(|v| v.as_str().map(str::to_string))
}

/// Store a peer DID generated elsewhere as the device's identity.
pub fn store_peer_did(store: &MemoryStore, did: &str) {
    store.set_cell(cells::TABLE, cells::ROW, cells::DID, did);
}
