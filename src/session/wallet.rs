//! Custodial wallet login.

use std::future::Future;

use secrecy::SecretString;

use crate::error::ReapError;
use crate::gateway::RewardsGateway;

use super::identity::{Identity, LoginMethod};

/// A connected wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    /// Public address of the wallet
    pub address: String,
}

/// Trait for the custodial wallet service.
///
/// Key generation and encryption live behind this trait; the app only asks
/// for a wallet sealed with the user's identifier.
pub trait WalletService: Send + Sync {
    /// Open the wallet sealed with `password`. Fails if none exists.
    fn load(
        &self,
        password: &SecretString,
    ) -> impl Future<Output = Result<Wallet, ReapError>> + Send;

    /// Generate a new wallet, seal it with `password` and connect it.
    fn create(
        &self,
        password: &SecretString,
    ) -> impl Future<Output = Result<Wallet, ReapError>> + Send;

    /// Disconnect a wallet.
    fn disconnect(&self, wallet: &Wallet) -> impl Future<Output = Result<(), ReapError>> + Send;
}

/// A logged-in user with a connected wallet.
#[derive(Debug, Clone)]
pub struct Session {
    identity: Identity,
    wallet: Wallet,
    is_new_wallet: bool,
}

impl Session {
    /// Log in: open the user's wallet, or create one if none can be loaded.
    ///
    /// A newly created wallet gets the welcome prize. A failed claim is
    /// logged and does not fail the login.
    pub async fn login<W, G>(wallets: &W, gateway: &G, identity: Identity) -> Result<Self, ReapError>
    where
        W: WalletService,
        G: RewardsGateway,
    {
        let (wallet, is_new_wallet) = match wallets.load(identity.user_id()).await {
            Ok(wallet) => (wallet, false),
            Err(e) => {
                tracing::info!("No existing wallet found ({}), creating new one", e);
                (wallets.create(identity.user_id()).await?, true)
            }
        };
        tracing::info!(
            "Wallet connected via {}. Address: {}",
            identity.method(),
            wallet.address
        );

        if is_new_wallet {
            match gateway.claim_welcome_prize(&wallet.address).await {
                Ok(result) => tracing::info!("Welcome prize claimed: {}", result),
                Err(e) => tracing::warn!("Failed to claim welcome prize: {}", e),
            }
        }

        Ok(Self {
            identity,
            wallet,
            is_new_wallet,
        })
    }

    /// Disconnect the wallet.
    pub async fn logout<W: WalletService>(self, wallets: &W) -> Result<(), ReapError> {
        wallets.disconnect(&self.wallet).await?;
        tracing::info!("Disconnected wallet {}", self.wallet.address);
        Ok(())
    }

    /// The connected wallet.
    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// The wallet address.
    pub fn address(&self) -> &str {
        &self.wallet.address
    }

    /// Whether the wallet was created during this login.
    pub fn is_new_wallet(&self) -> bool {
        self.is_new_wallet
    }

    /// How the user was identified.
    pub fn login_method(&self) -> LoginMethod {
        self.identity.method()
    }

    /// The user's identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}
