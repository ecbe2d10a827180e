//! User identity and custodial wallet login.

pub mod identity;
mod wallet;

pub use identity::{Identity, LoginMethod, store_peer_did, stored_peer_did};
pub use wallet::{Session, Wallet, WalletService};
