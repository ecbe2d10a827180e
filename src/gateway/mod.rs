//! Remote reward endpoints.
//!
//! Balance, price, welcome prize, fee and deal activation calls go to
//! stateless cloud functions. [`RewardsGateway`] is the seam the rest of the
//! crate depends on; [`RewardsClient`] is the HTTP implementation.

pub mod endpoints;
mod client;
mod traits;
mod types;

pub use client::{RewardsClient, RewardsClientBuilder};
pub use traits::RewardsGateway;
pub use types::{CELO_CHAIN_ID, DealActivation, POLYGON_CHAIN_ID, TokenBalance, parse_price};
