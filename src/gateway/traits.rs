//! Trait definition for the reward cloud functions.
//!
//! This module provides the `RewardsGateway` trait which abstracts every
//! remote call the app makes, so that the price cache, balance tracker and
//! login session can be exercised against mock implementations.

use std::future::Future;

use rust_decimal::Decimal;

use crate::error::ReapError;
use crate::gateway::types::{DealActivation, TokenBalance};

/// Trait defining all remote reward operations.
///
/// All request/response methods are async and return `Result<T, ReapError>`.
/// A failed call is an upstream error, never retried here beyond the
/// transport's own transient retries.
pub trait RewardsGateway: Send + Sync {
    /// Get the token balance of a wallet on every supported chain.
    fn get_token_balance(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<TokenBalance, ReapError>> + Send;

    /// Get the token price in USD.
    fn get_token_price(&self) -> impl Future<Output = Result<Decimal, ReapError>> + Send;

    /// Claim the welcome prize for a newly created wallet.
    fn claim_welcome_prize(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<serde_json::Value, ReapError>> + Send;

    /// Activate a merchant deal for a user.
    fn activate_deal(
        &self,
        user_id: &str,
        deal_id: &str,
    ) -> impl Future<Output = Result<DealActivation, ReapError>> + Send;

    /// Ask for a fee top-up without waiting for the answer.
    ///
    /// Failures are only logged.
    fn report_fee(&self, address: &str);
}
