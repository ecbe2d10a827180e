//! Cloud function base URLs and paths.

/// Base URL for balance and price functions.
pub const PRIMARY_BASE_URL: &str = "https://us-central1-fourth-buffer-421320.cloudfunctions.net";

/// Base URL for reward and deal functions.
pub const REGIONAL_BASE_URL: &str = "https://asia-southeast1-fourth-buffer-421320.cloudfunctions.net";

/// Primary region endpoints.
pub mod primary {
    /// Token balances on every supported chain.
    pub const TOKEN_BALANCES: &str = "/getAprilBalances";
    /// Token price in USD.
    pub const TOKEN_PRICE: &str = "/getAprilPrice";
}

/// Regional endpoints.
pub mod regional {
    /// One-off reward for a newly created wallet.
    pub const WELCOME_PRIZE: &str = "/welcomePrizeProxy";
    /// Fee top-up requested when opening the cashout screen.
    pub const FEE: &str = "/feeProxy";
    /// Merchant deal activation.
    pub const DEAL_ACTIVATION: &str = "/kindredDealActivation";
}
