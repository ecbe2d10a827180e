//! Reward cloud functions client implementation.

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use reqwest_tracing::TracingMiddleware;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::ReapError;
use crate::gateway::endpoints::{PRIMARY_BASE_URL, REGIONAL_BASE_URL, primary, regional};
use crate::gateway::traits::RewardsGateway;
use crate::gateway::types::{
    AddressQuery, AddressRequest, BalancesResponse, DealActivation, DealActivationRequest,
    TokenBalance, parse_price,
};

/// The reward cloud functions client.
///
/// Balance and price functions live on the primary base URL, reward and
/// deal functions on the regional one. Transient failures are retried with
/// exponential backoff and every request is traced.
///
/// # Example
///
/// ```rust,no_run
/// use reap_mini::gateway::{RewardsClient, RewardsGateway};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = RewardsClient::new();
///     let price = client.get_token_price().await?;
///     println!("Token price: ${}", price);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RewardsClient {
    http_client: ClientWithMiddleware,
    primary_url: String,
    regional_url: String,
}

impl RewardsClient {
    /// Create a new client with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new client builder.
    pub fn builder() -> RewardsClientBuilder {
        RewardsClientBuilder::new()
    }

    /// The primary base URL.
    pub fn primary_url(&self) -> &str {
        &self.primary_url
    }

    /// The regional base URL.
    pub fn regional_url(&self) -> &str {
        &self.regional_url
    }

    /// Make a GET request with query parameters and return the body.
    async fn get_with_params<Q>(&self, base: &str, endpoint: &str, params: &Q) -> Result<String, ReapError>
    where
        Q: Serialize + ?Sized,
    {
        let query_string = serde_urlencoded::to_string(params)
            .map_err(|e| ReapError::InvalidResponse(e.to_string()))?;
        let url = if query_string.is_empty() {
            format!("{}{}", base, endpoint)
        } else {
            format!("{}{}?{}", base, endpoint, query_string)
        };
        let response = self
            .http_client
            .get(&url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?;
        Self::read_body(endpoint, response).await
    }

    /// Make a GET request and return the body.
    async fn get(&self, base: &str, endpoint: &str) -> Result<String, ReapError> {
        self.get_with_params(base, endpoint, &[] as &[(&str, &str)]).await
    }

    /// Make a JSON POST request and return the body.
    async fn post_json<B>(&self, base: &str, endpoint: &str, body: &B) -> Result<String, ReapError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", base, endpoint);
        let response = self
            .http_client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(body)?)
            .send()
            .await?;
        Self::read_body(endpoint, response).await
    }

    /// Turn non-2xx statuses into upstream errors.
    async fn read_body(endpoint: &str, response: reqwest::Response) -> Result<String, ReapError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ReapError::UpstreamUnavailable {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

impl Default for RewardsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RewardsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardsClient")
            .field("primary_url", &self.primary_url)
            .field("regional_url", &self.regional_url)
            .finish()
    }
}

impl RewardsGateway for RewardsClient {
    async fn get_token_balance(&self, address: &str) -> Result<TokenBalance, ReapError> {
        let body = self
            .get_with_params(&self.primary_url, primary::TOKEN_BALANCES, &AddressQuery { address })
            .await?;
        let response: BalancesResponse = serde_json::from_str(&body).map_err(|e| {
            ReapError::InvalidResponse(format!("Failed to parse balances: {}. Body: {}", e, body))
        })?;
        TokenBalance::try_from(response)
    }

    async fn get_token_price(&self) -> Result<Decimal, ReapError> {
        let body = self.get(&self.primary_url, primary::TOKEN_PRICE).await?;
        tracing::debug!("Raw price response: {}", body);
        parse_price(&body)
    }

    async fn claim_welcome_prize(&self, address: &str) -> Result<serde_json::Value, ReapError> {
        let body = self
            .post_json(&self.regional_url, regional::WELCOME_PRIZE, &AddressRequest { address })
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn activate_deal(&self, user_id: &str, deal_id: &str) -> Result<DealActivation, ReapError> {
        let request = DealActivationRequest { user_id, deal_id };
        let body = self
            .post_json(&self.regional_url, regional::DEAL_ACTIVATION, &request)
            .await?;
        let activation: DealActivation = serde_json::from_str(&body)?;
        if activation.redirect_url.is_none() {
            return Err(ReapError::InvalidResponse(
                "Redirect URL not found in deal activation response".to_string(),
            ));
        }
        Ok(activation)
    }

    fn report_fee(&self, address: &str) {
        let client = self.clone();
        let address = address.to_string();
        tokio::spawn(async move {
            let request = AddressRequest { address: &address };
            if let Err(e) = client
                .post_json(&client.regional_url, regional::FEE, &request)
                .await
            {
                tracing::warn!("Fee request for {} failed: {}", address, e);
            }
        });
    }
}

/// Builder for [`RewardsClient`].
pub struct RewardsClientBuilder {
    primary_url: String,
    regional_url: String,
    user_agent: Option<String>,
    max_retries: u32,
}

impl RewardsClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            primary_url: PRIMARY_BASE_URL.to_string(),
            regional_url: REGIONAL_BASE_URL.to_string(),
            user_agent: None,
            max_retries: 3,
        }
    }

    /// Set both base URLs (useful for testing with a mock server).
    pub fn base_url(self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.primary_url(url.clone()).regional_url(url)
    }

    /// Set the primary base URL.
    pub fn primary_url(mut self, url: impl Into<String>) -> Self {
        self.primary_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the regional base URL.
    pub fn regional_url(mut self, url: impl Into<String>) -> Self {
        self.regional_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the maximum number of retries for transient failures.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Build the client.
    pub fn build(self) -> RewardsClient {
        let mut headers = HeaderMap::new();
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("reap-mini-client/{}", env!("CARGO_PKG_VERSION")));
        let header_value = HeaderValue::from_str(&user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static("reap-mini-client"));
        headers.insert(USER_AGENT, header_value);

        let reqwest_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(self.max_retries);

        let client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        RewardsClient {
            http_client: client,
            primary_url: self.primary_url,
            regional_url: self.regional_url,
        }
    }
}

impl Default for RewardsClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
