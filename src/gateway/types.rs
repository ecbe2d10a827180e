//! Request and response types for the reward cloud functions.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ReapError;

/// Chain id of Celo mainnet.
pub const CELO_CHAIN_ID: u64 = 42220;
/// Chain id of Polygon PoS.
pub const POLYGON_CHAIN_ID: u64 = 137;

/// Token balance across supported chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenBalance {
    /// Balance on Celo
    pub celo: Decimal,
    /// Balance on Polygon
    pub polygon: Decimal,
}

impl TokenBalance {
    /// Sum over all chains.
    pub fn total(&self) -> Decimal {
        self.celo + self.polygon
    }
}

/// Raw balances response, one entry per chain.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BalancesResponse {
    #[serde(rename = "chain42220")]
    pub celo: ChainBalance,
    #[serde(rename = "chain137")]
    pub polygon: ChainBalance,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChainBalance {
    pub result: ChainBalanceResult,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChainBalanceResult {
    pub display_value: String,
}

impl TryFrom<BalancesResponse> for TokenBalance {
    type Error = ReapError;

    fn try_from(response: BalancesResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            celo: parse_decimal(&response.celo.result.display_value)?,
            polygon: parse_decimal(&response.polygon.result.display_value)?,
        })
    }
}

/// Body of the address-only POST endpoints.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct AddressRequest<'a> {
    pub address: &'a str,
}

/// Query of the balances endpoint.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct AddressQuery<'a> {
    pub address: &'a str,
}

/// Body of the deal activation endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DealActivationRequest<'a> {
    pub user_id: &'a str,
    pub deal_id: &'a str,
}

/// Response of the deal activation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealActivation {
    /// Merchant page to send the user to
    pub redirect_url: Option<String>,
}

/// Parse the price endpoint body.
///
/// The endpoint has answered with a JSON number, a JSON string, an object
/// holding a single numeric field, and plain text such as
/// `Current April price: 0.0123`. The price is rounded to 6 decimal places.
pub fn parse_price(body: &str) -> Result<Decimal, ReapError> {
    let price = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Number(n)) => parse_decimal(&n.to_string())?,
        Ok(serde_json::Value::String(s)) => parse_decimal(&s)?,
        Ok(serde_json::Value::Object(map)) => map
            .values()
            .find_map(|v| match v {
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| ReapError::InvalidResponse(format!("No numeric price in {body}")))
            .and_then(|n| parse_decimal(&n))?,
        Ok(other) => {
            return Err(ReapError::InvalidResponse(format!(
                "Unexpected price format: {other}"
            )));
        }
        Err(_) => parse_decimal(body.trim().trim_start_matches("Current April price:"))?,
    };
    Ok(price.round_dp(6))
}

/// Parse a decimal, accepting scientific notation.
pub(crate) fn parse_decimal(s: &str) -> Result<Decimal, ReapError> {
    let s = s.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|e| ReapError::InvalidResponse(format!("Invalid decimal {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_price_formats() {
        assert_eq!(parse_price("0.01234567").unwrap(), dec("0.012346"));
        assert_eq!(parse_price("\"0.5\"").unwrap(), dec("0.5"));
        assert_eq!(parse_price(r#"{"price": 1.25}"#).unwrap(), dec("1.25"));
        assert_eq!(parse_price("Current April price: 0.0042").unwrap(), dec("0.0042"));
        assert_eq!(parse_price("1e-4").unwrap(), dec("0.0001"));
    }

    #[test]
    fn test_parse_price_rejects_garbage() {
        assert!(parse_price("[1, 2]").unwrap_err().is_upstream());
        assert!(parse_price(r#"{"price": "n/a"}"#).is_err());
        assert!(parse_price("Current April price: soon").is_err());
    }

    #[test]
    fn test_balances_response() {
        let json = serde_json::json!({
            "chain42220": { "result": { "displayValue": "12.5" } },
            "chain137": { "result": { "displayValue": "0.25" } }
        });
        let response: BalancesResponse = serde_json::from_value(json).unwrap();
        let balance = TokenBalance::try_from(response).unwrap();

        assert_eq!(balance.celo, dec("12.5"));
        assert_eq!(balance.polygon, dec("0.25"));
        assert_eq!(balance.total(), dec("12.75"));
    }

    #[test]
    fn test_deal_activation_request_shape() {
        let body = DealActivationRequest {
            user_id: "0xabc",
            deal_id: "deal-7",
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"userId": "0xabc", "dealId": "deal-7"})
        );
    }
}
