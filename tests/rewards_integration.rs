use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use time::macros::datetime;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reap_mini::gateway::{RewardsClient, RewardsGateway, TokenBalance};
use reap_mini::rewards::{BalanceTracker, PriceCache};
use reap_mini::store::{MemoryPersister, MemoryStore};
use reap_mini::tap::ManualClock;

const ADDRESS: &str = "0x3f5CE5FBFe3E9af3971dD833D26bA9b5C936f0bE";

fn build_client(server: &MockServer) -> RewardsClient {
    RewardsClient::builder()
        .base_url(server.uri())
        .max_retries(0)
        .build()
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn balances_body(celo: &str, polygon: &str) -> serde_json::Value {
    serde_json::json!({
        "chain42220": { "result": { "displayValue": celo, "symbol": "APRIL" } },
        "chain137": { "result": { "displayValue": polygon, "symbol": "APRIL" } }
    })
}

async fn mount_price(server: &MockServer, body: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/getAprilPrice"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_get_token_balance() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/getAprilBalances"))
        .and(query_param("address", ADDRESS))
        .respond_with(ResponseTemplate::new(200).set_body_json(balances_body("12.5", "0.000001")))
        .mount(&server)
        .await;

    let client = build_client(&server);
    let balance = client.get_token_balance(ADDRESS).await.unwrap();

    assert_eq!(balance.celo, dec("12.5"));
    assert_eq!(balance.polygon, dec("0.000001"));
    assert_eq!(balance.total(), dec("12.500001"));
}

#[tokio::test]
async fn test_get_token_price_plain_text() {
    let server = MockServer::start().await;
    mount_price(&server, "Current April price: 0.01234567", 1).await;

    let client = build_client(&server);
    assert_eq!(client.get_token_price().await.unwrap(), dec("0.012346"));
}

#[tokio::test]
async fn test_non_success_status_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/getAprilPrice"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = build_client(&server);
    let err = client.get_token_price().await.unwrap_err();

    assert!(err.is_upstream());
    match err {
        reap_mini::ReapError::UpstreamUnavailable { endpoint, status } => {
            assert_eq!(endpoint, "/getAprilPrice");
            assert_eq!(status, 503);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_claim_welcome_prize() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/welcomePrizeProxy"))
        .and(body_json(serde_json::json!({ "address": ADDRESS })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "sent" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = build_client(&server);
    let result = client.claim_welcome_prize(ADDRESS).await.unwrap();

    assert_eq!(result["status"], "sent");
}

#[tokio::test]
async fn test_activate_deal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/kindredDealActivation"))
        .and(body_json(serde_json::json!({ "userId": "42", "dealId": "deal-7" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "redirectUrl": "https://merchant.example/deal-7"
        })))
        .mount(&server)
        .await;

    let client = build_client(&server);
    let activation = client.activate_deal("42", "deal-7").await.unwrap();

    assert_eq!(
        activation.redirect_url.as_deref(),
        Some("https://merchant.example/deal-7")
    );
}

#[tokio::test]
async fn test_activate_deal_without_redirect_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/kindredDealActivation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let client = build_client(&server);
    let err = client.activate_deal("42", "deal-7").await.unwrap_err();

    assert!(matches!(err, reap_mini::ReapError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_report_fee_is_sent_in_background() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/feeProxy"))
        .and(body_json(serde_json::json!({ "address": ADDRESS })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = build_client(&server);
    client.report_fee(ADDRESS);

    for _ in 0..100 {
        if !server.received_requests().await.unwrap_or_default().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    server.verify().await;
}

#[tokio::test]
async fn test_price_cache_serves_fresh_price_from_store() {
    let server = MockServer::start().await;
    mount_price(&server, "0.05", 1).await;

    let clock = Arc::new(ManualClock::new(datetime!(2024-05-01 10:00 UTC)));
    let persister = Arc::new(MemoryPersister::new());
    let cache = PriceCache::new(
        Arc::new(build_client(&server)),
        Arc::new(MemoryStore::new("token-price")),
        Arc::clone(&persister),
    )
    .with_clock(clock.clone());

    assert_eq!(cache.current_price().await, dec("0.05"));
    clock.advance(time::Duration::minutes(119));
    assert_eq!(cache.current_price().await, dec("0.05"));
    assert_eq!(persister.save_count(), 1);
}

#[tokio::test]
async fn test_price_cache_refetches_after_ttl() {
    let server = MockServer::start().await;
    mount_price(&server, "{\"price\": 0.07}", 2).await;

    let clock = Arc::new(ManualClock::new(datetime!(2024-05-01 10:00 UTC)));
    let cache = PriceCache::new(
        Arc::new(build_client(&server)),
        Arc::new(MemoryStore::new("token-price")),
        MemoryPersister::new(),
    )
    .with_clock(clock.clone());

    cache.current_price().await;
    clock.advance(time::Duration::hours(2));
    assert_eq!(cache.current_price().await, dec("0.07"));
}

async fn price_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/getAprilPrice")
        .count()
}

#[tokio::test]
async fn test_price_refresh_task_refetches_stale_price() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/getAprilPrice"))
        .respond_with(ResponseTemplate::new(200).set_body_string("0.09"))
        .mount(&server)
        .await;

    let cache = Arc::new(
        PriceCache::new(
            Arc::new(build_client(&server)),
            Arc::new(MemoryStore::new("token-price")),
            MemoryPersister::new(),
        )
        .with_ttl(Duration::from_millis(40)),
    );
    let task = cache.spawn_refresh(Duration::from_millis(50));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(price_requests(&server).await, 0);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(price_requests(&server).await >= 2);
    assert_eq!(cache.stored_price(), Some(dec("0.09")));

    task.cancel();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let fetched = price_requests(&server).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(price_requests(&server).await, fetched);
}

#[tokio::test]
async fn test_price_cache_falls_back_to_stored_then_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/getAprilPrice"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let client = Arc::new(build_client(&server));

    let empty = PriceCache::new(
        Arc::clone(&client),
        Arc::new(MemoryStore::new("token-price")),
        MemoryPersister::new(),
    )
    .with_default_price(dec("0.01"));
    assert_eq!(empty.current_price().await, dec("0.01"));

    let store = Arc::new(MemoryStore::new("token-price"));
    store.set_cell("price", "APRIL", "usd", "0.042000");
    store.set_cell("price", "APRIL", "lastFetchTime", 0_i64);
    let stale = PriceCache::new(client, store, MemoryPersister::new());
    assert_eq!(stale.current_price().await, dec("0.042"));
}

#[tokio::test]
async fn test_balance_tracker_refresh_and_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/getAprilBalances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(balances_body("3", "4.25")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/getAprilBalances"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let persister = Arc::new(MemoryPersister::new());
    let tracker = BalanceTracker::new(
        Arc::new(build_client(&server)),
        Arc::new(MemoryStore::new("token-balance")),
        Arc::clone(&persister),
    );
    assert_eq!(tracker.load().await, None);
    assert_eq!(tracker.stored_total(), Decimal::ZERO);

    let balance = tracker.refresh(ADDRESS).await.unwrap();
    assert_eq!(balance.total(), dec("7.25"));

    assert!(tracker.refresh(ADDRESS).await.unwrap_err().is_upstream());
    assert_eq!(
        tracker.stored(),
        Some(TokenBalance {
            celo: dec("3"),
            polygon: dec("4.25"),
        })
    );
    assert_eq!(persister.save_count(), 1);

    let reloaded = BalanceTracker::new(
        Arc::new(build_client(&server)),
        Arc::new(MemoryStore::new("token-balance")),
        persister,
    );
    assert_eq!(reloaded.load().await.map(|b| b.total()), Some(dec("7.25")));
}
