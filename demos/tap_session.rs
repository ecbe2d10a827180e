//! Example: A tap session against the local stores.
//!
//! Run with: cargo run --example tap_session
//!
//! Stores are written under `REAP_DATA_DIR` (default `.reap-mini`). Set
//! `RUST_LOG=reap_mini=debug` to see persistence and timer activity.

use futures_util::StreamExt;
use reap_mini::AppContext;
use reap_mini::config::AppConfig;
use reap_mini::rewards::format_usd;
use reap_mini::tap::TapEvent;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env()?;
    let gateway = config.rewards_client();
    let app = AppContext::start(config, gateway).await?;

    let snapshot = app.tap_snapshot();
    println!(
        "Window opened at {}: {} taps, {} left, resets in {:?}",
        snapshot.window_start,
        snapshot.count,
        snapshot.remaining,
        app.limiter().time_until_reset()
    );

    let mut events = Box::pin(app.events());
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let TapEvent::LimitReached { count } = event {
                println!("Limit reached at {} taps", count);
            }
        }
    });

    for _ in 0..25 {
        match app.tap().await {
            Ok(count) => println!("Tap accepted, {} this window", count),
            Err(e) if e.is_limit_reached() => {
                println!("Tap rejected: {}", e);
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    println!("Lifetime score: {}", app.stats().score());

    let price = app.current_price().await;
    println!("Token price: {}", format_usd(price));

    app.shutdown().await;
    printer.abort();
    Ok(())
}
