//! Runs a handful of weighted operations against a small budget.
//!
//! ```sh
//! RUST_LOG=debug cargo run --example weighted
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use weighted_throttle::{ChannelListener, RateLimiter, Weight};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let (events, mut receiver) = ChannelListener::bounded(32);
    let limiter = Arc::new(
        RateLimiter::builder(5.0, Duration::from_secs(2))
            .with_name("demo")
            .with_listener(Arc::new(events))
            .build()?,
    );

    let consumer = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            println!("event: {}", serde_json::to_string(&event).unwrap_or_default());
        }
    });

    let mut handles = Vec::new();
    for (i, weight) in [1.0, 2.5, 1.5, 3.0, 0.5].into_iter().enumerate() {
        let limiter = Arc::clone(&limiter);
        handles.push(tokio::spawn(async move {
            let weight = Weight::new(weight)?;
            limiter
                .execute_weighted(weight, || async move {
                    tracing::info!(request = i, weight = weight.get(), "request sent");
                })
                .await;
            Ok::<_, weighted_throttle::WeightError>(())
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let pages = limiter
        .execute_with_estimated_weight(
            "list-pages",
            || async { vec!["a", "b", "c"] },
            |pages| Some(pages.len() as f64),
        )
        .await;
    tracing::info!(pages = pages.len(), "listed pages");

    let snapshot = limiter.snapshot().await;
    tracing::info!(
        accumulated_ops = snapshot.accumulated_ops,
        tracked_operations = snapshot.tracked_operations,
        "final state"
    );

    drop(limiter);
    consumer.await?;
    Ok(())
}
