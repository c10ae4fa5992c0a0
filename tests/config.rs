use std::time::Duration;
use weighted_throttle::{
    ConfigError, RateLimiter, RateLimiterConfig, Weight, WeightError, MAX_RATE_INTERVAL,
};

#[test]
fn test_limiter_from_json_config() {
    let config: RateLimiterConfig = serde_json::from_str(
        r#"{
            "name": "billing-api",
            "max_rate": 12.5,
            "rate_interval": "1h",
            "max_tracked_operations": 200
        }"#,
    )
    .unwrap();

    let limiter = RateLimiter::from_config(config).unwrap();

    assert_eq!(limiter.name(), "billing-api");
    assert_eq!(limiter.max_rate(), 12.5);
    assert_eq!(limiter.rate_interval(), Duration::from_secs(3600));
}

#[test]
fn test_invalid_duration_is_rejected() {
    let result = serde_json::from_str::<RateLimiterConfig>(
        r#"{ "max_rate": 1, "rate_interval": "soon" }"#,
    );

    let error = result.unwrap_err().to_string();
    assert!(error.contains("invalid duration"), "{error}");
}

#[test]
fn test_invalid_config_does_not_build() {
    let config: RateLimiterConfig =
        serde_json::from_str(r#"{ "max_rate": 0, "rate_interval": "1s" }"#).unwrap();

    assert_eq!(
        RateLimiter::from_config(config).unwrap_err(),
        ConfigError::InvalidMaxRate(0.0)
    );
}

#[test]
fn test_zero_interval_does_not_build() {
    let config: RateLimiterConfig =
        serde_json::from_str(r#"{ "max_rate": 1, "rate_interval": "0s" }"#).unwrap();

    assert_eq!(
        RateLimiter::from_config(config).unwrap_err(),
        ConfigError::ZeroRateInterval
    );
}

#[test]
fn test_overlong_interval_does_not_build() {
    assert_eq!(
        RateLimiter::new(1.0, Duration::MAX).unwrap_err(),
        ConfigError::RateIntervalTooLong(Duration::MAX)
    );
}

#[tokio::test(start_paused = true)]
async fn test_longest_interval_delays_without_panicking() {
    let limiter = std::sync::Arc::new(RateLimiter::new(1.0, MAX_RATE_INTERVAL).unwrap());
    limiter.execute_weighted(Weight::ONE, || async {}).await;

    let waiter = {
        let limiter = std::sync::Arc::clone(&limiter);
        tokio::spawn(async move { limiter.execute_weighted(Weight::ONE, || async {}).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(!waiter.is_finished());
    assert_eq!(limiter.metrics().operations_delayed(), 1);
    waiter.abort();
}

#[test]
fn test_weight_validation() {
    assert!(Weight::new(0.0).is_ok());
    assert!(Weight::new(2.98).is_ok());
    assert!(matches!(Weight::new(-1.0), Err(WeightError::Negative(_))));
    assert!(matches!(Weight::new(f64::NAN), Err(WeightError::NotFinite(_))));
    assert!(matches!(
        Weight::try_from(f64::INFINITY),
        Err(WeightError::NotFinite(_))
    ));
}

#[test]
fn test_error_messages() {
    assert_eq!(
        ConfigError::InvalidMaxRate(-2.0).to_string(),
        "max_rate must be a positive finite number, got -2"
    );
    assert_eq!(
        ConfigError::ZeroRateInterval.to_string(),
        "rate_interval must be greater than 0"
    );
}
