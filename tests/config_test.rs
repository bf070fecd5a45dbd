// Test configuration loading
use ceye::config::Config;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_test_config() {
    let config_path = Path::new("tests/test_config.toml");
    let config = Config::from_file(config_path).expect("Failed to load test config");

    assert_eq!(config.targets, vec!["ibm.com", "hilton.com", "example.org"]);

    // Verify certstream config
    assert_eq!(config.certstream.url, "ws://127.0.0.1:4000/full-stream");
    assert_eq!(config.certstream.reconnect_delay_secs, 7);

    // Verify webhook config
    let webhook = config.webhook.as_ref().unwrap();
    assert_eq!(webhook.secret, Some("test_secret_key".to_string()));
    assert_eq!(
        config.webhook_url(),
        Some("https://discord.com/api/webhooks/123/token")
    );

    // Verify batching and delivery policies
    let batch = config.batching.batch_policy();
    assert_eq!(batch.debounce, Duration::from_millis(2500));
    assert_eq!(batch.max_batch_size, 10);
    assert_eq!(batch.max_concurrent_deliveries, 2);

    let delivery = config.delivery_policy();
    assert_eq!(delivery.max_retries, 5);
    assert_eq!(delivery.rate_limit_wait, Duration::from_millis(500));
    assert_eq!(delivery.timeout, Duration::from_secs(15));

    assert_eq!(
        config.cache_path().unwrap(),
        PathBuf::from("/var/lib/ceye/cache.json")
    );
    assert_eq!(config.logging.level, "debug");
    assert!(config.stats.enabled);
    assert_eq!(config.stats.interval_secs, 60);

    assert!(config.validate().is_ok());
}

#[test]
fn test_template_then_save_webhook() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ceye").join("config.toml");

    Config::write_template(&path, None).unwrap();
    let config = Config::from_file(&path).unwrap();
    assert!(config.targets.is_empty());
    assert_eq!(config.webhook_url(), None);
    // An empty target list is rejected until the user edits the file
    assert!(config.validate().is_err());

    Config::save_webhook(&path, "https://discord.com/api/webhooks/9/abc").unwrap();
    let config = Config::from_file(&path).unwrap();
    assert_eq!(
        config.webhook_url(),
        Some("https://discord.com/api/webhooks/9/abc")
    );
    assert_eq!(config.batching.max_batch_size, 25);
    assert_eq!(config.certstream.reconnect_delay_secs, 5);
}
