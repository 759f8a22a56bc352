use duramq::config::{load_config, Driver};

#[test]
fn load_config_matches_toml() {
    let cfg = load_config("duramq.toml").expect("failed to load config");

    assert_eq!(cfg.store.driver, Driver::Sqlite);
    assert_eq!(cfg.store.source, "./data/queue.db");
    assert_eq!(cfg.queue.batch_size, 10);
    assert_eq!(cfg.queue.max_batch_cache_size, 5);
    assert_eq!(cfg.queue.expire_time_ms, 604_800_000);
    assert_eq!(cfg.queue.clean_interval_ms, 3_600_000);
    assert_eq!(cfg.queue.write_timeout_ms, 100);
    assert_eq!(cfg.queue.delete_timeout_ms, 500);
    assert!(cfg.queue.name.is_empty());
}
