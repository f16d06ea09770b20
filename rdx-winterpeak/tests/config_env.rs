//! Environment overrides mutate process state, so they live in their own
//! test binary with a single test.

mod common;

use std::io::Write;
use winterpeak::config::load_config;

#[test]
fn environment_overrides_the_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(common::CONFIG.as_bytes()).unwrap();

    std::env::set_var("WINTERPEAK__EVENTS__EVENT_REFRESH_SECONDS", "120");
    let config = load_config(file.path());
    std::env::remove_var("WINTERPEAK__EVENTS__EVENT_REFRESH_SECONDS");

    let config = config.unwrap();
    assert_eq!(config.events.event_refresh_seconds, 120);
    assert_eq!(config.refresh_ttl(), chrono::Duration::minutes(2));
    assert_eq!(config.publisher.interval_seconds, 1);
}
