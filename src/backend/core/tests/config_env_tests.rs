//! Environment overrides applied by `Config::load`.
//!
//! Kept in its own test binary so the variables set here do not leak into
//! the file-based configuration tests.

use lumen_core::config::Config;
use lumen_core::middleware::rate_limit::RateLimitPolicy;
use std::time::Duration;

#[test]
fn test_env_capacity_override_keeps_policy_window() {
    std::env::set_var("LUMEN__RATE_LIMIT__AUTH__CAPACITY", "200");

    let config = Config::load(None).unwrap();

    assert_eq!(config.rate_limit.auth.capacity, 200);
    assert_eq!(config.rate_limit.auth.window, Duration::from_secs(15 * 60));
    assert_eq!(config.rate_limit.default, RateLimitPolicy::default_policy());
    assert_eq!(config.rate_limit.upload, RateLimitPolicy::upload());
}
