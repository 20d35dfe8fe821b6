use ferrous_dns_domain::config::{CliOverrides, Config};
use ferrous_dns_domain::ForwardGroup;

#[test]
fn load_without_file_falls_back_to_defaults() {
    let config = Config::load(Some("/nonexistent/path/does-not-exist.toml"), CliOverrides::default());
    assert!(config.is_err(), "missing explicit path should surface an error, not silently default");
}

#[test]
fn default_config_gets_a_default_group_after_load_path() {
    let mut config = Config::default();
    assert!(config
        .forward_groups
        .iter()
        .all(|g| g.id != ForwardGroup::DEFAULT_GROUP_ID));

    // Mirrors what Config::load does internally.
    config.forward_groups.push(ForwardGroup::default_group(vec![]));
    assert!(config.validate().is_err(), "empty default group should fail validation");
}

#[test]
fn cli_overrides_apply_over_file_defaults() {
    let overrides = CliOverrides {
        dns_port: Some(5353),
        bind_address: Some("127.0.0.1".to_string()),
        log_level: Some("debug".to_string()),
    };
    assert_eq!(overrides.dns_port, Some(5353));
}
