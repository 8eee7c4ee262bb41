//! Configuration loading tests

use radgate::config::{Config, ConfigError};

#[test]
fn toml_config_round_trip_validates() {
    let config = Config::from_toml_str(
        r#"
        [gateway]
        id = "site-gateway"
        store_dir = "/var/lib/radgate/studies"

        [hl7]
        port = 2575
        idle_timeout_secs = 1800

        [dimse]
        local_aet = "SITE_SCP"
        port = 11112

        [sink]
        url = "https://portal.example.org/api/ingest"
        token = "secret"
        "#,
    )
    .expect("TOML parse error");

    config.validate().expect("config should validate");
    assert_eq!(config.gateway.id, "site-gateway");
    assert_eq!(config.dimse.local_aet, "SITE_SCP");
}

#[test]
fn sink_url_is_required() {
    let config = Config::from_toml_str("[gateway]\nid = \"x\"").unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidSink(_))
    ));
}

#[test]
fn invalid_listener_settings_are_rejected() {
    let config = Config::from_toml_str(
        r#"
        [dimse]
        local_aet = "THIS_AE_TITLE_IS_FAR_TOO_LONG"

        [sink]
        url = "https://portal.example.org/api/ingest"
        "#,
    )
    .unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidListener(_))
    ));
}

#[test]
fn environment_loading_overrides_defaults() {
    // The only test in the binary touching the environment, so ordering
    // within it is deterministic.
    assert!(matches!(
        radgate::config::from_env(),
        Err(ConfigError::MissingVar(_))
    ));

    std::env::set_var("RADGATE_SINK_URL", "https://portal.example.org/api/ingest");
    std::env::set_var("RADGATE_SINK_TOKEN", "tok");
    std::env::set_var("RADGATE_HL7_PORT", "12575");
    std::env::set_var("RADGATE_DIMSE_AET", "ENV_SCP");
    std::env::set_var("RADGATE_DIMSE_ENABLED", "false");

    let config = radgate::config::from_env().expect("env config");
    assert_eq!(config.sink.token, "tok");
    assert_eq!(config.hl7.port, 12575);
    assert_eq!(config.dimse.local_aet, "ENV_SCP");
    assert!(!config.gateway.dimse_enabled);
    config.validate().expect("env config should validate");
}
