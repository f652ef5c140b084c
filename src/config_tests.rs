//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use super::super::error::BotError;
    use std::collections::HashMap;
    use std::io::Write;

    fn valid() -> Config {
        let mut config = Config::default();
        config.channels.destination = "dest@newsletter".to_string();
        config.channels.sources = vec!["a@newsletter".to_string()];
        config.affiliate.amazon_tag = "mytag-21".to_string();
        config
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_gateway_config_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.url, "http://localhost:3000");
        assert_eq!(config.session, "default");
        assert_eq!(config.fetch_timeout_secs, 10);
        assert_eq!(config.send_timeout_secs, 15);
        assert_eq!(config.health_timeout_secs, 10);
    }

    #[test]
    fn test_forwarder_config_defaults() {
        let config: ForwarderConfig = toml::from_str("").unwrap();
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.batch_size, 6);
        assert_eq!(config.staleness_secs, 300);
        assert_eq!(config.daily_cap_sleep_secs, 3600);
        assert_eq!(config.startup_health_attempts, 30);
    }

    #[test]
    fn test_limits_config_defaults() {
        let config: LimitsConfig = toml::from_str("").unwrap();
        assert_eq!(config.min_send_delay_secs, 8);
        assert_eq!(config.max_daily, 400);
        assert_eq!(config.max_hourly, 35);
        assert_eq!(config.hourly_cooldown_secs, 900);
        assert_eq!(config.jitter_min_ms, 1000);
        assert_eq!(config.jitter_max_ms, 3000);
        assert!(config.human_pauses);
        assert_eq!(config.rng_seed, None);
    }

    #[test]
    fn test_partial_limits_keep_other_defaults() {
        let config: LimitsConfig = toml::from_str("max_hourly = 45\nrng_seed = 7").unwrap();
        assert_eq!(config.max_hourly, 45);
        assert_eq!(config.max_daily, 400);
        assert_eq!(config.rng_seed, Some(7));
    }

    #[test]
    fn test_channel_labels() {
        let config: ChannelsConfig = toml::from_str(
            r#"
            destination = "dest@newsletter"
            sources = ["a@newsletter", "b@newsletter"]
            [labels]
            "a@newsletter" = "Loot Deals"
            "#,
        )
        .unwrap();
        assert_eq!(config.label_for("a@newsletter"), "Loot Deals");
        assert_eq!(config.label_for("b@newsletter"), "b@newsletter");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[channels]
destination = "dest@newsletter"
sources = ["a@newsletter", "b@newsletter"]

[affiliate]
amazon_tag = "file-21"

[limits]
max_daily = 200

[parser]
extra_domains = ["meesho.com"]
"#
        )
        .unwrap();

        let config = Config::load_with(file.path().to_str().unwrap(), no_env).unwrap();
        assert_eq!(config.channels.sources.len(), 2);
        assert_eq!(config.affiliate.amazon_tag, "file-21");
        assert_eq!(config.limits.max_daily, 200);
        assert_eq!(config.limits.max_hourly, 35);
        assert_eq!(config.parser.extra_domains, vec!["meesho.com".to_string()]);
        assert_eq!(config.dashboard.port, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load_with("/nonexistent/forwarder.toml", no_env).unwrap();
        assert_eq!(config.gateway.url, "http://localhost:3000");
        assert!(config.channels.sources.is_empty());
    }

    #[test]
    fn test_legacy_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[gateway]\nurl = \"http://from-file:3000\"").unwrap();

        let env: HashMap<&str, &str> = HashMap::from([
            ("WAHA_URL", "http://waha:3000"),
            ("DESTINATION_CHANNEL", "dest@newsletter"),
            ("SOURCE_CHANNELS", "a@newsletter, b@newsletter,,c@newsletter"),
            ("AMAZON_AFFILIATE_TAG", "env-21"),
            ("CHECK_INTERVAL", "45"),
            ("MAX_HOURLY_MESSAGES", "45"),
            ("PORT", "8080"),
        ]);
        let config = Config::load_with(file.path().to_str().unwrap(), |key| {
            env.get(key).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(config.gateway.url, "http://waha:3000");
        assert_eq!(
            config.channels.sources,
            vec!["a@newsletter", "b@newsletter", "c@newsletter"]
        );
        assert_eq!(config.affiliate.amazon_tag, "env-21");
        assert_eq!(config.forwarder.poll_interval_secs, 45);
        assert_eq!(config.limits.max_hourly, 45);
        assert_eq!(config.dashboard.port, 8080);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_destination() {
        let mut config = valid();
        config.channels.destination = " ".to_string();
        assert!(matches!(config.validate(), Err(BotError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_no_sources() {
        let mut config = valid();
        config.channels.sources.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_tag() {
        let mut config = valid();
        config.affiliate.amazon_tag.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_caps_and_bad_jitter() {
        let mut config = valid();
        config.limits.max_hourly = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.limits.jitter_min_ms = 5000;
        assert!(config.validate().is_err());

        assert!(valid().validate().is_ok());
    }
}
