use starport_authority::{AuthorityConfig, AuthorityError, TemplateConfig};
use starport_types::TemplateId;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[test]
fn defaults_are_valid() {
    let config = AuthorityConfig::default();
    assert_ok!(config.validate());
    assert_eq!(config.disposal_duration(), Duration::from_secs(3));
    assert_eq!(config.policy_timeout(), Duration::from_secs(1));
    assert_eq!(config.actor_template, TemplateId::new("character"));
    assert!(config.actor_spawn_points.is_empty());
}

#[test]
fn from_json_fills_missing_fields() {
    let config = assert_ok!(AuthorityConfig::from_json(
        r#"{
            "default_population_cap": 8,
            "templates": [
                { "id": "crate", "population_cap": 2 },
                { "id": "barrel" }
            ]
        }"#,
    ));

    assert_eq!(config.command_capacity, 32);
    assert_eq!(config.population_cap(&TemplateId::new("crate")), Some(2));
    assert_eq!(config.population_cap(&TemplateId::new("barrel")), Some(8));
    assert_eq!(config.population_cap(&TemplateId::new("ghost")), None);
}

#[test]
fn from_json_rejects_invalid_values() {
    let err = assert_err!(AuthorityConfig::from_json(r#"{ "command_capacity": 0 }"#));
    assert!(matches!(err, AuthorityError::Config(_)));

    let err = assert_err!(AuthorityConfig::from_json(r#"{ "spawn_block_radius": -1.0 }"#));
    assert!(matches!(err, AuthorityError::Config(_)));

    let err = assert_err!(AuthorityConfig::from_json("not json"));
    assert!(matches!(err, AuthorityError::Serialization(_)));
}

#[test]
fn zero_template_cap_is_rejected() {
    let config = AuthorityConfig::default().with_template(TemplateConfig::new("crate").with_cap(0));
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("crate"));
}

#[test]
fn short_disposal_duration_is_rejected() {
    let config = AuthorityConfig {
        disposal_duration_ms: 10,
        ..AuthorityConfig::default()
    };
    assert!(matches!(config.validate(), Err(AuthorityError::Config(_))));
}
