use std::time::Duration;

use assert_matches::assert_matches;
use chrono::TimeDelta;

use tle_sync::config::{
    Config, ConfigLoader, PASSWORD_ENV, TrackedEntry, TrackedEntryObject, USERNAME_ENV,
};
use tle_sync::error::TleError;

#[test]
fn parse_tracked_shorthand_and_detailed() {
    let config = Config {
        tracked: vec![
            TrackedEntry::Shorthand("25544@acme".to_string()),
            TrackedEntry::Detailed(TrackedEntryObject {
                catalog_id: 43013,
                owner: "globex".to_string(),
            }),
        ],
        ..Config::default()
    };

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.tracked.len(), 2);
    assert_eq!(resolved.tracked[0].to_string(), "25544@acme");
    assert_eq!(resolved.tracked[1].owner_id.as_str(), "globex");
}

#[test]
fn invalid_tracked_entry_is_rejected() {
    let config = Config {
        tracked: vec![TrackedEntry::Shorthand("ISS".to_string())],
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(TleError::InvalidSpecifier(_))
    );
}

#[test]
fn load_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("tle-sync.json");
    std::fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "catalog": { "base_url": "https://catalog.example", "request_timeout_secs": 10 },
            "credentials": { "username": "ops", "password": "secret" },
            "store": "ledger.json",
            "sync": { "pacing_ms": 250, "max_attempts": 5, "retry_backoff_secs": 5, "cooldown_secs": 120 },
            "tracked": ["25544@acme", { "catalog_id": 20580, "owner": "acme" }]
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(resolved.base_url, "https://catalog.example");
    assert_eq!(resolved.request_timeout, Duration::from_secs(10));
    assert_eq!(resolved.sync.pacing, Duration::from_millis(250));
    assert_eq!(resolved.sync.max_attempts, 5);
    assert_eq!(resolved.session.cooldown, TimeDelta::seconds(120));
    assert_eq!(resolved.session.ttl, TimeDelta::minutes(20));
    assert_eq!(resolved.store_path.as_ref().unwrap().as_str(), "ledger.json");
    assert_eq!(resolved.tracked.len(), 2);
    assert!(resolved.credentials().is_ok());
}

#[test]
fn missing_explicit_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(Some(path.to_str().unwrap())),
        Err(TleError::ConfigRead(_))
    );
}

#[test]
fn credentials_are_required_for_sync() {
    let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
    assert_matches!(resolved.credentials(), Err(TleError::MissingCredentials));
}

#[test]
fn environment_credentials_override_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("tle-sync.json");
    std::fs::write(
        &path,
        r#"{ "credentials": { "username": "file-user", "password": "file-secret" } }"#,
    )
    .unwrap();

    // SAFETY: the other tests in this binary pass with or without these set.
    unsafe {
        std::env::set_var(USERNAME_ENV, "env-user");
        std::env::set_var(PASSWORD_ENV, "env-secret");
    }
    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap()));
    unsafe {
        std::env::remove_var(USERNAME_ENV);
        std::env::remove_var(PASSWORD_ENV);
    }

    let credentials = resolved.unwrap().credentials().unwrap();
    assert_eq!(credentials.username, "env-user");
    assert_eq!(credentials.password, "env-secret");
}
