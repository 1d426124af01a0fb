//! Config save/load roundtrip integration tests.
//!
//! These tests verify that configuration can be serialized, written to disk,
//! and loaded back with identical field values.

use chatrelay_core::config::{BindMode, Config, ConfigBuilder, StoreKind};
use std::path::Path;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chatrelay.json5");

    let config = Config::default();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateway.port, config.gateway.port);
    assert_eq!(loaded.gateway.bind, config.gateway.bind);
    assert_eq!(loaded.gateway.allowed_origins, config.gateway.allowed_origins);
    assert_eq!(loaded.keepalive.pong_wait_ms, config.keepalive.pong_wait_ms);
    assert_eq!(loaded.tickets.retention_ms, config.tickets.retention_ms);
    assert_eq!(loaded.session.outbound_capacity, config.session.outbound_capacity);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chatrelay.json5");

    let config = ConfigBuilder::new()
        .port(9090)
        .bind(BindMode::Lan)
        .store(StoreKind::Memory)
        .pong_wait_ms(2_000)
        .build();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateway.port, 9090);
    assert_eq!(loaded.gateway.bind, BindMode::Lan);
    assert_eq!(loaded.store.kind, StoreKind::Memory);
    assert_eq!(loaded.keepalive.ping_interval().as_millis(), 1_800);
}

#[test]
fn test_config_save_leaves_no_temp_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chatrelay.json5");
    Config::default().save(&path).unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_config_load_nonexistent() {
    let result = Config::load(Path::new("/nonexistent/chatrelay.json5"));
    assert!(result.is_err());
}

#[test]
fn test_config_parse_invalid() {
    let result = Config::parse("not valid json");
    assert!(result.is_err());
}
