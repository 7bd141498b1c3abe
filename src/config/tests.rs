use super::types::*;
use super::AppConfig;
use std::path::Path;

#[test]
fn test_load_missing_file_uses_defaults() {
    let cfg = AppConfig::load(Path::new("/nonexistent/tpm-gate.toml")).unwrap();
    assert_eq!(cfg.coordination.url, "redis://127.0.0.1:6379");
    assert_eq!(cfg.admission.window_seconds, 60);
}

#[test]
fn test_load_toml_config() {
    let toml_str = r#"
[coordination]
url = "redis://cache:6379"
pool_size = 32

[admission]
window_seconds = 120
"#;
    let tmp = std::env::temp_dir().join("tpm_gate_test_config.toml");
    std::fs::write(&tmp, toml_str).unwrap();
    let cfg = AppConfig::load(&tmp).unwrap();
    assert_eq!(cfg.coordination.url, "redis://cache:6379");
    assert_eq!(cfg.coordination.pool_size, 32);
    assert_eq!(cfg.admission.window_seconds, 120);
    std::fs::remove_file(&tmp).ok();
}

#[test]
fn test_load_json_config() {
    let json = r#"{
        "coordination": { "url": "redis://127.0.0.1:6380" },
        "admission": { "window_seconds": 30 }
    }"#;
    let tmp = std::env::temp_dir().join("tpm_gate_test_config.json");
    std::fs::write(&tmp, json).unwrap();
    let cfg = AppConfig::load(&tmp).unwrap();
    assert_eq!(cfg.coordination.url, "redis://127.0.0.1:6380");
    assert_eq!(cfg.admission.window_seconds, 30);
    std::fs::remove_file(&tmp).ok();
}

#[test]
fn test_env_override_wins_over_file() {
    let tmp = std::env::temp_dir().join("tpm_gate_test_env_override.toml");
    std::fs::write(&tmp, "[coordination]\nurl = \"redis://file:6379\"\n").unwrap();

    std::env::set_var("COORDINATION_URL", "redis://env:6379");
    let cfg = AppConfig::load(&tmp).unwrap();
    std::env::remove_var("COORDINATION_URL");

    assert_eq!(cfg.coordination.url, "redis://env:6379");
    std::fs::remove_file(&tmp).ok();
}

#[test]
fn test_validate_empty_coordination_url_fails() {
    let mut cfg = AppConfig::default();
    cfg.coordination.url = String::new();
    assert!(cfg.validate().is_err());
}

#[test]
fn test_validate_zero_window_fails() {
    let mut cfg = AppConfig::default();
    cfg.admission.window_seconds = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_validate_empty_tier_table_fails() {
    let mut cfg = AppConfig::default();
    cfg.tiers.rpm = vec![];
    assert!(cfg.validate().is_err());
}

#[test]
fn test_validate_default_config_is_valid() {
    assert!(AppConfig::default().validate().is_ok());
}

#[test]
fn test_unsupported_format_errors() {
    let tmp = std::env::temp_dir().join("tpm_gate_test.yml");
    std::fs::write(&tmp, "key: value").unwrap();
    assert!(AppConfig::load(&tmp).is_err());
    std::fs::remove_file(&tmp).ok();
}

#[test]
fn test_no_extension_errors() {
    let tmp = std::env::temp_dir().join("tpm_gate_test_no_ext");
    std::fs::write(&tmp, "anything").unwrap();
    assert!(AppConfig::load(&tmp).is_err());
    std::fs::remove_file(&tmp).ok();
}

#[test]
fn test_server_defaults() {
    let server = ServerConfig::default();
    assert_eq!(server.listen_addr, "0.0.0.0:8080");
    assert_eq!(server.admin_listen_addr, "0.0.0.0:9090");
    assert_eq!(server.drain_timeout_secs, 10);
}
