//! # Configuration Loading Tests

use kuha_gateway::caching::CacheBackend;
use kuha_gateway::GatewayConfig;
use std::io::Write;
use std::time::Duration;

#[tokio::test]
async fn test_load_from_yaml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
server:
  bind_address: 127.0.0.1
  port: 8282
cache:
  backend: memory
  volatile_ttl: 90s
sources:
  fis:
    url: postgres://localhost/fis
  utv:
    url: postgres://localhost/utv
auth:
  jwt_secret: file-secret
  roles:
    coach: ["GET:/v1/utv"]
"#
    )
    .unwrap();

    let config = GatewayConfig::load_from_file(file.path()).await.unwrap();

    assert_eq!(config.server.port, 8282);
    assert_eq!(config.cache.backend, CacheBackend::Memory);
    assert_eq!(config.cache.volatile_ttl, Duration::from_secs(90));
    assert_eq!(config.auth.roles["coach"], vec!["GET:/v1/utv".to_string()]);
}

#[tokio::test]
async fn test_malformed_file_is_a_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "server: [not, a, map").unwrap();

    let err = GatewayConfig::load_from_file(file.path()).await.unwrap_err();
    assert!(err.to_string().contains("Failed to parse config"));
}

#[tokio::test]
async fn test_missing_file_falls_back_to_defaults_and_validates() {
    let dir = tempfile::tempdir().unwrap();
    let result = GatewayConfig::load_or_default(dir.path().join("absent.yaml")).await;

    // Defaults carry no connection settings.
    assert!(result.is_err());
}
