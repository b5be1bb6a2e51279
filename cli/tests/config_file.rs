use segex_cli::{AppConfig, CliError, Overrides};
use std::path::PathBuf;

#[test]
fn test_load_from_disk_and_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("segex.toml");
    std::fs::write(
        &path,
        r#"
[model]
endpoint = "http://127.0.0.1:9/v1/chat/completions"
model = "local"

[schema]
path = "schema.json"

[method.tools]
think = 4
"#,
    )
    .unwrap();

    let mut config = AppConfig::resolve(Some(&path)).unwrap();
    assert_eq!(config.method.tools.get("think"), 4);
    assert!(config.validate().is_ok());

    config.apply(&Overrides {
        schema: Some(PathBuf::from("other.json")),
        ..Overrides::default()
    });
    assert_eq!(config.schema.path, Some(PathBuf::from("other.json")));
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AppConfig::resolve(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, CliError::Io(_)));
}

#[test]
fn test_non_http_endpoint_fails_validation() {
    let config = AppConfig::parse(
        "[model]\nendpoint = \"ftp://example.com\"\n[schema]\npath = \"s.json\"\n",
    )
    .unwrap();
    assert!(matches!(config.validate(), Err(CliError::Config(_))));
}
