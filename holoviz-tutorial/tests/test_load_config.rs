use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

use holoviz_tutorial::load_config::{load_config, DEFAULT_DATA_DIR};
use holoviz_tutorial_core::config::DEFAULT_MAX_CONCURRENCY;

/// A full config file maps onto both the fetch and the archive settings.
#[test]
fn test_load_config_success_overrides_defaults() {
    let config_yaml = r#"
download:
  data_dir: ./tmp/datasets
  concurrency: 3
  targets:
    - url: "https://example.org/a.parq"
      description: A
      filename: a.parq
archive:
  included_subtree: lessons
  excluded_dir_names: [cache]
  include_directories: false
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let config = load_config(Some(config_file.path())).expect("Config should load");

    let fetch = config.fetch_config(None);
    assert_eq!(fetch.data_dir, PathBuf::from("./tmp/datasets"));
    assert_eq!(fetch.concurrency, 3);
    assert_eq!(fetch.targets.len(), 1);
    assert_eq!(fetch.targets[0].url, "https://example.org/a.parq");
    assert_eq!(fetch.targets[0].filename, "a.parq");

    let archive = config.archive_config(std::path::Path::new("/project"));
    assert_eq!(archive.included_subtree, PathBuf::from("lessons"));
    assert_eq!(archive.excluded_dir_names, vec!["cache"]);
    assert_eq!(archive.excluded_file_names, vec!["conf.py"]);
    assert!(!archive.include_directories);
    assert_eq!(archive.output_path, PathBuf::from("/project/holoviz_tutorial.zip"));
}

/// Without a file the built-in tutorial targets are used.
#[test]
fn test_load_config_defaults_without_file() {
    let config = load_config(None::<PathBuf>).expect("defaults");
    let fetch = config.fetch_config(None);

    assert_eq!(fetch.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    let filenames: Vec<_> = fetch.targets.iter().map(|t| t.filename.as_str()).collect();
    assert_eq!(filenames, ["raster.zip", "earthquakes-projected.parq"]);
    assert!(fetch.concurrency <= DEFAULT_MAX_CONCURRENCY);
}

#[test]
fn test_command_line_data_dir_wins() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "download:\n  data_dir: from-file\n").unwrap();

    let config = load_config(Some(config_file.path())).unwrap();
    let fetch = config.fetch_config(Some(PathBuf::from("from-cli")));
    assert_eq!(fetch.data_dir, PathBuf::from("from-cli"));
}

#[test]
fn test_load_config_errors_for_invalid_file() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), b"not-yaml: [:::").unwrap();

    let err = load_config(Some(config_file.path())).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[test]
fn test_load_config_errors_for_missing_file() {
    let err = load_config(Some("/no/such/config.yaml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
