use std::fs::write;
use tempfile::NamedTempFile;

use holoviz_tutorial_core::contract::VersionCheckError;
use holoviz_tutorial_core::version_check::{
    check_manifest, check_packages, required_versions, InstalledVersions, PackageStatus,
    PythonInterpreter, StaticVersions, ALL_OK_MESSAGE,
};

fn manifest(content: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), content).unwrap();
    file
}

const PIXI_TOML: &str = r#"
[workspace]
name = "holoviz-tutorial"
channels = ["conda-forge"]

[dependencies]
foo = "==1.2.0"
bokeh = ">=3.5.0,<3.7"
datashader = ">=0.16"
panel = { version = ">=1.5", channel = "pyviz" }
"#;

#[test]
fn older_installed_version_is_reported() {
    let file = manifest(PIXI_TOML);
    let installed = StaticVersions::new().with("foo", "1.1.0");

    let report = check_manifest(file.path(), &["foo"], &installed).unwrap();

    assert!(report.error_found());
    assert_eq!(
        report.checks[0].status,
        PackageStatus::Outdated {
            required: "1.2.0".to_string(),
            installed: "1.1.0".to_string()
        }
    );
    assert_eq!(
        report.lines(),
        vec!["Error: foo expected version 1.2.0, got 1.1.0"]
    );
}

#[test]
fn equal_or_newer_versions_pass() {
    let file = manifest(PIXI_TOML);
    for version in ["1.2.0", "1.2", "1.2.1", "2.0.0rc1"] {
        let installed = StaticVersions::new().with("foo", version);
        let report = check_manifest(file.path(), &["foo"], &installed).unwrap();
        assert!(!report.error_found(), "{version} should satisfy ==1.2.0");
        assert_eq!(report.lines(), vec![ALL_OK_MESSAGE]);
    }
}

#[test]
fn absent_packages_are_reported_as_missing() {
    let required = required_versions(manifest(PIXI_TOML).path()).unwrap();
    let installed = StaticVersions::new()
        .with("bokeh", "3.6.2")
        .with("hvplot", "0.11.1");

    // datashader: in manifest, not installed. hvplot: installed, not in manifest.
    let report = check_packages(&["bokeh", "datashader", "hvplot"], &required, &installed);

    let statuses: Vec<_> = report.checks.iter().map(|c| &c.status).collect();
    assert!(matches!(statuses[0], PackageStatus::Ok { .. }));
    assert_eq!(statuses[1], &PackageStatus::Missing);
    assert_eq!(statuses[2], &PackageStatus::Missing);
    assert_eq!(
        report.lines(),
        vec![
            "datashader is not installed or not specified in the TOML configuration.",
            "hvplot is not installed or not specified in the TOML configuration.",
        ]
    );
}

#[test]
fn table_dependencies_accept_any_installed_version() {
    let required = required_versions(manifest(PIXI_TOML).path()).unwrap();
    let installed = StaticVersions::new().with("panel", "0.1.0");

    let report = check_packages(&["panel"], &required, &installed);
    assert!(!report.error_found());
}

#[test]
fn unparseable_installed_version_is_an_error() {
    let required = required_versions(manifest(PIXI_TOML).path()).unwrap();
    let installed = StaticVersions::new().with("foo", "unknown");

    let report = check_packages(&["foo"], &required, &installed);
    assert!(report.error_found());
    assert!(matches!(
        report.checks[0].status,
        PackageStatus::Unparseable { .. }
    ));
}

#[test]
fn unreadable_manifest_is_an_error() {
    let err = required_versions(std::path::Path::new("/definitely/not/pixi.toml")).unwrap_err();
    assert!(matches!(err, VersionCheckError::Read { .. }));

    let broken = manifest("[dependencies\nfoo = ");
    let err = required_versions(broken.path()).unwrap_err();
    assert!(matches!(err, VersionCheckError::Parse { .. }));
    assert!(err.to_string().contains("TOML"));
}

#[test]
fn interpreter_that_cannot_launch_reports_nothing_installed() {
    let dir = tempfile::tempdir().unwrap();
    let python = PythonInterpreter::new(dir.path().join("no-such-python"));
    assert_eq!(python.installed_version("panel"), None);
}

#[cfg(unix)]
#[test]
fn interpreter_output_is_trimmed_and_import_failures_are_missing() {
    use std::os::unix::fs::PermissionsExt;

    // Stands in for `python -c <code> <package>`; the package is the third argument.
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake-python");
    write(
        &script,
        r#"#!/bin/sh
case "$3" in
  panel) printf '  1.5.2\n\n' ;;
  silent) ;;
  *) echo "ModuleNotFoundError: No module named '$3'" >&2; exit 1 ;;
esac
"#,
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let python = PythonInterpreter::new(&script);
    assert_eq!(python.installed_version("panel").as_deref(), Some("1.5.2"));
    assert_eq!(python.installed_version("silent"), None);
    assert_eq!(python.installed_version("notinstalled"), None);

    let report = check_packages(
        &["panel", "notinstalled"],
        &[
            ("panel".to_string(), Some("1.5.0".to_string())),
            ("notinstalled".to_string(), None),
        ]
        .into_iter()
        .collect(),
        &python,
    );
    assert_eq!(
        report.checks[0].status,
        PackageStatus::Ok {
            installed: "1.5.2".to_string()
        }
    );
    assert_eq!(report.checks[1].status, PackageStatus::Missing);
}
