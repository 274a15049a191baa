//! Installed-package checks against the constraints declared in `pixi.toml`.
//!
//! Only the lower bound of a constraint matters: the text following the first
//! `==` (or, failing that, `>=`) up to the next comma. An installed version
//! below that bound is an error; anything at or above it passes.
//!
//! Problems with individual packages never surface as `Err`: they are
//! collected into a [`VersionReport`] for the caller to print.

use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

use crate::contract::VersionCheckError;

const DELIMITERS: [&str; 2] = ["==", ">="];

/// Lower-bound version from a manifest constraint string.
///
/// `">=1.2,<2"` gives `1.2`; a string without a recognised delimiter is taken whole.
pub fn parse_constraint(raw: &str) -> Option<String> {
    let version = DELIMITERS
        .iter()
        .find_map(|delimiter| {
            raw.split(delimiter)
                .nth(1)
                .map(|rest| rest.split(',').next().unwrap_or(rest))
        })
        .unwrap_or(raw)
        .trim();
    (!version.is_empty()).then(|| version.to_string())
}

/// Package name to required version (`None` when unconstrained) from the manifest.
pub fn required_versions(
    manifest_path: &Path,
) -> Result<BTreeMap<String, Option<String>>, VersionCheckError> {
    let content = std::fs::read_to_string(manifest_path).map_err(|source| VersionCheckError::Read {
        path: manifest_path.to_path_buf(),
        source,
    })?;
    let required = required_versions_from_str(&content).map_err(|source| VersionCheckError::Parse {
        path: manifest_path.to_path_buf(),
        source,
    })?;
    info!(
        manifest = %manifest_path.display(),
        packages = required.len(),
        "Read dependency constraints"
    );
    Ok(required)
}

pub fn required_versions_from_str(
    content: &str,
) -> Result<BTreeMap<String, Option<String>>, toml::de::Error> {
    let manifest: toml::Table = content.parse()?;
    let Some(dependencies) = manifest.get("dependencies").and_then(|d| d.as_table()) else {
        debug!("Manifest has no [dependencies] table");
        return Ok(BTreeMap::new());
    };
    Ok(dependencies
        .iter()
        .map(|(name, value)| {
            let required = value.as_str().and_then(parse_constraint);
            (name.clone(), required)
        })
        .collect())
}

/// A release version with PEP 440 ordering.
///
/// Local version labels (`+cu118`) are accepted and ignored for comparison.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(u8, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
}

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?ix)^\s*v?
            (?:(?P<epoch>\d+)!)?
            (?P<release>\d+(?:\.\d+)*)
            (?:[-_.]?(?P<pre_l>alpha|a|beta|b|preview|pre|rc|c)[-_.]?(?P<pre_n>\d*))?
            (?:-(?P<post_implicit>\d+)|[-_.]?(?:post|rev|r)[-_.]?(?P<post_n>\d*))?
            (?:[-_.]?(?P<dev>dev)[-_.]?(?P<dev_n>\d*))?
            (?:\+[a-z0-9]+(?:[-_.][a-z0-9]+)*)?
            \s*$",
        )
        .expect("version pattern is valid")
    })
}

impl Version {
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = version_pattern().captures(raw)?;
        let number = |s: &str| -> Option<u64> {
            if s.is_empty() {
                Some(0)
            } else {
                s.parse().ok()
            }
        };

        let epoch = caps.name("epoch").map_or(Some(0), |m| number(m.as_str()))?;
        let release = caps["release"]
            .split('.')
            .map(|part| part.parse().ok())
            .collect::<Option<Vec<u64>>>()?;
        let pre = match caps.name("pre_l") {
            Some(label) => {
                let phase = match label.as_str().to_ascii_lowercase().as_str() {
                    "a" | "alpha" => 0,
                    "b" | "beta" => 1,
                    _ => 2,
                };
                let n = number(caps.name("pre_n").map_or("", |m| m.as_str()))?;
                Some((phase, n))
            }
            None => None,
        };
        let post = if let Some(m) = caps.name("post_implicit") {
            Some(number(m.as_str())?)
        } else if let Some(m) = caps.name("post_n") {
            // Empty for a bare `1.0.post`, which still marks a post-release.
            Some(number(m.as_str())?)
        } else {
            None
        };
        let dev = match caps.name("dev") {
            Some(_) => Some(number(caps.name("dev_n").map_or("", |m| m.as_str()))?),
            None => None,
        };

        Some(Self {
            raw: raw.trim().to_string(),
            epoch,
            release,
            pre,
            post,
            dev,
        })
    }

    fn trimmed_release(&self) -> &[u64] {
        let len = self
            .release
            .iter()
            .rposition(|part| *part != 0)
            .map_or(0, |i| i + 1);
        &self.release[..len]
    }

    fn sort_key(&self) -> (u64, &[u64], (i8, u64), (i8, u64), (i8, u64)) {
        let pre = match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => (-1, 0),
            (Some((phase, n)), _, _) => (phase as i8, n),
            _ => (3, 0),
        };
        let post = self.post.map_or((-1, 0), |n| (0, n));
        let dev = self.dev.map_or((1, 0), |n| (0, n));
        (self.epoch, self.trimmed_release(), pre, post, dev)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Source of installed package versions.
pub trait InstalledVersions {
    fn installed_version(&self, package: &str) -> Option<String>;
}

/// Versions supplied up front, e.g. from the command line.
#[derive(Debug, Clone, Default)]
pub struct StaticVersions {
    versions: HashMap<String, String>,
}

impl StaticVersions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, package: impl Into<String>, version: impl Into<String>) -> Self {
        self.versions.insert(package.into(), version.into());
        self
    }
}

impl FromIterator<(String, String)> for StaticVersions {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            versions: iter.into_iter().collect(),
        }
    }
}

impl InstalledVersions for StaticVersions {
    fn installed_version(&self, package: &str) -> Option<String> {
        self.versions.get(package).cloned()
    }
}

/// Asks a Python interpreter for `module.__version__`.
#[derive(Debug, Clone)]
pub struct PythonInterpreter {
    executable: PathBuf,
}

const VERSION_PROBE: &str =
    "import importlib, sys; print(importlib.import_module(sys.argv[1]).__version__)";

impl PythonInterpreter {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

impl InstalledVersions for PythonInterpreter {
    fn installed_version(&self, package: &str) -> Option<String> {
        let output = Command::new(&self.executable)
            .arg("-c")
            .arg(VERSION_PROBE)
            .arg(package)
            .output();
        match output {
            Ok(out) if out.status.success() => {
                let version = String::from_utf8_lossy(&out.stdout).trim().to_string();
                (!version.is_empty()).then_some(version)
            }
            Ok(out) => {
                debug!(
                    package,
                    status = ?out.status,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "Module not importable"
                );
                None
            }
            Err(e) => {
                warn!(
                    error = ?e,
                    python = %self.executable.display(),
                    "Failed to launch Python interpreter"
                );
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PackageStatus {
    Ok { installed: String },
    /// Not installed, or not listed in the manifest.
    Missing,
    Unparseable { installed: String },
    Outdated { required: String, installed: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageCheck {
    pub package: String,
    pub status: PackageStatus,
}

impl PackageCheck {
    pub fn is_error(&self) -> bool {
        !matches!(self.status, PackageStatus::Ok { .. })
    }

    /// User-facing line for a failed check.
    pub fn message(&self) -> Option<String> {
        let pkg = &self.package;
        match &self.status {
            PackageStatus::Ok { .. } => None,
            PackageStatus::Missing => Some(format!(
                "{pkg} is not installed or not specified in the TOML configuration."
            )),
            PackageStatus::Unparseable { installed } => Some(format!(
                "Error: {pkg} reports an unrecognised version {installed}"
            )),
            PackageStatus::Outdated {
                required,
                installed,
            } => Some(format!(
                "Error: {pkg} expected version {required}, got {installed}"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VersionReport {
    pub checks: Vec<PackageCheck>,
}

pub const ALL_OK_MESSAGE: &str = "All specified packages are correctly installed.";

impl VersionReport {
    pub fn error_found(&self) -> bool {
        self.checks.iter().any(PackageCheck::is_error)
    }

    /// Lines to print: one per problem, or the all-clear summary.
    pub fn lines(&self) -> Vec<String> {
        if !self.error_found() {
            return vec![ALL_OK_MESSAGE.to_string()];
        }
        self.checks.iter().filter_map(PackageCheck::message).collect()
    }
}

/// Compare each package's installed version with its manifest constraint.
pub fn check_packages<S: AsRef<str>>(
    packages: &[S],
    required: &BTreeMap<String, Option<String>>,
    installed: &dyn InstalledVersions,
) -> VersionReport {
    let checks = packages
        .iter()
        .map(|pkg| {
            let package = pkg.as_ref().to_string();
            let status = check_one(&package, required, installed);
            if let PackageStatus::Ok { installed } = &status {
                debug!(package = %package, installed = %installed, "Package satisfies constraint");
            } else {
                warn!(package = %package, status = ?status, "Package check failed");
            }
            PackageCheck { package, status }
        })
        .collect();
    let report = VersionReport { checks };
    match serde_json::to_string_pretty(&report) {
        Ok(json) => debug!(json = %json, "Version report"),
        Err(e) => error!(error = ?e, "Failed to serialize version report"),
    }
    report
}

fn check_one(
    package: &str,
    required: &BTreeMap<String, Option<String>>,
    versions: &dyn InstalledVersions,
) -> PackageStatus {
    let (Some(requirement), Some(installed)) =
        (required.get(package), versions.installed_version(package))
    else {
        return PackageStatus::Missing;
    };
    let Some(required) = requirement else {
        return PackageStatus::Ok { installed };
    };
    let Some(required_version) = Version::parse(required) else {
        warn!(package, required = %required, "Unrecognised version constraint, treating as unconstrained");
        return PackageStatus::Ok { installed };
    };
    let Some(installed_version) = Version::parse(&installed) else {
        return PackageStatus::Unparseable { installed };
    };
    if installed_version < required_version {
        PackageStatus::Outdated {
            required: required.clone(),
            installed,
        }
    } else {
        PackageStatus::Ok { installed }
    }
}

/// Read `manifest_path` and check `packages` against it.
pub fn check_manifest<S: AsRef<str>>(
    manifest_path: &Path,
    packages: &[S],
    installed: &dyn InstalledVersions,
) -> Result<VersionReport, VersionCheckError> {
    let required = required_versions(manifest_path)?;
    Ok(check_packages(packages, &required, installed))
}
