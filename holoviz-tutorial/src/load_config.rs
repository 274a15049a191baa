/// `load_config` module: Loads the optional YAML tooling config and adapts it into core configs.
///
/// This module is the only place where user-supplied YAML is parsed. Every key is optional;
/// anything left out falls back to the tutorial's built-in defaults
/// ([`ArchiveConfig::holoviz`], [`FetchConfig::holoviz`]).
///
/// # Errors
/// All errors in this module use `anyhow::Error` and are surfaced at the CLI boundary.
/// Read and parse failures name the offending file.
///
/// Accepted shape:
///
/// ```yaml
/// download:
///   data_dir: ./tutorial/data
///   concurrency: 2
///   targets:
///     - url: https://datasets.holoviz.org/earthquakes/v1/earthquakes-projected.parq
///       description: Earthquakes
///       filename: earthquakes-projected.parq
/// archive:
///   included_subtree: tutorial
///   excluded_file_names: [conf.py]
///   excluded_dir_names: [data, .ipynb_checkpoints, __pycache__]
///   include_directories: true
/// ```
use anyhow::Result;
use holoviz_tutorial_core::config::{ArchiveConfig, DownloadTarget, FetchConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Data directory used when neither the config nor the command line names one.
pub const DEFAULT_DATA_DIR: &str = "tutorial/data";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    #[serde(default)]
    pub download: DownloadSection,
    #[serde(default)]
    pub archive: ArchiveSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadSection {
    pub data_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub targets: Vec<DownloadTarget>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveSection {
    pub top_level_files: Option<Vec<String>>,
    pub included_subtree: Option<PathBuf>,
    pub excluded_file_names: Option<Vec<String>>,
    pub excluded_dir_names: Option<Vec<String>>,
    pub include_directories: Option<bool>,
}

impl CliConfig {
    /// Fetch settings; `data_dir` from the command line wins over the file.
    pub fn fetch_config(&self, data_dir: Option<PathBuf>) -> FetchConfig {
        let data_dir = data_dir
            .or_else(|| self.download.data_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let mut config = if self.download.targets.is_empty() {
            FetchConfig::holoviz(data_dir)
        } else {
            FetchConfig::new(data_dir, self.download.targets.clone())
        };
        if let Some(concurrency) = self.download.concurrency {
            config = config.with_concurrency(concurrency);
        }
        config
    }

    pub fn archive_config(&self, base_dir: &Path) -> ArchiveConfig {
        let section = &self.archive;
        let mut config = ArchiveConfig::holoviz(base_dir);
        if let Some(files) = &section.top_level_files {
            config.top_level_files = files.clone();
        }
        if let Some(subtree) = &section.included_subtree {
            config.included_subtree = subtree.clone();
        }
        if let Some(names) = &section.excluded_file_names {
            config.excluded_file_names = names.clone();
        }
        if let Some(names) = &section.excluded_dir_names {
            config.excluded_dir_names = names.clone();
        }
        if let Some(include) = section.include_directories {
            config.include_directories = include;
        }
        config
    }
}

/// Loads a YAML config file. Returns the defaults when `path` is `None`.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<CliConfig> {
    let Some(path) = path else {
        info!("No config file given, using built-in defaults");
        return Ok(CliConfig::default());
    };
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a valid, all-defaults config.
    if config_content.trim().is_empty() {
        return Ok(CliConfig::default());
    }

    match serde_yaml::from_str::<CliConfig>(&config_content) {
        Ok(conf) => {
            info!(
                config_path = ?path_ref,
                targets = conf.download.targets.len(),
                "Parsed config YAML successfully"
            );
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!(
                "Failed to parse config YAML {:?}: {e}",
                path_ref
            ))
        }
    }
}
