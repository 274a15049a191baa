use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the packaged tutorial, written at the project root.
pub const ARCHIVE_NAME: &str = "holoviz_tutorial.zip";

/// Upper bound for the default worker-pool size.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// What goes into the tutorial archive and where it is written.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub base_dir: PathBuf,
    pub output_path: PathBuf,
    /// Root-relative files always stored under their bare name.
    pub top_level_files: Vec<String>,
    /// Directory (relative to `base_dir`) packaged recursively.
    pub included_subtree: PathBuf,
    /// File names dropped wherever they appear.
    pub excluded_file_names: Vec<String>,
    /// Path components that exclude any entry containing them.
    pub excluded_dir_names: Vec<String>,
    /// Write non-excluded directories as explicit `dir/` members.
    pub include_directories: bool,
}

impl ArchiveConfig {
    /// The tutorial's packaging rules rooted at `base_dir`.
    pub fn holoviz(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            output_path: base_dir.join(ARCHIVE_NAME),
            base_dir,
            top_level_files: vec!["pixi.toml".to_string(), "pixi.lock".to_string()],
            included_subtree: PathBuf::from("tutorial"),
            excluded_file_names: vec!["conf.py".to_string()],
            excluded_dir_names: vec![
                "data".to_string(),
                ".ipynb_checkpoints".to_string(),
                "__pycache__".to_string(),
            ],
            include_directories: true,
        }
    }

    pub fn with_output_path(mut self, output_path: impl Into<PathBuf>) -> Self {
        self.output_path = output_path.into();
        self
    }

    pub fn trace_loaded(&self) {
        info!(
            base_dir = %self.base_dir.display(),
            output_path = %self.output_path.display(),
            subtree = %self.included_subtree.display(),
            "Loaded ArchiveConfig"
        );
        debug!(?self, "ArchiveConfig loaded (full debug)");
    }
}

/// One remote resource to materialize under the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DownloadTarget {
    pub url: String,
    /// Label shown next to the progress bar.
    pub description: String,
    pub filename: String,
}

impl DownloadTarget {
    pub fn new(
        url: impl Into<String>,
        description: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            description: description.into(),
            filename: filename.into(),
        }
    }

    /// Where the raw download lands.
    pub fn destination(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.filename)
    }
}

/// The datasets used throughout the tutorial notebooks.
pub fn holoviz_targets() -> Vec<DownloadTarget> {
    vec![
        DownloadTarget::new(
            "https://datasets.holoviz.org/population/v1/gpw_v4_population_density_rev11_2010_2pt5_min.zip",
            "Population Raster",
            "raster.zip",
        ),
        DownloadTarget::new(
            "https://datasets.holoviz.org/earthquakes/v1/earthquakes-projected.parq",
            "Earthquakes",
            "earthquakes-projected.parq",
        ),
    ]
}

/// Dataset fetch configuration: which targets, where, and how many at once.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub data_dir: PathBuf,
    pub targets: Vec<DownloadTarget>,
    /// Worker-pool size; always at least 1 once resolved.
    pub concurrency: usize,
    pub show_progress: bool,
}

impl FetchConfig {
    pub fn new(data_dir: impl Into<PathBuf>, targets: Vec<DownloadTarget>) -> Self {
        let concurrency = default_concurrency(targets.len());
        Self {
            data_dir: data_dir.into(),
            targets,
            concurrency,
            show_progress: true,
        }
    }

    pub fn holoviz(data_dir: impl Into<PathBuf>) -> Self {
        Self::new(data_dir, holoviz_targets())
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn trace_loaded(&self) {
        info!(
            data_dir = %self.data_dir.display(),
            targets_count = self.targets.len(),
            concurrency = self.concurrency,
            "Loaded FetchConfig"
        );
        for target in &self.targets {
            debug!(url = %target.url, filename = %target.filename, "Loaded download target");
        }
    }
}

/// One worker per target, capped at [`DEFAULT_MAX_CONCURRENCY`].
pub fn default_concurrency(targets: usize) -> usize {
    targets.clamp(1, DEFAULT_MAX_CONCURRENCY)
}
