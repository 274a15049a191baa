///
/// This module implements the CLI interface for the HoloViz tutorial tooling: command parsing,
/// argument validation and the user-visible output of each command.
///
/// All behavior lives in the [`holoviz-tutorial-core`] crate. This module is strictly CLI glue.
///
/// ## Commands
/// - `archive`: package the tutorial into `holoviz_tutorial.zip`
/// - `download-data`: fetch the tutorial datasets into the data directory
/// - `check-packages`: compare installed package versions with `pixi.toml`
///
/// For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`holoviz-tutorial-core`]: ../../holoviz-tutorial-core/
use crate::load_config::load_config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use holoviz_tutorial_core::archive::build_archive;
use holoviz_tutorial_core::contract::Fetcher;
use holoviz_tutorial_core::download::{
    DefaultFetcher, FetchEvent, FetchOutcome, LocalAsset, TargetOutcome,
};
use holoviz_tutorial_core::version_check::{
    check_manifest, InstalledVersions, PythonInterpreter, StaticVersions,
};
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for the HoloViz tutorial: packaging, datasets and environment checks.
#[derive(Parser)]
#[clap(
    name = "holoviz-tutorial",
    version,
    about = "Package the HoloViz tutorial, fetch its datasets and check the environment"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Package the tutorial directory into a zip archive
    Archive {
        /// Project root holding pixi.toml, pixi.lock and tutorial/
        #[clap(long, default_value = ".")]
        base_dir: PathBuf,
        /// Archive to write (defaults to <base-dir>/holoviz_tutorial.zip)
        #[clap(long)]
        output: Option<PathBuf>,
        /// Only store files; directories are implied by member paths
        #[clap(long)]
        no_directories: bool,
        /// Optional YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
    },
    /// Download the tutorial datasets, skipping those already present
    DownloadData {
        /// Optional YAML config file listing download targets
        #[clap(long)]
        config: Option<PathBuf>,
        /// Directory to store datasets in (defaults to tutorial/data)
        #[clap(long)]
        data_dir: Option<PathBuf>,
        /// Maximum number of simultaneous downloads
        #[clap(long)]
        concurrency: Option<usize>,
        /// Disable progress bars
        #[clap(long)]
        no_progress: bool,
        /// Exit with an error if any target fails
        #[clap(long)]
        strict: bool,
    },
    /// Check installed package versions against the manifest constraints
    CheckPackages {
        /// Path to pixi.toml
        #[clap(long, default_value = "pixi.toml")]
        manifest: PathBuf,
        /// Installed version as NAME=VERSION; may be repeated
        #[clap(long = "installed", value_parser = parse_installed)]
        installed: Vec<(String, String)>,
        /// Python interpreter to query when no --installed is given
        #[clap(long, default_value = "python")]
        python: PathBuf,
        /// Exit with an error if any package fails the check
        #[clap(long)]
        strict: bool,
        /// Packages to check
        #[clap(required = true)]
        packages: Vec<String>,
    },
}

fn parse_installed(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, version)) if !name.is_empty() && !version.is_empty() => {
            Ok((name.to_string(), version.to_string()))
        }
        _ => Err(format!("expected NAME=VERSION, got '{raw}'")),
    }
}

/// User-facing line for a fetch event, printed as the event happens.
pub fn describe_event(event: &FetchEvent<'_>) -> String {
    match event {
        FetchEvent::Unzipping { archive, dest, .. } => {
            format!("Unzipping {} to {}...", archive.display(), dest.display())
        }
        FetchEvent::Completed { outcome } => describe_outcome(outcome),
    }
}

/// User-facing line for a finished target.
pub fn describe_outcome(outcome: &TargetOutcome) -> String {
    let target = &outcome.target;
    match &outcome.result {
        Ok(FetchOutcome::Skipped { asset }) => format!(
            "File already exists: {}. Skipping download.",
            asset.path().display()
        ),
        Ok(FetchOutcome::Downloaded {
            asset: LocalAsset::File(path),
            ..
        }) => format!("Downloaded {} to: {}", target.description, path.display()),
        Ok(FetchOutcome::Downloaded {
            asset: LocalAsset::Extracted(dir),
            ..
        }) => format!(
            "Downloaded {} and unzipped to: {}",
            target.description,
            dir.display()
        ),
        Err(e) => format!("Failed to fetch {} ({}): {e}", target.description, target.url),
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Archive {
            base_dir,
            output,
            no_directories,
            config,
        } => {
            let cli_config = load_config(config)?;
            let mut archive_config = cli_config.archive_config(&base_dir);
            if let Some(output) = output {
                archive_config = archive_config.with_output_path(output);
            }
            if no_directories {
                archive_config.include_directories = false;
            }
            tracing::info!(command = "archive", base_dir = %base_dir.display(), "Building archive");
            let summary = build_archive(&archive_config)
                .with_context(|| format!("Failed to archive {}", base_dir.display()))?;
            println!("Created zip file: {}", summary.output_path.display());
            Ok(())
        }
        Commands::DownloadData {
            config,
            data_dir,
            concurrency,
            no_progress,
            strict,
        } => {
            let cli_config = load_config(config)?;
            let mut fetch_config = cli_config.fetch_config(data_dir).with_progress(!no_progress);
            if let Some(concurrency) = concurrency {
                fetch_config = fetch_config.with_concurrency(concurrency);
            }
            tracing::info!(command = "download-data", "Starting dataset download");
            let fetcher = DefaultFetcher::over_http(fetch_config)
                .with_events(Arc::new(|event: &FetchEvent<'_>| println!("{}", describe_event(event))));
            let report = fetcher.fetch_all().await;
            let failed = report.failures().count();
            if failed > 0 {
                tracing::error!(command = "download-data", failed, "Some datasets failed to download");
                if strict {
                    anyhow::bail!("{failed} of {} download(s) failed", report.outcomes.len());
                }
            }
            Ok(())
        }
        Commands::CheckPackages {
            manifest,
            installed,
            python,
            strict,
            packages,
        } => {
            let versions: Box<dyn InstalledVersions> = if installed.is_empty() {
                Box::new(PythonInterpreter::new(python))
            } else {
                Box::new(installed.into_iter().collect::<StaticVersions>())
            };
            let report = check_manifest(&manifest, packages.as_slice(), versions.as_ref())
                .with_context(|| format!("Failed to check packages against {}", manifest.display()))?;
            for line in report.lines() {
                println!("{line}");
            }
            if strict && report.error_found() {
                anyhow::bail!("package check failed");
            }
            Ok(())
        }
    }
}
