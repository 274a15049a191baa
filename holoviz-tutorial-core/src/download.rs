//! Dataset fetcher: materializes download targets under the data directory.
//!
//! Each target is resolved independently:
//!   - skipped outright when the file, or its extracted directory, already exists
//!   - otherwise streamed to disk through a [`Transport`] with a progress bar
//!   - container downloads (`.zip`) are expanded next to the file, then the file is removed
//!
//! Targets run through a bounded pool sized by [`FetchConfig::concurrency`].
//! A failing target never cancels its siblings; [`fetch_all`] always returns
//! one [`TargetOutcome`] per target, in configuration order.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::config::{DownloadTarget, FetchConfig};
use crate::contract::{FetchError, Fetcher, RemoteBody, Transport};
use crate::extract::{extract_zip, extracted_dir, is_container};

/// The on-disk form of a fetched target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum LocalAsset {
    File(PathBuf),
    Extracted(PathBuf),
}

impl LocalAsset {
    pub fn path(&self) -> &Path {
        match self {
            LocalAsset::File(p) | LocalAsset::Extracted(p) => p,
        }
    }
}

/// What happened to a target that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FetchOutcome {
    /// Already present locally; no request was made.
    Skipped { asset: LocalAsset },
    Downloaded { asset: LocalAsset, bytes: u64 },
}

impl FetchOutcome {
    pub fn asset(&self) -> &LocalAsset {
        match self {
            FetchOutcome::Skipped { asset } | FetchOutcome::Downloaded { asset, .. } => asset,
        }
    }
}

#[derive(Debug)]
pub struct TargetOutcome {
    pub target: DownloadTarget,
    pub result: Result<FetchOutcome, FetchError>,
}

/// Outcomes of a whole run, one per target, in target order.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub outcomes: Vec<TargetOutcome>,
}

impl FetchReport {
    pub fn failures(&self) -> impl Iterator<Item = (&DownloadTarget, &FetchError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.target, e)))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let outcomes = self
            .outcomes
            .iter()
            .map(|o| match &o.result {
                Ok(outcome) => serde_json::json!({
                    "filename": o.target.filename,
                    "outcome": outcome,
                }),
                Err(e) => serde_json::json!({
                    "filename": o.target.filename,
                    "outcome": { "status": "failed", "error": e.to_string() },
                }),
            })
            .collect::<Vec<_>>();
        serde_json::Value::Array(outcomes)
    }
}

/// A step of a fetch run, reported while the run is in progress.
#[derive(Debug)]
pub enum FetchEvent<'a> {
    /// A downloaded container is about to be unpacked.
    Unzipping {
        target: &'a DownloadTarget,
        archive: &'a Path,
        dest: &'a Path,
    },
    /// A target has finished, successfully or not.
    Completed { outcome: &'a TargetOutcome },
}

/// Callback receiving [`FetchEvent`]s as they happen.
pub type EventSink = Arc<dyn Fn(&FetchEvent<'_>) + Send + Sync>;

/// Progress display and event delivery shared by all workers of a run.
#[derive(Clone)]
pub struct Progress {
    bars: Option<MultiProgress>,
    events: Option<EventSink>,
}

impl Progress {
    pub fn new(visible: bool) -> Self {
        Self {
            bars: visible.then(MultiProgress::new),
            events: None,
        }
    }

    pub fn hidden() -> Self {
        Self::new(false)
    }

    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    /// Hand `event` to the sink, keeping any bars from drawing over its output.
    pub fn emit(&self, event: &FetchEvent<'_>) {
        let Some(sink) = &self.events else {
            return;
        };
        match &self.bars {
            Some(bars) => bars.suspend(|| sink(event)),
            None => sink(event),
        }
    }

    fn bar(&self, description: &str, total: Option<u64>) -> ProgressBar {
        let Some(bars) = &self.bars else {
            return ProgressBar::hidden();
        };
        let bar = match total {
            Some(len) => {
                let bar = ProgressBar::new(len);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{msg} {wide_bar} {bytes}/{total_bytes} ({binary_bytes_per_sec}, {eta})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner} {msg} {bytes} ({binary_bytes_per_sec})")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        };
        bar.set_message(format!("Downloading {description}"));
        bars.add(bar)
    }
}

/// Transport backed by a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &str) -> Result<RemoteBody, FetchError> {
        debug!(url, "Requesting download");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(url, status = %status, "Download request rejected");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Zero is as good as unknown for sizing the bar.
        let content_length = response.content_length().filter(|len| *len > 0);
        let owned_url = url.to_string();
        let chunks = response
            .bytes_stream()
            .map(move |chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|source| FetchError::Request {
                        url: owned_url.clone(),
                        source,
                    })
            })
            .boxed();

        Ok(RemoteBody {
            content_length,
            chunks,
        })
    }
}

/// The asset already on disk for `target`, if any.
pub fn existing_asset(data_dir: &Path, target: &DownloadTarget) -> Option<LocalAsset> {
    let destination = target.destination(data_dir);
    if destination.exists() {
        return Some(LocalAsset::File(destination));
    }
    if is_container(&destination) {
        let dir = extracted_dir(&destination);
        if dir.exists() {
            return Some(LocalAsset::Extracted(dir));
        }
    }
    None
}

/// Fetch a single target, skipping it when already satisfied.
pub async fn fetch_one(
    transport: &dyn Transport,
    data_dir: &Path,
    target: &DownloadTarget,
    progress: &Progress,
) -> Result<FetchOutcome, FetchError> {
    if let Some(asset) = existing_asset(data_dir, target) {
        info!(path = %asset.path().display(), "File already exists, skipping download");
        return Ok(FetchOutcome::Skipped { asset });
    }

    let destination = target.destination(data_dir);
    let RemoteBody {
        content_length,
        mut chunks,
    } = transport.open(&target.url).await?;

    let io_err = |source: std::io::Error| FetchError::Io {
        path: destination.clone(),
        source,
    };

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| FetchError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let bar = progress.bar(&target.description, content_length);
    let mut file = tokio::fs::File::create(&destination).await.map_err(io_err)?;
    let mut written: u64 = 0;
    while let Some(chunk) = chunks.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                bar.abandon();
                return Err(e);
            }
        };
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
        bar.inc(chunk.len() as u64);
    }
    file.flush().await.map_err(io_err)?;
    drop(file);
    bar.finish();

    info!(
        description = %target.description,
        path = %destination.display(),
        bytes = written,
        "Downloaded target"
    );

    if !is_container(&destination) {
        return Ok(FetchOutcome::Downloaded {
            asset: LocalAsset::File(destination),
            bytes: written,
        });
    }

    let dest_dir = extracted_dir(&destination);
    info!(archive = %destination.display(), dest = %dest_dir.display(), "Unzipping");
    progress.emit(&FetchEvent::Unzipping {
        target,
        archive: &destination,
        dest: &dest_dir,
    });
    let archive = destination.clone();
    let extract_to = dest_dir.clone();
    tokio::task::spawn_blocking(move || extract_zip(&archive, &extract_to))
        .await
        .map_err(|e| FetchError::Worker {
            filename: target.filename.clone(),
            reason: e.to_string(),
        })??;
    tokio::fs::remove_file(&destination).await.map_err(io_err)?;

    Ok(FetchOutcome::Downloaded {
        asset: LocalAsset::Extracted(dest_dir),
        bytes: written,
    })
}

/// Fetch every target in `config`, at most `config.concurrency` at a time.
pub async fn fetch_all(transport: &dyn Transport, config: &FetchConfig) -> FetchReport {
    fetch_all_with(transport, config, Progress::new(config.show_progress)).await
}

/// [`fetch_all`] reporting through a caller-supplied [`Progress`].
pub async fn fetch_all_with(
    transport: &dyn Transport,
    config: &FetchConfig,
    progress: Progress,
) -> FetchReport {
    config.trace_loaded();
    let concurrency = config.concurrency.max(1);

    let outcomes = stream::iter(config.targets.iter().cloned())
        .map(|target| {
            let progress = progress.clone();
            async move {
                let result = fetch_one(transport, &config.data_dir, &target, &progress).await;
                if let Err(e) = &result {
                    error!(url = %target.url, filename = %target.filename, error = %e, "Fetching target failed");
                }
                let outcome = TargetOutcome { target, result };
                progress.emit(&FetchEvent::Completed { outcome: &outcome });
                outcome
            }
        })
        .buffered(concurrency)
        .collect::<Vec<_>>()
        .await;

    let report = FetchReport { outcomes };
    match serde_json::to_string_pretty(&report.to_json()) {
        Ok(json) => debug!(json = %json, "Fetch report"),
        Err(e) => error!(error = ?e, "Failed to serialize fetch report"),
    }
    report
}

/// [`Fetcher`] over a fixed configuration and transport.
pub struct DefaultFetcher {
    config: FetchConfig,
    transport: Arc<dyn Transport>,
    events: Option<EventSink>,
}

impl DefaultFetcher {
    pub fn new(config: FetchConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            events: None,
        }
    }

    /// Report each step to `sink` while the run is in progress.
    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    /// Fetcher talking to the real network.
    pub fn over_http(config: FetchConfig) -> Self {
        Self::new(config, Arc::new(HttpTransport::default()))
    }
}

#[async_trait]
impl Fetcher for DefaultFetcher {
    async fn fetch_all(&self) -> FetchReport {
        let mut progress = Progress::new(self.config.show_progress);
        if let Some(sink) = &self.events {
            progress = progress.with_events(sink.clone());
        }
        fetch_all_with(self.transport.as_ref(), &self.config, progress).await
    }
}
