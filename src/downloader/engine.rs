use futures_util::StreamExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::queue::{DownloadItem, DownloadQueue};
use super::{AssetFetcher, ByteStream, FetchResponse};
use crate::data::Settings;
use crate::error::{HarvestError, Result};
use crate::events::{EventSink, HarvestEvent, RunReport, Stage};

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadStatus {
    Completed { size: u64 },
    Canceled,
}

#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub report: RunReport,
    pub cancelled: bool,
}

/// Drains a [`DownloadQueue`] one item at a time, in queue order.
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    progress_interval: Duration,
}

impl DownloadEngine {
    pub fn new(settings: &Settings) -> Self {
        Self::with_interval(Duration::from_millis(settings.progress_interval_ms))
    }

    pub fn with_interval(progress_interval: Duration) -> Self {
        Self { progress_interval }
    }

    /// Download every item, then copy it to its secondary destinations.
    ///
    /// A failing item is reported and skipped; only cancellation stops the loop early.
    pub async fn run<F>(
        &self,
        fetcher: &F,
        queue: &DownloadQueue,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> DownloadSummary
    where
        F: AssetFetcher + ?Sized,
    {
        let mut summary = DownloadSummary::default();
        let count = queue.len();

        for (i, item) in queue.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let position = i + 1;
            sink.emit(HarvestEvent::DownloadStarted {
                position,
                count,
                url: item.url.clone(),
                destinations: item.destinations.len(),
            });

            let size = match self.download_item(fetcher, item, position, sink, cancel).await {
                Ok(DownloadStatus::Completed { size }) => size,
                Ok(DownloadStatus::Canceled) => {
                    tracing::info!(url = %item.url, "download cancelled");
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(url = %item.url, error = %e, "download failed");
                    sink.emit(HarvestEvent::DownloadFailed {
                        position,
                        url: item.url.clone(),
                        error: e.to_string(),
                    });
                    summary.report.record(Stage::Download, item.url.as_str(), e);
                    continue;
                }
            };
            summary.report.downloaded += 1;

            let mut copies = 0;
            for dest in item.copies() {
                match copy_asset(item.primary(), dest).await {
                    Ok(()) => copies += 1,
                    Err(e) => {
                        tracing::warn!(from = %item.primary().display(), to = %dest.display(), error = %e, "copy failed");
                        summary.report.record(Stage::Copy, dest.display().to_string(), e);
                    }
                }
            }
            summary.report.copies += copies;

            sink.emit(HarvestEvent::DownloadCompleted {
                position,
                url: item.url.clone(),
                size,
                copies,
            });
        }

        summary
    }

    async fn download_item<F>(
        &self,
        fetcher: &F,
        item: &DownloadItem,
        position: usize,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<DownloadStatus>
    where
        F: AssetFetcher + ?Sized,
    {
        let path = item.primary();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let FetchResponse { total, stream } = fetcher.fetch(&item.url).await?;
        let mut file = tokio::fs::File::create(path).await?;

        let outcome = self
            .stream_to_file(&mut file, stream, total, item, position, sink, cancel)
            .await;
        drop(file);

        match outcome {
            Ok(Some(size)) => Ok(DownloadStatus::Completed { size }),
            Ok(None) => {
                let _ = tokio::fs::remove_file(path).await;
                Ok(DownloadStatus::Canceled)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(path).await;
                Err(e)
            }
        }
    }

    /// Returns the byte count, or `None` when cancelled mid-transfer.
    #[allow(clippy::too_many_arguments)]
    async fn stream_to_file(
        &self,
        file: &mut tokio::fs::File,
        mut stream: ByteStream,
        total: Option<u64>,
        item: &DownloadItem,
        position: usize,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<Option<u64>> {
        let mut downloaded: u64 = 0;
        let start = Instant::now();
        let mut last_emit = start;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let bytes = chunk?;
            downloaded += bytes.len() as u64;
            file.write_all(&bytes).await?;

            if last_emit.elapsed() >= self.progress_interval {
                last_emit = Instant::now();
                sink.emit(progress_event(item, position, downloaded, total, start));
            }
        }
        file.flush().await?;

        if let Some(expected) = total {
            if downloaded != expected {
                return Err(HarvestError::Incomplete {
                    expected,
                    actual: downloaded,
                });
            }
        }

        sink.emit(progress_event(item, position, downloaded, total.or(Some(downloaded)), start));
        Ok(Some(downloaded))
    }
}

fn progress_event(
    item: &DownloadItem,
    position: usize,
    downloaded: u64,
    total: Option<u64>,
    start: Instant,
) -> HarvestEvent {
    let elapsed = start.elapsed().as_secs_f64();
    let speed = if elapsed > 0.0 { downloaded as f64 / elapsed } else { 0.0 };
    let progress = match total {
        Some(t) if t > 0 => (downloaded as f32) / (t as f32),
        Some(_) => 1.0,
        None => 0.0,
    };
    HarvestEvent::DownloadProgress {
        position,
        url: item.url.clone(),
        downloaded,
        total,
        progress,
        speed,
    }
}

async fn copy_asset(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(from, to).await?;
    Ok(())
}
