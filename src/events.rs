//! Progress events and the end-of-run report.
//!
//! The library never renders anything; it hands [`HarvestEvent`]s to an
//! [`EventSink`] and leaves presentation to the caller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaListing {
    pub index: usize,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HarvestEvent {
    Started {
        schemas: Vec<SchemaListing>,
        working_tree: PathBuf,
    },
    SourceStaged {
        schema_index: usize,
        url: String,
        references: usize,
        queued: usize,
    },
    SourceFailed {
        schema_index: usize,
        url: String,
        error: String,
    },
    ProbeFailed {
        url: String,
        error: String,
    },
    DownloadStarted {
        position: usize,
        count: usize,
        url: String,
        destinations: usize,
    },
    DownloadProgress {
        position: usize,
        url: String,
        downloaded: u64,
        total: Option<u64>,
        progress: f32,
        speed: f64,
    },
    DownloadCompleted {
        position: usize,
        url: String,
        size: u64,
        copies: usize,
    },
    DownloadFailed {
        position: usize,
        url: String,
        error: String,
    },
    Relocated {
        from: PathBuf,
        to: PathBuf,
    },
    Finished {
        report: RunReport,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SourceFetch,
    Probe,
    Queue,
    Download,
    Copy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub stage: Stage,
    pub target: String,
    pub message: String,
}

/// Ordered record of everything that went wrong below the fatal level, plus counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub errors: Vec<ReportEntry>,
    pub sources_staged: usize,
    pub downloaded: usize,
    pub copies: usize,
    pub relocated: usize,
}

impl RunReport {
    pub fn record(&mut self, stage: Stage, target: impl Into<String>, message: impl ToString) {
        self.errors.push(ReportEntry {
            stage,
            target: target.into(),
            message: message.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn extend(&mut self, other: RunReport) {
        self.errors.extend(other.errors);
        self.sources_staged += other.sources_staged;
        self.downloaded += other.downloaded;
        self.copies += other.copies;
        self.relocated += other.relocated;
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: HarvestEvent);
}

/// Writes every event to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: HarvestEvent) {
        match &event {
            HarvestEvent::DownloadProgress { url, downloaded, progress, .. } => {
                tracing::trace!(%url, downloaded, progress, "download progress");
            }
            HarvestEvent::SourceFailed { url, error, .. }
            | HarvestEvent::ProbeFailed { url, error }
            | HarvestEvent::DownloadFailed { url, error, .. } => {
                tracing::warn!(%url, %error, "asset harvest error");
            }
            other => tracing::info!(event = ?other, "harvest"),
        }
    }
}

/// Forwards events over an unbounded channel. Send failures are ignored so a
/// dropped receiver never stalls the run.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<HarvestEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<HarvestEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: HarvestEvent) {
        let _ = self.tx.send(event);
    }
}
