//! End-to-end run: stage every source, download the merged queue, relocate.

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::core::resolver::resolve_all;
use crate::data::{Config, SchemaConfig, Settings, SourceConfig};
use crate::downloader::{
    build_source_queue, AssetFetcher, DownloadEngine, DownloadQueue, SourceQueue,
};
use crate::error::{HarvestError, Result};
use crate::events::{EventSink, HarvestEvent, RunReport, SchemaListing, Stage};
use crate::staging::{relocate, StagedSource, WorkingTree};

struct StagedOutcome {
    source: StagedSource,
    queue: SourceQueue,
    references: usize,
}

pub struct Harvester<F> {
    config: Config,
    settings: Settings,
    fetcher: F,
    engine: DownloadEngine,
    keep_working_tree: bool,
}

impl<F: AssetFetcher> Harvester<F> {
    pub fn new(config: Config, settings: Settings, fetcher: F) -> Self {
        let engine = DownloadEngine::new(&settings);
        Self {
            config,
            settings,
            fetcher,
            engine,
            keep_working_tree: false,
        }
    }

    /// Leave the working tree on disk after a successful run.
    pub fn keep_working_tree(mut self, keep: bool) -> Self {
        self.keep_working_tree = keep;
        self
    }

    pub async fn run(&self, sink: &dyn EventSink, cancel: &CancellationToken) -> Result<RunReport> {
        let tree = WorkingTree::create(&self.settings.temp_root()).await?;
        sink.emit(HarvestEvent::Started {
            schemas: self
                .config
                .schemas
                .iter()
                .enumerate()
                .map(|(index, schema)| SchemaListing {
                    index,
                    sources: schema.sources.iter().map(|s| s.url.clone()).collect(),
                })
                .collect(),
            working_tree: tree.root().to_path_buf(),
        });

        let mut report = RunReport::default();

        // Every source is fetched and staged concurrently; results are merged
        // here in declaration order so the queue order is deterministic.
        let jobs: Vec<(usize, &SchemaConfig, &SourceConfig)> = self
            .config
            .schemas
            .iter()
            .enumerate()
            .flat_map(|(schema_index, schema)| {
                schema.sources.iter().map(move |source| (schema_index, schema, source))
            })
            .collect();
        let staging = join_all(jobs.iter().map(|&(schema_index, schema, source)| {
            self.stage_source(schema_index, schema, source, &tree)
        }));
        let outcomes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(&tree)),
            outcomes = staging => outcomes,
        };

        let mut queue = DownloadQueue::new();
        let mut staged = Vec::new();
        for (&(schema_index, _, source), outcome) in jobs.iter().zip(outcomes) {
            match outcome {
                Ok(StagedOutcome { source: staged_source, queue: source_queue, references }) => {
                    for (url, error) in &source_queue.failures {
                        sink.emit(HarvestEvent::ProbeFailed {
                            url: url.clone(),
                            error: error.clone(),
                        });
                        report.record(Stage::Probe, url.as_str(), error);
                    }
                    let queued = source_queue.assets.len();
                    for conflict in queue.merge(source_queue) {
                        tracing::warn!(
                            url = %conflict.url,
                            path = %conflict.path.display(),
                            owner = %conflict.claimed_by,
                            "local path already taken, asset not queued"
                        );
                        let message = format!(
                            "{} is already written by {}",
                            conflict.path.display(),
                            conflict.claimed_by
                        );
                        report.record(Stage::Queue, conflict.url, message);
                    }
                    sink.emit(HarvestEvent::SourceStaged {
                        schema_index,
                        url: source.url.clone(),
                        references,
                        queued,
                    });
                    staged.push(staged_source);
                    report.sources_staged += 1;
                }
                Err(e) => {
                    tracing::warn!(url = %source.url, error = %e, "skipping source");
                    sink.emit(HarvestEvent::SourceFailed {
                        schema_index,
                        url: source.url.clone(),
                        error: e.to_string(),
                    });
                    report.record(Stage::SourceFetch, source.url.as_str(), e);
                }
            }
        }

        tracing::info!(
            items = queue.len(),
            destinations = queue.destination_count(),
            "download queue ready"
        );
        let summary = self.engine.run(&self.fetcher, &queue, sink, cancel).await;
        report.extend(summary.report);
        if summary.cancelled {
            return Err(cancelled(&tree));
        }

        let destination = self.config.destination_root();
        report.relocated = relocate(&staged, &tree, &destination, sink).await?;

        if self.keep_working_tree {
            tracing::info!(root = %tree.root().display(), "keeping working tree");
        } else {
            let root = tree.root().to_path_buf();
            if let Err(e) = tree.remove().await {
                tracing::warn!(root = %root.display(), error = %e, "could not remove working tree");
            }
        }

        sink.emit(HarvestEvent::Finished {
            report: report.clone(),
        });
        Ok(report)
    }

    async fn stage_source(
        &self,
        schema_index: usize,
        schema: &SchemaConfig,
        source: &SourceConfig,
        tree: &WorkingTree,
    ) -> Result<StagedOutcome> {
        let mut doc = self.fetcher.fetch_json(&source.url).await?;
        let refs = resolve_all(&schema.assets, &doc);
        tracing::debug!(url = %source.url, references = refs.len(), "resolved asset fields");

        let queue = build_source_queue(
            &self.fetcher,
            &mut doc,
            &refs,
            &tree.assets_dir(schema_index, source.folder()),
            &self.config.published_folder(source),
            &self.config.file_prefix(source),
        )
        .await;

        let dir = tree.source_dir(schema_index, source.folder());
        tokio::fs::create_dir_all(&dir).await?;
        let json = serde_json::to_vec_pretty(&doc)?;
        tokio::fs::write(dir.join(&source.target_filename), json).await?;

        Ok(StagedOutcome {
            source: StagedSource {
                schema_index,
                folder: source.folder().to_string(),
                filename: source.target_filename.clone(),
                has_assets: !schema.assets.is_empty(),
            },
            queue,
            references: refs.len(),
        })
    }
}

fn cancelled(tree: &WorkingTree) -> HarvestError {
    HarvestError::Cancelled {
        working_tree: tree.root().to_path_buf(),
    }
}
