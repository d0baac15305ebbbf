use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::AssetFetcher;
use crate::core::model::{AssetReference, Probe};

/// One remote asset and every local path it has to end up at. The first
/// destination is downloaded, the rest are copies of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadItem {
    pub url: String,
    pub destinations: Vec<PathBuf>,
}

impl DownloadItem {
    pub fn primary(&self) -> &Path {
        &self.destinations[0]
    }

    pub fn copies(&self) -> &[PathBuf] {
        &self.destinations[1..]
    }
}

/// Ordered queue keyed by resolved URL; a URL is only ever queued once and a
/// local path belongs to at most one URL.
#[derive(Debug, Default, Clone)]
pub struct DownloadQueue {
    items: Vec<DownloadItem>,
    index: HashMap<String, usize>,
    claims: HashMap<PathBuf, String>,
}

/// A local path already taken by a different URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConflict {
    pub url: String,
    pub path: PathBuf,
    pub claimed_by: String,
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `path` for `url`. Returns true when this created a new item.
    /// A path owned by another URL is left alone.
    pub fn insert(&mut self, url: String, path: PathBuf) -> bool {
        match self.claims.get(&path) {
            Some(owner) if *owner != url => return false,
            Some(_) => {}
            None => {
                self.claims.insert(path.clone(), url.clone());
            }
        }
        if let Some(&pos) = self.index.get(&url) {
            let item = &mut self.items[pos];
            if !item.destinations.contains(&path) {
                item.destinations.push(path);
            }
            return false;
        }
        self.index.insert(url.clone(), self.items.len());
        self.items.push(DownloadItem {
            url,
            destinations: vec![path],
        });
        true
    }

    /// Queue every asset of a staged source. Assets whose path is already
    /// claimed by a different URL are returned instead of queued.
    pub fn merge(&mut self, source: SourceQueue) -> Vec<PathConflict> {
        let mut conflicts = Vec::new();
        for asset in source.assets {
            if let Some(owner) = self.claimant(&asset.local_path) {
                if owner != asset.url {
                    conflicts.push(PathConflict {
                        claimed_by: owner.to_string(),
                        url: asset.url,
                        path: asset.local_path,
                    });
                    continue;
                }
            }
            self.insert(asset.url, asset.local_path);
        }
        conflicts
    }

    /// URL that owns `path`, if any.
    pub fn claimant(&self, path: &Path) -> Option<&str> {
        self.claims.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn destination_count(&self) -> usize {
        self.items.iter().map(|i| i.destinations.len()).sum()
    }

    pub fn get(&self, url: &str) -> Option<&DownloadItem> {
        self.index.get(url).map(|&pos| &self.items[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &DownloadItem> {
        self.items.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedAsset {
    pub url: String,
    pub local_path: PathBuf,
}

/// Result of queueing one source: assets in reference order plus the
/// references whose probe failed (original URL, error message).
#[derive(Debug, Default)]
pub struct SourceQueue {
    pub assets: Vec<QueuedAsset>,
    pub failures: Vec<(String, String)>,
}

/// Probe every reference, point each leaf at its published path and collect
/// the local paths to download into.
///
/// Probes run concurrently; rewrites are applied afterwards in reference
/// order. A leaf whose probe failed keeps its original URL.
pub async fn build_source_queue<F>(
    fetcher: &F,
    doc: &mut Value,
    refs: &[AssetReference],
    download_folder: &Path,
    published_folder: &str,
    file_prefix: &str,
) -> SourceQueue
where
    F: AssetFetcher + ?Sized,
{
    let urls: Vec<Option<String>> = refs
        .iter()
        .map(|r| r.current_url(doc).map(str::to_string))
        .collect();

    let mut unique: Vec<&str> = Vec::new();
    for url in urls.iter().flatten() {
        if !unique.contains(&url.as_str()) {
            unique.push(url);
        }
    }
    let results = join_all(unique.iter().map(|url| fetcher.probe(url))).await;
    let probes: HashMap<&str, Result<Probe, String>> = unique
        .iter()
        .copied()
        .zip(results.into_iter().map(|r| r.map_err(|e| e.to_string())))
        .collect();

    let mut out = SourceQueue::default();
    for (reference, url) in refs.iter().zip(urls.iter()) {
        let Some(url) = url else { continue };
        match &probes[url.as_str()] {
            Ok(probe) => {
                let filename = format!(
                    "{}{}.{}",
                    sanitize_stem(file_prefix),
                    sanitize_stem(&reference.stem),
                    probe.extension
                );
                let published = format!("{}/{}", published_folder.trim_end_matches('/'), filename);
                reference.rewrite(doc, published);
                out.assets.push(QueuedAsset {
                    url: probe.resolved_url.clone(),
                    local_path: download_folder.join(&filename),
                });
            }
            Err(message) => {
                tracing::warn!(%url, error = %message, "asset probe failed, leaving field untouched");
                out.failures.push((url.clone(), message.clone()));
            }
        }
    }
    out
}

fn sanitize_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}
