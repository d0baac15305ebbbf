mod queue_tests;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use url::Url;

use super::{extension_for, AssetFetcher, FetchResponse};
use crate::core::model::Probe;
use crate::error::{HarvestError, Result};

/// In-memory fetcher: documents, redirects and bodies are scripted per URL.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    pub docs: HashMap<String, Value>,
    pub redirects: HashMap<String, String>,
    pub bodies: HashMap<String, Vec<u8>>,
    pub failing_probes: HashSet<String>,
    pub failing_fetches: HashSet<String>,
    pub truncated: HashSet<String>,
    pub fetched: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn body(mut self, url: &str, bytes: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

fn not_found(url: &str) -> HarvestError {
    HarvestError::Status {
        url: url.to_string(),
        status: 404,
    }
}

#[async_trait]
impl AssetFetcher for ScriptedFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value> {
        self.docs.get(url).cloned().ok_or_else(|| not_found(url))
    }

    async fn probe(&self, url: &str) -> Result<Probe> {
        if self.failing_probes.contains(url) {
            return Err(not_found(url));
        }
        let resolved = self.redirects.get(url).cloned().unwrap_or_else(|| url.to_string());
        let parsed = Url::parse(&resolved)?;
        Ok(Probe {
            extension: extension_for(&parsed, ""),
            resolved_url: resolved,
        })
    }

    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        self.fetched.lock().unwrap().push(url.to_string());
        if self.failing_fetches.contains(url) {
            return Err(HarvestError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )));
        }
        let body = self.bodies.get(url).cloned().ok_or_else(|| not_found(url))?;
        let mut announced = body.len() as u64;
        if self.truncated.contains(url) {
            announced += 10;
        }
        let chunks: Vec<Result<Bytes>> =
            body.chunks(4).map(|c| Ok(Bytes::copy_from_slice(c))).collect();
        Ok(FetchResponse {
            total: Some(announced),
            stream: futures::stream::iter(chunks).boxed(),
        })
    }
}

#[test]
fn test_extension_from_url_path() {
    let url = Url::parse("https://cdn.example.com/img/photo.JPG?w=200#x").unwrap();
    assert_eq!(extension_for(&url, "image/png"), "jpg");
}

#[test]
fn test_extension_falls_back_to_content_type() {
    let url = Url::parse("https://cdn.example.com/img/photo").unwrap();
    assert_eq!(extension_for(&url, "image/png; charset=binary"), "png");
    assert_eq!(extension_for(&url, "image/jpeg"), "jpg");
    assert_eq!(extension_for(&url, ""), "bin");
}

#[test]
fn test_extension_ignores_odd_suffixes() {
    let url = Url::parse("https://example.com/v1.2/download.").unwrap();
    assert_eq!(extension_for(&url, "application/pdf"), "pdf");
    let url = Url::parse("https://example.com/").unwrap();
    assert_eq!(extension_for(&url, ""), "bin");
}
