use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{HeaderName, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::core::model::Probe;
use crate::data::Settings;
use crate::error::{HarvestError, Result};

pub mod engine;
pub mod queue;

pub use engine::{DownloadEngine, DownloadStatus, DownloadSummary};
pub use queue::{build_source_queue, DownloadItem, DownloadQueue, PathConflict, SourceQueue};

#[cfg(test)]
mod tests;

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// An open transfer: announced length (if any) and the body as a byte stream.
pub struct FetchResponse {
    pub total: Option<u64>,
    pub stream: ByteStream,
}

/// Network capability the pipeline needs. `HttpFetcher` is the real one;
/// tests plug in scripted fetchers.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// GET a source document and parse it as JSON.
    async fn fetch_json(&self, url: &str) -> Result<Value>;

    /// Resolve redirects and work out a file extension without reading the body.
    async fn probe(&self, url: &str) -> Result<Probe>;

    /// Open a streaming GET.
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

/// `request_timeout` bounds connecting, probes and JSON fetches. Asset
/// bodies stream for as long as the server keeps sending.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    request_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let request_timeout = Duration::from_secs(settings.request_timeout_secs);
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(settings.max_redirects))
            .user_agent(settings.user_agent.clone())
            .connect_timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            request_timeout,
        })
    }
}

fn check_status(url: &str, resp: &reqwest::Response) -> Result<()> {
    if !resp.status().is_success() {
        return Err(HarvestError::Status {
            url: url.to_string(),
            status: resp.status().as_u16(),
        });
    }
    Ok(())
}

fn header_str(resp: &reqwest::Response, name: HeaderName) -> Option<&str> {
    resp.headers().get(name).and_then(|h| h.to_str().ok())
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let resp = self.client.get(url).timeout(self.request_timeout).send().await?;
        check_status(url, &resp)?;
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn probe(&self, url: &str) -> Result<Probe> {
        let resp = self.client.head(url).timeout(self.request_timeout).send().await?;
        // Some servers refuse HEAD; fall back to a GET whose body is never read.
        let resp = match resp.status() {
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
                self.client.get(url).timeout(self.request_timeout).send().await?
            }
            _ => resp,
        };
        check_status(url, &resp)?;
        let resolved = resp.url().clone();
        let content_type = header_str(&resp, CONTENT_TYPE).unwrap_or("");
        let extension = extension_for(&resolved, content_type);
        tracing::debug!(%url, resolved = %resolved, %extension, "probed asset");
        Ok(Probe {
            resolved_url: resolved.to_string(),
            extension,
        })
    }

    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let resp = self.client.get(url).send().await?;
        check_status(url, &resp)?;
        let total = header_str(&resp, CONTENT_LENGTH).and_then(|s| s.parse::<u64>().ok());
        let stream = resp.bytes_stream().map(|chunk| chunk.map_err(HarvestError::from)).boxed();
        Ok(FetchResponse { total, stream })
    }
}

/// File extension for a resolved asset URL: taken from the last path segment,
/// otherwise from the Content-Type, otherwise `bin`.
pub fn extension_for(url: &Url, content_type: &str) -> String {
    let from_path = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        });
    match from_path {
        Some(ext) => ext.to_ascii_lowercase(),
        None => extension_from_content_type(content_type).to_string(),
    }
}

fn extension_from_content_type(content_type: &str) -> &'static str {
    let essence = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if essence.contains("jpeg") || essence.contains("jpg") {
        "jpg"
    } else if essence.contains("png") {
        "png"
    } else if essence.contains("gif") {
        "gif"
    } else if essence.contains("webp") {
        "webp"
    } else if essence.contains("svg") {
        "svg"
    } else if essence.contains("mp4") {
        "mp4"
    } else if essence.contains("pdf") {
        "pdf"
    } else if essence.contains("json") {
        "json"
    } else {
        mime_guess::get_mime_extensions_str(&essence)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("bin")
    }
}
