pub mod core;
pub mod data;
pub mod downloader;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod staging;

// Re-export commonly used items for integration tests and external consumers
pub use crate::core::*;
pub use crate::data::{load_config, load_settings, Config, Settings};
pub use crate::downloader::{AssetFetcher, DownloadEngine, DownloadItem, DownloadQueue, HttpFetcher};
pub use crate::error::{HarvestError, Result};
pub use crate::events::{ChannelSink, EventSink, HarvestEvent, RunReport, Stage, TracingSink};
pub use crate::pipeline::Harvester;
