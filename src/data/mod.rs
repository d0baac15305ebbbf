use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::core::model::AssetFieldPath;
use crate::error::{HarvestError, Result};
use crate::staging::expand_destination;

/// Run configuration: which sources to fetch, which fields hold assets, and
/// where the finished tree goes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub schemas: Vec<SchemaConfig>,
    #[serde(default)]
    pub target_folder: String,
    pub project_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub assets: Vec<AssetFieldPath>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub url: String,
    #[serde(default)]
    pub target_folder: Option<String>,
    pub target_filename: String,
}

impl SourceConfig {
    /// Folder of this source relative to the destination root ("" when unset).
    pub fn folder(&self) -> &str {
        self.target_folder.as_deref().map(|f| f.trim_matches('/')).unwrap_or("")
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.schemas.is_empty() {
            return Err(HarvestError::Config("no schemas configured".into()));
        }
        if self.project_path.trim().is_empty() {
            return Err(HarvestError::Config("projectPath is empty".into()));
        }
        check_relative("targetFolder", &self.target_folder)?;
        let mut outputs = HashSet::new();
        for (i, schema) in self.schemas.iter().enumerate() {
            if schema.sources.is_empty() {
                return Err(HarvestError::Config(format!("schema {} has no sources", i + 1)));
            }
            for source in &schema.sources {
                if source.url.trim().is_empty() {
                    return Err(HarvestError::Config(format!(
                        "schema {} has a source without url",
                        i + 1
                    )));
                }
                let filename = source.target_filename.trim();
                if filename.is_empty() || filename.contains('/') {
                    return Err(HarvestError::Config(format!(
                        "source {} needs a plain targetFilename",
                        source.url
                    )));
                }
                check_relative("targetFolder", source.folder())?;
                if !outputs.insert((source.folder(), source.target_filename.as_str())) {
                    return Err(HarvestError::Config(format!(
                        "more than one source writes {}/{}",
                        source.folder(),
                        source.target_filename
                    )));
                }
            }
        }
        Ok(())
    }

    /// `projectPath/targetFolder` with `~` expanded.
    pub fn destination_root(&self) -> PathBuf {
        expand_destination(&self.project_path, &self.target_folder)
    }

    /// Project-relative folder written into the JSON for a source's assets.
    pub fn published_folder(&self, source: &SourceConfig) -> String {
        [self.target_folder.trim_matches('/'), source.folder(), "assets"]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Prefix for asset filenames of `source`. Sources that share an output
    /// folder share its `assets/` dir, so their files are told apart by the
    /// stem of their target filename (`news.json` -> `news-photo.jpg`).
    pub fn file_prefix(&self, source: &SourceConfig) -> String {
        let sharing = self
            .schemas
            .iter()
            .flat_map(|schema| schema.sources.iter())
            .filter(|other| other.folder() == source.folder())
            .count();
        if sharing < 2 {
            return String::new();
        }
        let stem = match source.target_filename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => source.target_filename.as_str(),
        };
        format!("{}-", stem)
    }
}

fn check_relative(label: &str, folder: &str) -> Result<()> {
    let path = Path::new(folder);
    let escapes = path.components().any(|c| matches!(c, Component::ParentDir));
    if path.is_absolute() || escapes {
        return Err(HarvestError::Config(format!(
            "{} '{}' must be a relative path inside the project",
            label, folder
        )));
    }
    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let bytes = fs::read(path)?;
    let config: Config = serde_json::from_slice(&bytes)?;
    config.validate()?;
    Ok(config)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub max_redirects: usize,
    pub progress_interval_ms: u64,
    pub temp_root: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_agent: format!("asset-harvest/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 60,
            max_redirects: 10,
            progress_interval_ms: 100,
            temp_root: None,
        }
    }
}

impl Settings {
    /// Where timestamped working trees are created.
    pub fn temp_root(&self) -> PathBuf {
        if let Some(root) = &self.temp_root {
            return root.clone();
        }
        match project_dirs() {
            Some(proj) => proj.cache_dir().join("work"),
            None => std::env::temp_dir().join("asset-harvest"),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "asset-harvest", "asset-harvest")
}

pub fn app_dirs() -> Option<PathBuf> {
    let proj = project_dirs()?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).ok();
    Some(data_dir.to_path_buf())
}

fn settings_path() -> Option<PathBuf> {
    app_dirs().map(|dir| dir.join("settings.json"))
}

pub fn load_settings() -> Settings {
    settings_path()
        .and_then(|path| fs::read(path).ok())
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}
