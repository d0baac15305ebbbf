//! Temporary working tree and the final move into the project.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{HarvestError, Result};
use crate::events::{EventSink, HarvestEvent};

pub mod fs;

pub const ASSETS_DIR: &str = "assets";

/// `<temp_root>/<unix-millis>/<schema index>/<source folder>/{file.json, assets/}`
#[derive(Debug, Clone)]
pub struct WorkingTree {
    root: PathBuf,
}

impl WorkingTree {
    pub async fn create(temp_root: &Path) -> Result<Self> {
        let root = temp_root.join(chrono::Utc::now().timestamp_millis().to_string());
        tokio::fs::create_dir_all(&root).await?;
        tracing::debug!(root = %root.display(), "created working tree");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn schema_dir(&self, schema_index: usize) -> PathBuf {
        self.root.join(schema_index.to_string())
    }

    pub fn source_dir(&self, schema_index: usize, folder: &str) -> PathBuf {
        join_folder(&self.schema_dir(schema_index), folder)
    }

    pub fn assets_dir(&self, schema_index: usize, folder: &str) -> PathBuf {
        self.source_dir(schema_index, folder).join(ASSETS_DIR)
    }

    pub async fn remove(self) -> Result<()> {
        tokio::fs::remove_dir_all(&self.root).await?;
        Ok(())
    }
}

/// A source whose rewritten JSON made it into the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSource {
    pub schema_index: usize,
    pub folder: String,
    pub filename: String,
    pub has_assets: bool,
}

fn join_folder(base: &Path, folder: &str) -> PathBuf {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        base.to_path_buf()
    } else {
        base.join(folder)
    }
}

/// Expand `~` in the project path, drop trailing slashes and append the target folder.
pub fn expand_destination(project_path: &str, target_folder: &str) -> PathBuf {
    let expanded = shellexpand::tilde(project_path).into_owned();
    let trimmed = expanded.trim_end_matches('/');
    let base = if trimmed.is_empty() { "/" } else { trimmed };
    join_folder(Path::new(base), target_folder)
}

/// Move every staged source out of the working tree into `destination_root`.
///
/// The first move into a destination `assets/` dir replaces what an earlier
/// run left there; later sources of this run that share the dir are merged
/// into it. Any failed move aborts with [`HarvestError::Relocation`]; the working tree
/// is left untouched for inspection.
pub async fn relocate(
    staged: &[StagedSource],
    tree: &WorkingTree,
    destination_root: &Path,
    sink: &dyn EventSink,
) -> Result<usize> {
    let mut moved = 0;
    let mut written: HashSet<PathBuf> = HashSet::new();
    for source in staged {
        let from = tree.source_dir(source.schema_index, &source.folder);
        let to = join_folder(destination_root, &source.folder);

        if source.has_assets {
            let assets_from = from.join(ASSETS_DIR);
            // Sources of one schema sharing a folder share a staged assets dir.
            if tokio::fs::try_exists(&assets_from).await.unwrap_or(false) {
                let assets_to = to.join(ASSETS_DIR);
                let result = if written.contains(&assets_to) {
                    fs::merge_dir(&assets_from, &assets_to).await
                } else {
                    fs::move_dir(&assets_from, &assets_to).await
                };
                result.map_err(|source| relocation_error(&assets_from, &assets_to, source))?;
                written.insert(assets_to.clone());
                sink.emit(HarvestEvent::Relocated {
                    from: assets_from,
                    to: assets_to,
                });
            }
        }

        let file_from = from.join(&source.filename);
        let file_to = to.join(&source.filename);
        fs::move_file(&file_from, &file_to)
            .await
            .map_err(|source| relocation_error(&file_from, &file_to, source))?;
        sink.emit(HarvestEvent::Relocated {
            from: file_from,
            to: file_to,
        });
        moved += 1;
    }
    Ok(moved)
}

fn relocation_error(from: &Path, to: &Path, source: std::io::Error) -> HarvestError {
    tracing::error!(from = %from.display(), to = %to.display(), error = %source, "relocation failed");
    HarvestError::Relocation {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    }
}
