use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Dotted path naming where an asset URL lives inside a source document,
/// e.g. `images.gallery.url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetFieldPath {
    segments: Vec<String>,
}

impl AssetFieldPath {
    pub fn parse(path: &str) -> Result<Self, String> {
        let segments: Vec<String> = path.split('.').map(|s| s.trim().to_string()).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(format!("asset field path '{}' has an empty segment", path));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl TryFrom<String> for AssetFieldPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AssetFieldPath> for String {
    fn from(path: AssetFieldPath) -> Self {
        path.segments.join(".")
    }
}

impl fmt::Display for AssetFieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// One step from a node to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Field(String),
    Index(usize),
}

impl PathStep {
    fn get<'a>(&self, node: &'a Value) -> Option<&'a Value> {
        match self {
            PathStep::Field(name) => node.as_object()?.get(name),
            PathStep::Index(i) => node.as_array()?.get(*i),
        }
    }

    fn get_mut<'a>(&self, node: &'a mut Value) -> Option<&'a mut Value> {
        match self {
            PathStep::Field(name) => node.as_object_mut()?.get_mut(name),
            PathStep::Index(i) => node.as_array_mut()?.get_mut(*i),
        }
    }
}

/// A mutable string leaf inside a source document: the steps from the root to
/// the containing node, the key inside that node, and the filename stem
/// accumulated while walking there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReference {
    pub parent: Vec<PathStep>,
    pub key: PathStep,
    pub stem: String,
}

impl AssetReference {
    fn parent_node<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.parent.iter().try_fold(root, |node, step| step.get(node))
    }

    fn parent_node_mut<'a>(&self, root: &'a mut Value) -> Option<&'a mut Value> {
        self.parent.iter().try_fold(root, |node, step| step.get_mut(node))
    }

    /// The URL currently stored at this leaf.
    pub fn current_url<'a>(&self, root: &'a Value) -> Option<&'a str> {
        self.key.get(self.parent_node(root)?)?.as_str()
    }

    /// Replace the leaf value. Returns false if the leaf no longer exists.
    pub fn rewrite(&self, root: &mut Value, value: String) -> bool {
        match self.parent_node_mut(root).and_then(|parent| self.key.get_mut(parent)) {
            Some(leaf) => {
                *leaf = Value::String(value);
                true
            }
            None => false,
        }
    }
}

/// Metadata returned by probing a remote asset without transferring its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub resolved_url: String,
    pub extension: String,
}
