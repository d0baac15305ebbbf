//! Locates asset leaves inside a JSON document.
//!
//! Walking a path never fails: a missing segment anywhere just yields no
//! references for that branch, since asset fields are optional per record.
//! Arrays are expanded transparently and contribute a 1-based index to the
//! filename stem (`gallery.items.img` -> `gallery-items-1-img`, `gallery-items-2-img`).

use serde_json::Value;

use super::model::{AssetFieldPath, AssetReference, PathStep};

/// Resolve one field path against `root`, in ascending array-index order.
pub fn resolve(path: &AssetFieldPath, root: &Value) -> Vec<AssetReference> {
    let mut refs = Vec::new();
    let mut trail = Vec::new();
    walk(root, path.segments(), &mut trail, String::new(), &mut refs);
    refs
}

/// Resolve every path independently and concatenate in declaration order.
pub fn resolve_all(paths: &[AssetFieldPath], root: &Value) -> Vec<AssetReference> {
    paths.iter().flat_map(|p| resolve(p, root)).collect()
}

fn walk(
    node: &Value,
    segments: &[String],
    trail: &mut Vec<PathStep>,
    stem: String,
    refs: &mut Vec<AssetReference>,
) {
    let Some((field, rest)) = segments.split_first() else {
        return;
    };
    let value = match node.as_object().and_then(|obj| obj.get(field)) {
        Some(Value::Null) | None => return,
        Some(value) => value,
    };
    let stem = stem + field;

    if rest.is_empty() {
        match value {
            Value::Array(elements) => {
                for (i, element) in elements.iter().enumerate() {
                    if element.is_string() {
                        let mut parent = trail.clone();
                        parent.push(PathStep::Field(field.clone()));
                        refs.push(AssetReference {
                            parent,
                            key: PathStep::Index(i),
                            stem: format!("{}-{}", stem, i + 1),
                        });
                    }
                }
            }
            Value::String(_) => refs.push(AssetReference {
                parent: trail.clone(),
                key: PathStep::Field(field.clone()),
                stem,
            }),
            _ => {}
        }
        return;
    }

    trail.push(PathStep::Field(field.clone()));
    match value {
        Value::Array(elements) => {
            for (i, element) in elements.iter().enumerate() {
                trail.push(PathStep::Index(i));
                walk(element, rest, trail, format!("{}-{}-", stem, i + 1), refs);
                trail.pop();
            }
        }
        other => walk(other, rest, trail, format!("{}-", stem), refs),
    }
    trail.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> AssetFieldPath {
        AssetFieldPath::parse(p).unwrap()
    }

    fn stems(refs: &[AssetReference]) -> Vec<&str> {
        refs.iter().map(|r| r.stem.as_str()).collect()
    }

    #[test]
    fn test_scalar_leaf() {
        let doc = json!({ "photo": "http://x/a.jpg" });
        let refs = resolve(&path("photo"), &doc);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].stem, "photo");
        assert_eq!(refs[0].current_url(&doc), Some("http://x/a.jpg"));
    }

    #[test]
    fn test_array_expansion_is_one_based() {
        let doc = json!({ "gallery": { "items": [ { "img": "a.png" }, { "img": "b.jpg" } ] } });
        let refs = resolve(&path("gallery.items.img"), &doc);
        assert_eq!(stems(&refs), vec!["gallery-items-1-img", "gallery-items-2-img"]);
        assert_eq!(refs[0].current_url(&doc), Some("a.png"));
        assert_eq!(refs[1].current_url(&doc), Some("b.jpg"));
    }

    #[test]
    fn test_terminal_array() {
        let doc = json!({ "shots": ["a", "b", "c"] });
        let refs = resolve(&path("shots"), &doc);
        assert_eq!(stems(&refs), vec!["shots-1", "shots-2", "shots-3"]);
        assert_eq!(refs[2].current_url(&doc), Some("c"));
    }

    #[test]
    fn test_missing_segments_yield_nothing() {
        let doc = json!({ "gallery": { "title": "x" }, "photo": null });
        assert!(resolve(&path("gallery.items.img"), &doc).is_empty());
        assert!(resolve(&path("nothing.here"), &doc).is_empty());
        assert!(resolve(&path("gallery.img"), &doc).is_empty());
        assert!(resolve(&path("photo"), &doc).is_empty());
        assert!(resolve(&path("gallery.title.deeper"), &doc).is_empty());
    }

    #[test]
    fn test_partial_records_skip_quietly() {
        let doc = json!({ "items": [ { "img": "a" }, { "caption": "no image" }, { "img": "c" } ] });
        let refs = resolve(&path("items.img"), &doc);
        assert_eq!(stems(&refs), vec!["items-1-img", "items-3-img"]);
    }

    #[test]
    fn test_non_string_leaves_ignored() {
        let doc = json!({ "a": 3, "b": { "c": true }, "d": [1, "x"] });
        assert!(resolve(&path("a"), &doc).is_empty());
        assert!(resolve(&path("b"), &doc).is_empty());
        assert_eq!(stems(&resolve(&path("d"), &doc)), vec!["d-2"]);
    }

    #[test]
    fn test_resolve_all_keeps_declaration_order() {
        let doc = json!({ "photo": "p", "thumb": "t", "list": [ { "u": "l1" } ] });
        let refs = resolve_all(&[path("thumb"), path("list.u"), path("photo")], &doc);
        assert_eq!(stems(&refs), vec!["thumb", "list-1-u", "photo"]);
    }

    #[test]
    fn test_nested_arrays_track_every_index() {
        let doc = json!({ "rows": [ { "cells": [ { "src": "a" } ] }, { "cells": [ { "src": "b" }, { "src": "c" } ] } ] });
        let refs = resolve(&path("rows.cells.src"), &doc);
        assert_eq!(
            stems(&refs),
            vec!["rows-1-cells-1-src", "rows-2-cells-1-src", "rows-2-cells-2-src"]
        );
        assert_eq!(refs[2].current_url(&doc), Some("c"));
    }
}
