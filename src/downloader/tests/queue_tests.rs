use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use super::ScriptedFetcher;
use crate::core::model::AssetFieldPath;
use crate::core::resolver::resolve_all;
use crate::downloader::queue::{build_source_queue, DownloadQueue};

fn paths(list: &[&str]) -> Vec<AssetFieldPath> {
    list.iter().map(|p| AssetFieldPath::parse(p).unwrap()).collect()
}

#[tokio::test]
async fn test_same_asset_twice_yields_one_item() {
    let fetcher = ScriptedFetcher::default();
    let mut doc = json!({ "photo": "http://x/a.jpg", "thumb": "http://x/a.jpg" });
    let refs = resolve_all(&paths(&["photo", "thumb"]), &doc);

    let download = Path::new("/tmp/w/0/assets");
    let sq = build_source_queue(&fetcher, &mut doc, &refs, download, "content/assets", "").await;
    let mut queue = DownloadQueue::new();
    queue.merge(sq);

    assert_eq!(queue.len(), 1);
    let item = queue.get("http://x/a.jpg").unwrap();
    assert_eq!(
        item.destinations,
        vec![PathBuf::from("/tmp/w/0/assets/photo.jpg"), PathBuf::from("/tmp/w/0/assets/thumb.jpg")]
    );
    let expected = json!({ "photo": "content/assets/photo.jpg", "thumb": "content/assets/thumb.jpg" });
    assert_eq!(doc, expected);
}

#[tokio::test]
async fn test_redirects_dedup_on_resolved_url() {
    let fetcher = ScriptedFetcher::default()
        .redirect("http://short/1", "http://cdn/real.png")
        .redirect("http://short/2", "http://cdn/real.png");
    let mut doc = json!({ "items": [ { "img": "http://short/1" }, { "img": "http://short/2" }, { "img": "http://cdn/other.gif" } ] });
    let refs = resolve_all(&paths(&["items.img"]), &doc);

    let sq = build_source_queue(&fetcher, &mut doc, &refs, Path::new("/w"), "pub", "").await;
    let mut queue = DownloadQueue::new();
    queue.merge(sq);

    assert_eq!(queue.len(), 2);
    let urls: Vec<_> = queue.iter().map(|i| i.url.as_str()).collect();
    assert_eq!(urls, vec!["http://cdn/real.png", "http://cdn/other.gif"]);
    assert_eq!(queue.get("http://cdn/real.png").unwrap().destinations.len(), 2);
    assert_eq!(doc["items"][1]["img"], "pub/items-2-img.png");
    assert_eq!(doc["items"][2]["img"], "pub/items-3-img.gif");
}

#[tokio::test]
async fn test_rewrite_uses_published_not_local_path() {
    let fetcher = ScriptedFetcher::default();
    let mut doc = json!({ "gallery": { "items": [ { "img": "http://x/a.png" }, { "img": "http://x/b.jpg" } ] } });
    let refs = resolve_all(&paths(&["gallery.items.img"]), &doc);
    let download = Path::new("/tmp/work/123/0/assets");

    let sq = build_source_queue(&fetcher, &mut doc, &refs, download, "site/assets", "").await;

    assert_eq!(sq.assets.len(), 2);
    let expected_leaves = [
        "site/assets/gallery-items-1-img.png",
        "site/assets/gallery-items-2-img.jpg",
    ];
    for (i, expected) in expected_leaves.iter().enumerate() {
        let leaf = doc["gallery"]["items"][i]["img"].as_str().unwrap();
        assert_eq!(leaf, *expected);
        assert!(!leaf.contains("/tmp/work"));
        assert!(sq.assets[i].local_path.starts_with(download));
    }
}

#[tokio::test]
async fn test_probe_failure_leaves_field_untouched() {
    let mut fetcher = ScriptedFetcher::default();
    fetcher.failing_probes.insert("http://x/missing.png".to_string());
    let mut doc = json!({ "photo": "http://x/missing.png", "thumb": "http://x/ok.png" });
    let refs = resolve_all(&paths(&["photo", "thumb"]), &doc);

    let sq = build_source_queue(&fetcher, &mut doc, &refs, Path::new("/w"), "pub", "").await;

    assert_eq!(sq.assets.len(), 1);
    assert_eq!(sq.failures.len(), 1);
    assert_eq!(sq.failures[0].0, "http://x/missing.png");
    assert!(sq.failures[0].1.contains("404"));
    assert_eq!(doc["photo"], "http://x/missing.png");
    assert_eq!(doc["thumb"], "pub/thumb.png");
}

#[tokio::test]
async fn test_no_references_yields_empty_queue() {
    let fetcher = ScriptedFetcher::default();
    let mut doc = json!({ "title": "nothing to fetch" });
    let refs = resolve_all(&paths(&["photo", "gallery.items.img"]), &doc);
    let sq = build_source_queue(&fetcher, &mut doc, &refs, Path::new("/w"), "pub", "").await;
    assert!(sq.assets.is_empty());
    assert!(sq.failures.is_empty());
    assert_eq!(doc, json!({ "title": "nothing to fetch" }));
}

#[tokio::test]
async fn test_serialized_document_differs_only_in_asset_leaves() {
    let fetcher = ScriptedFetcher::default();
    let original = json!({
        "title": "Issue 4",
        "count": 3,
        "photo": "http://x/cover.jpg",
        "gallery": { "items": [ { "img": "http://x/1.png", "caption": "one" }, { "caption": "none" } ] },
        "tags": ["a", "b"]
    });
    let mut doc = original.clone();
    let refs = resolve_all(&paths(&["photo", "gallery.items.img"]), &doc);
    build_source_queue(&fetcher, &mut doc, &refs, Path::new("/w"), "pub", "").await;

    let pretty = serde_json::to_vec_pretty(&doc).unwrap();
    let reparsed: Value = serde_json::from_slice(&pretty).unwrap();
    assert_eq!(reparsed, doc);

    let mut expected = original;
    expected["photo"] = json!("pub/photo.jpg");
    expected["gallery"]["items"][0]["img"] = json!("pub/gallery-items-1-img.png");
    assert_eq!(reparsed, expected);
}

#[tokio::test]
async fn test_sources_sharing_a_folder_get_distinct_files() {
    let fetcher = ScriptedFetcher::default();
    let download = Path::new("/tmp/w/0/assets");
    let mut queue = DownloadQueue::new();

    let mut news = json!({ "photo": "http://x/news.jpg" });
    let refs = resolve_all(&paths(&["photo"]), &news);
    let sq = build_source_queue(&fetcher, &mut news, &refs, download, "assets", "news-").await;
    assert!(queue.merge(sq).is_empty());

    let mut events = json!({ "photo": "http://x/events.jpg" });
    let refs = resolve_all(&paths(&["photo"]), &events);
    let sq = build_source_queue(&fetcher, &mut events, &refs, download, "assets", "events-").await;
    assert!(queue.merge(sq).is_empty());

    assert_eq!(news["photo"], "assets/news-photo.jpg");
    assert_eq!(events["photo"], "assets/events-photo.jpg");
    assert_eq!(queue.len(), 2);
    let primary = |url: &str| queue.get(url).unwrap().primary().to_path_buf();
    assert_eq!(primary("http://x/news.jpg"), download.join("news-photo.jpg"));
    assert_eq!(primary("http://x/events.jpg"), download.join("events-photo.jpg"));
}

#[tokio::test]
async fn test_unprefixed_sources_in_one_folder_conflict() {
    let fetcher = ScriptedFetcher::default();
    let download = Path::new("/w/assets");
    let mut queue = DownloadQueue::new();

    let mut first = json!({ "photo": "http://x/one.jpg" });
    let refs = resolve_all(&paths(&["photo"]), &first);
    queue.merge(build_source_queue(&fetcher, &mut first, &refs, download, "assets", "").await);

    let mut second = json!({ "photo": "http://x/two.jpg" });
    let refs = resolve_all(&paths(&["photo"]), &second);
    let sq = build_source_queue(&fetcher, &mut second, &refs, download, "assets", "").await;
    let conflicts = queue.merge(sq);

    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].url, "http://x/two.jpg");
    assert_eq!(conflicts[0].claimed_by, "http://x/one.jpg");
    assert_eq!(queue.len(), 1);
}
