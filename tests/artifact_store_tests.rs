use std::io::Read;
use std::time::{Duration, SystemTime};

use relaycache::path::ArtifactPath;
use relaycache::store::ArtifactStore;
use tempfile::TempDir;

#[tokio::test]
async fn publish_is_atomic_and_visible_only_once_complete() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    let path = ArtifactPath::parse("com/example/lib/1.0/lib-1.0.jar").unwrap();

    assert!(store.find(&path).await.is_none());
    assert!(store.stat(&path).await.is_none());

    let location = store
        .publish_bytes(&path, b"binary jar contents", None)
        .await
        .unwrap();

    assert!(location.exists());
    let mut file = store.find(&path).await.unwrap().into_std().await;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, b"binary jar contents");
}

#[tokio::test]
async fn republishing_overwrites_previous_content() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    let path = ArtifactPath::parse("g/a/1.0/a-1.0.pom").unwrap();

    store.publish_bytes(&path, b"first", None).await.unwrap();
    store.publish_bytes(&path, b"second", None).await.unwrap();

    let mut file = store.find(&path).await.unwrap().into_std().await;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, b"second");
}

#[tokio::test]
async fn publish_creates_missing_parent_directories() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    let path = ArtifactPath::parse("deeply/nested/group/artifact/1.0/a.jar").unwrap();

    store.publish_bytes(&path, b"x", None).await.unwrap();
    assert!(store.stat(&path).await.is_some());
}

#[tokio::test]
async fn publish_honors_explicit_last_modified_truncated_to_seconds() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    let path = ArtifactPath::parse("g/a/1.0/a.jar").unwrap();

    let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_123);
    let location = store.publish_bytes(&path, b"x", Some(mtime)).await.unwrap();

    let metadata = std::fs::metadata(location).unwrap();
    assert_eq!(metadata.modified().unwrap(), mtime);
}

#[tokio::test]
async fn distinct_artifacts_do_not_collide() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    let a = ArtifactPath::parse("g/a/1.0/a.jar").unwrap();
    let b = ArtifactPath::parse("g/b/1.0/b.jar").unwrap();

    store.publish_bytes(&a, b"A", None).await.unwrap();
    store.publish_bytes(&b, b"B", None).await.unwrap();

    let mut fa = store.find(&a).await.unwrap().into_std().await;
    let mut fb = store.find(&b).await.unwrap().into_std().await;
    let mut ba = Vec::new();
    let mut bb = Vec::new();
    fa.read_to_end(&mut ba).unwrap();
    fb.read_to_end(&mut bb).unwrap();
    assert_eq!(ba, b"A");
    assert_eq!(bb, b"B");
}
