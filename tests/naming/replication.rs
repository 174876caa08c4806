use std::sync::Arc;

use dfs_zubr::api::{Service, StorageStub};
use dfs_zubr::error::DfsError;
use dfs_zubr::naming::{NamingServer, DEFAULT_REPLICATION_THRESHOLD};

use super::common::{path, register_host};

async fn read_cycle(naming: &NamingServer, raw: &str) {
    naming.lock(&path(raw), false).await.expect("shared lock");
    naming.unlock(&path(raw), false).await.expect("shared unlock");
}

#[tokio::test]
async fn twentieth_read_replicates_to_the_next_host() {
    let naming = NamingServer::new();
    let (origin, _) = register_host(&naming, &["/x"]).await;
    origin.seed("/x", b"twenty reads of this").await;
    let (mirror, _) = register_host(&naming, &[]).await;

    for _ in 0..DEFAULT_REPLICATION_THRESHOLD - 1 {
        read_cycle(&naming, "/x").await;
    }
    assert!(mirror.copied().await.is_empty());

    read_cycle(&naming, "/x").await;
    assert_eq!(mirror.copied().await, vec!["/x"]);
    assert_eq!(mirror.content("/x").await.expect("mirrored bytes"), b"twenty reads of this");
}

#[tokio::test]
async fn replication_stops_at_the_host_count() {
    let naming = NamingServer::with_threshold(2);
    let (origin, _) = register_host(&naming, &["/x"]).await;
    origin.seed("/x", b"data").await;

    for _ in 0..10 {
        read_cycle(&naming, "/x").await;
    }
    // The sole host never receives a copy of its own file.
    assert!(origin.copied().await.is_empty());
}

#[tokio::test]
async fn each_threshold_crossing_adds_one_replica() {
    let naming = NamingServer::with_threshold(2);
    let (origin, _) = register_host(&naming, &["/x"]).await;
    origin.seed("/x", b"data").await;
    let (second, _) = register_host(&naming, &[]).await;
    let (third, _) = register_host(&naming, &[]).await;

    read_cycle(&naming, "/x").await;
    read_cycle(&naming, "/x").await;
    assert_eq!(second.copied().await, vec!["/x"]);
    assert!(third.copied().await.is_empty());

    read_cycle(&naming, "/x").await;
    read_cycle(&naming, "/x").await;
    assert_eq!(third.copied().await, vec!["/x"]);

    // All hosts replicate the file; further reads change nothing.
    read_cycle(&naming, "/x").await;
    read_cycle(&naming, "/x").await;
    assert_eq!(second.copied().await, vec!["/x"]);
    assert_eq!(third.copied().await, vec!["/x"]);
}

#[tokio::test]
async fn directories_are_never_replicated() {
    let naming = NamingServer::with_threshold(1);
    let (_origin, _) = register_host(&naming, &["/a/file"]).await;
    let (mirror, _) = register_host(&naming, &[]).await;

    for _ in 0..3 {
        naming.lock(&path("/a"), false).await.expect("shared lock");
        naming.unlock(&path("/a"), false).await.expect("shared unlock");
    }
    assert!(mirror.copied().await.is_empty());
}

#[tokio::test]
async fn write_lock_invalidates_every_extra_replica() {
    let naming = NamingServer::with_threshold(2);
    let (origin, _) = register_host(&naming, &["/x"]).await;
    origin.seed("/x", b"data").await;
    let (mirror, _) = register_host(&naming, &[]).await;

    read_cycle(&naming, "/x").await;
    read_cycle(&naming, "/x").await;
    assert!(mirror.holds("/x").await);

    naming.lock(&path("/x"), true).await.expect("exclusive lock");
    naming.unlock(&path("/x"), true).await.expect("exclusive unlock");

    assert_eq!(mirror.deleted().await, vec!["/x"]);
    assert!(!mirror.holds("/x").await);
    assert!(origin.deleted().await.is_empty());

    // The primary survives and keeps serving the file.
    let expected: StorageStub = Arc::clone(&origin) as StorageStub;
    let stub = naming.get_storage(&path("/x")).await.expect("storage stub");
    assert!(Arc::ptr_eq(&stub, &expected));
}

#[tokio::test]
async fn write_lock_resets_the_read_counter() {
    let naming = NamingServer::with_threshold(3);
    let (origin, _) = register_host(&naming, &["/x"]).await;
    origin.seed("/x", b"data").await;
    let (mirror, _) = register_host(&naming, &[]).await;

    read_cycle(&naming, "/x").await;
    read_cycle(&naming, "/x").await;
    naming.lock(&path("/x"), true).await.expect("exclusive lock");
    naming.unlock(&path("/x"), true).await.expect("exclusive unlock");

    // Two of the three reads happened before the write; the count starts over.
    read_cycle(&naming, "/x").await;
    read_cycle(&naming, "/x").await;
    assert!(mirror.copied().await.is_empty());
    read_cycle(&naming, "/x").await;
    assert_eq!(mirror.copied().await, vec!["/x"]);
}

#[tokio::test]
async fn failed_replica_delete_is_a_state_error() {
    let naming = NamingServer::with_threshold(2);
    let (origin, _) = register_host(&naming, &["/x"]).await;
    origin.seed("/x", b"data").await;
    let (mirror, _) = register_host(&naming, &[]).await;

    read_cycle(&naming, "/x").await;
    read_cycle(&naming, "/x").await;
    assert!(mirror.holds("/x").await);

    // The mirror silently lost its copy; invalidation now reports false.
    mirror.forget("/x").await;
    assert_eq!(naming.lock(&path("/x"), true).await, Err(DfsError::State));

    // The failed call left no lock holder behind.
    naming.lock(&path("/x"), false).await.expect("shared lock after failure");
    naming.unlock(&path("/x"), false).await.expect("shared unlock");
}
