use std::sync::Arc;

use dfs_zubr::api::{Service, StorageStub};
use dfs_zubr::error::DfsError;
use dfs_zubr::naming::NamingServer;

use super::common::{path, register_host};

#[tokio::test]
async fn create_directory_is_idempotent_in_effect() {
    let naming = NamingServer::new();
    assert!(naming.create_directory(&path("/docs")).await.expect("first create"));
    assert!(!naming.create_directory(&path("/docs")).await.expect("second create"));
    assert_eq!(naming.list(&path("/")).await.expect("list root"), vec!["docs"]);
}

#[tokio::test]
async fn create_file_commands_exactly_one_host() {
    let naming = NamingServer::new();
    let (host, _) = register_host(&naming, &[]).await;

    assert!(naming.create_file(&path("/report.txt")).await.expect("create file"));
    assert!(!naming.create_file(&path("/report.txt")).await.expect("repeat create"));
    assert_eq!(host.created().await, vec!["/report.txt"]);

    let expected: StorageStub = host;
    let stub = naming.get_storage(&path("/report.txt")).await.expect("storage stub");
    assert!(Arc::ptr_eq(&stub, &expected));
}

#[tokio::test]
async fn create_file_distributes_round_robin() {
    let naming = NamingServer::new();
    let (first, _) = register_host(&naming, &[]).await;
    let (second, _) = register_host(&naming, &[]).await;

    assert!(naming.create_file(&path("/a.txt")).await.expect("create a"));
    assert!(naming.create_file(&path("/b.txt")).await.expect("create b"));

    assert_eq!(first.created().await, vec!["/a.txt"]);
    assert_eq!(second.created().await, vec!["/b.txt"]);
}

#[tokio::test]
async fn create_file_without_hosts_is_a_state_error() {
    let naming = NamingServer::new();
    assert_eq!(naming.create_file(&path("/x")).await, Err(DfsError::State));
}

#[tokio::test]
async fn create_under_a_missing_parent_is_not_found() {
    let naming = NamingServer::new();
    register_host(&naming, &[]).await;
    assert_eq!(naming.create_file(&path("/a/b")).await, Err(DfsError::NotFound));
    assert_eq!(naming.create_directory(&path("/a/b")).await, Err(DfsError::NotFound));
}

#[tokio::test]
async fn create_under_a_file_is_not_found() {
    let naming = NamingServer::new();
    register_host(&naming, &["/f"]).await;
    assert_eq!(naming.create_file(&path("/f/x")).await, Err(DfsError::NotFound));
    assert_eq!(naming.create_directory(&path("/f/x")).await, Err(DfsError::NotFound));
}

#[tokio::test]
async fn root_is_never_created_or_deleted() {
    let naming = NamingServer::new();
    register_host(&naming, &[]).await;
    assert!(!naming.create_file(&path("/")).await.expect("create file at root"));
    assert!(!naming.create_directory(&path("/")).await.expect("create directory at root"));
    assert!(!naming.delete(&path("/")).await.expect("delete root"));
}

#[tokio::test]
async fn kind_queries_follow_the_node() {
    let naming = NamingServer::new();
    register_host(&naming, &["/file"]).await;
    naming.create_directory(&path("/dir")).await.expect("create dir");

    assert!(naming.is_directory(&path("/")).await.expect("root kind"));
    assert!(naming.is_directory(&path("/dir")).await.expect("dir kind"));
    assert!(!naming.is_directory(&path("/file")).await.expect("file kind"));
    assert_eq!(naming.is_directory(&path("/ghost")).await, Err(DfsError::NotFound));
}

#[tokio::test]
async fn listing_a_file_is_not_found() {
    let naming = NamingServer::new();
    register_host(&naming, &["/file"]).await;
    assert_eq!(naming.list(&path("/file")).await, Err(DfsError::NotFound));
    assert_eq!(naming.list(&path("/ghost")).await, Err(DfsError::NotFound));
}

#[tokio::test]
async fn get_storage_rejects_directories_and_ghosts() {
    let naming = NamingServer::new();
    register_host(&naming, &[]).await;
    naming.create_directory(&path("/dir")).await.expect("create dir");
    assert_eq!(naming.get_storage(&path("/dir")).await.err(), Some(DfsError::NotFound));
    assert_eq!(naming.get_storage(&path("/ghost")).await.err(), Some(DfsError::NotFound));
}

#[tokio::test]
async fn deleted_files_vanish_from_every_query() {
    let naming = NamingServer::new();
    let (host, _) = register_host(&naming, &["/doomed"]).await;

    assert!(naming.delete(&path("/doomed")).await.expect("delete"));
    assert_eq!(host.deleted().await, vec!["/doomed"]);

    assert_eq!(naming.is_directory(&path("/doomed")).await, Err(DfsError::NotFound));
    assert_eq!(naming.list(&path("/doomed")).await, Err(DfsError::NotFound));
    assert!(naming.get_storage(&path("/doomed")).await.is_err());
    assert!(naming.list(&path("/")).await.expect("list root").is_empty());
}

#[tokio::test]
async fn deleting_a_directory_commands_every_replica_host() {
    let naming = NamingServer::new();
    let (first, _) = register_host(&naming, &["/d/a.txt"]).await;
    let (second, _) = register_host(&naming, &["/d/b.txt"]).await;

    assert!(naming.delete(&path("/d")).await.expect("delete subtree"));
    assert_eq!(first.deleted().await, vec!["/d"]);
    assert_eq!(second.deleted().await, vec!["/d"]);
    assert!(naming.list(&path("/")).await.expect("list root").is_empty());
}

#[tokio::test]
async fn deleting_a_missing_path_is_not_found() {
    let naming = NamingServer::new();
    register_host(&naming, &[]).await;
    assert_eq!(naming.delete(&path("/ghost")).await, Err(DfsError::NotFound));
}

#[tokio::test]
async fn delete_reports_a_host_that_returns_false() {
    let naming = NamingServer::new();
    let (host, _) = register_host(&naming, &["/x"]).await;

    // The host lost the file behind the naming server's back.
    host.forget("/x").await;
    assert!(!naming.delete(&path("/x")).await.expect("delete"));
    assert_eq!(host.deleted().await, vec!["/x"]);

    // The tree entry is removed regardless.
    assert_eq!(naming.is_directory(&path("/x")).await, Err(DfsError::NotFound));
}
