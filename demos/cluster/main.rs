use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dfs_zubr::api::{Service, Storage};
use dfs_zubr::config::{ClusterConfig, NamingConfig, StorageConfig};
use dfs_zubr::naming::NamingServer;
use dfs_zubr::path::DfsPath;
use dfs_zubr::storage::{StorageEngine, StorageServer};

/// In-process demonstration cluster: one naming server, two storage hosts.
#[derive(Parser)]
struct Args {
    /// TOML cluster description; scratch directories are used when absent.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn scratch_cluster() -> (ClusterConfig, Vec<tempfile::TempDir>) {
    let scratch: Vec<tempfile::TempDir> =
        (0..2).map(|_| tempfile::tempdir().expect("create scratch root")).collect();
    let storage =
        scratch.iter().map(|dir| StorageConfig { root: dir.path().to_path_buf() }).collect();
    (ClusterConfig { naming: NamingConfig::default(), storage }, scratch)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let (config, _scratch) = match &args.config {
        Some(path) => (ClusterConfig::load(path).await.expect("read cluster config"), Vec::new()),
        None => scratch_cluster(),
    };

    let naming = NamingServer::with_config(&config.naming);
    let mut servers = Vec::new();
    for host in &config.storage {
        let engine = Arc::new(StorageEngine::new(host.root.clone()));
        let server = StorageServer::new(engine);
        server.start(&naming).await.expect("start storage server");
        servers.push(server);
    }

    let docs = DfsPath::parse("/docs").expect("demo path");
    let notes = DfsPath::parse("/docs/notes.txt").expect("demo path");
    assert!(naming.create_directory(&docs).await.expect("create directory"));
    assert!(naming.create_file(&notes).await.expect("create file"));

    naming.lock(&notes, true).await.expect("write lock");
    let primary = naming.get_storage(&notes).await.expect("storage stub");
    primary.write(&notes, 0, b"zubr was here").await.expect("write bytes");
    naming.unlock(&notes, true).await.expect("write unlock");

    // Hammer the file with shared locks until the naming server replicates it.
    for _ in 0..config.naming.replication_threshold {
        naming.lock(&notes, false).await.expect("read lock");
        naming.unlock(&notes, false).await.expect("read unlock");
    }

    naming.lock(&notes, false).await.expect("read lock");
    let primary = naming.get_storage(&notes).await.expect("storage stub");
    let size = primary.size(&notes).await.expect("size");
    let bytes = primary.read(&notes, 0, size as u32).await.expect("read bytes");
    naming.unlock(&notes, false).await.expect("read unlock");

    let hosts = naming.storage_count().await;
    let listing = naming.list(&docs).await.expect("list");
    info!(
        hosts,
        listing = ?listing,
        content = %String::from_utf8_lossy(&bytes),
        "demo cluster round trip complete"
    );

    for server in &servers {
        server.stop().await;
    }
}
