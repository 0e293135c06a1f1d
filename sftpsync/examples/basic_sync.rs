//! Mirror one local directory into another, then prune it

use std::error::Error;
use sftpsync::{sync_local, SyncOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("sftpsync=debug")
        .init();

    let temp_dir = tempfile::TempDir::new()?;
    let source_dir = temp_dir.path().join("source");
    let dest_dir = temp_dir.path().join("destination");

    tokio::fs::create_dir_all(source_dir.join("subdir")).await?;
    tokio::fs::write(source_dir.join("file1.txt"), b"This is file 1 content").await?;
    tokio::fs::write(source_dir.join("notes.tmp"), b"scratch").await?;
    tokio::fs::write(source_dir.join("subdir").join("file2.txt"), b"This is file 2 content").await?;

    tokio::fs::create_dir_all(&dest_dir).await?;
    tokio::fs::write(dest_dir.join("stale.txt"), b"left over").await?;

    let source = source_dir.to_string_lossy().to_string();
    let destination = dest_dir.to_string_lossy().to_string();
    let options = SyncOptions {
        excludes: vec!["\\.tmp$".to_string()],
        delete: true,
        ..Default::default()
    };

    let preview = sync_local(&source, &destination, SyncOptions {
        dry_run: true,
        ..options.clone()
    })
    .await?;
    println!("{}", preview.summary());

    let stats = sync_local(&source, &destination, options.clone()).await?;
    println!("{}", stats.summary());

    let again = sync_local(&source, &destination, options).await?;
    println!("{}", again.summary());

    Ok(())
}
