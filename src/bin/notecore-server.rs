//! Standalone note server.
//!
//! Serves the collection stored in `~/.note-app/server.json` on the port
//! from `~/.note-app/config.json` (default 8080). Log verbosity follows
//! `RUST_LOG`.

use std::process::ExitCode;
use std::sync::Arc;

use notecore::config::HomeDirResolver;
use notecore::sync_server::start_server_on_port;
use notecore::{BlobRemote, Config, FileBlobStore, NoteResult};
use tracing_subscriber::EnvFilter;

fn configure_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> NoteResult<()> {
    let config = Config::from_resolver(&HomeDirResolver)?;
    let blobs = Arc::new(FileBlobStore::open(config.storage_dir())?);
    let notes = BlobRemote::with_blob_name(blobs, config.snapshot_blob());

    let handle = start_server_on_port(notes, config.server_port()).await?;
    tracing::info!(
        "Note server listening on {}, data in {}",
        handle.local_addr(),
        config.storage_dir().display()
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");

    handle.shutdown().await
}

#[tokio::main]
async fn main() -> ExitCode {
    configure_logging();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
