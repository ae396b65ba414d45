//! The "other side" of synchronization.
//!
//! A [`RemoteEndpoint`] holds a full note collection that can be read and
//! replaced wholesale. It has no merge logic: whoever replaces it last wins.
//!
//! - [`HttpRemote`]: a note server reached over HTTP (`GET`/`POST /notes`)
//! - [`BlobRemote`]: a second durable blob standing in for a server
//! - [`OfflineRemote`]: no server configured; every call is unreachable

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::blob_store::{BlobStore, SERVER_SNAPSHOT_BLOB};
use crate::config::Config;
use crate::error::{NoteError, NoteResult};
use crate::models::{encode_note_list, parse_note_list, Note};

/// Response body of `POST /notes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceResponse {
    pub success: bool,
}

/// Response body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Trait for the remote side of a sync.
pub trait RemoteEndpoint: Send + Sync + 'static {
    /// Fetch the remote's full collection
    fn fetch_all(&self) -> impl Future<Output = NoteResult<Vec<Note>>> + Send;

    /// Replace the remote's full collection
    fn replace_all(&self, notes: &[Note]) -> impl Future<Output = NoteResult<()>> + Send;
}

/// Remote note server reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

impl HttpRemote {
    /// Create a client for the server at `base_url`.
    ///
    /// Requests that take longer than `timeout` fail as network errors.
    pub fn new(base_url: &str, timeout: Duration) -> NoteResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NoteError::Config(format!("Invalid HTTP client settings: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from the configured server URL and timeout
    pub fn from_config(config: &Config) -> NoteResult<Self> {
        Self::new(config.server_url(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check whether the server is up
    pub async fn health(&self) -> NoteResult<HealthResponse> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NoteError::remote(format!(
                "Health check failed with status {}",
                response.status()
            )));
        }

        response
            .json::<HealthResponse>()
            .await
            .map_err(|e| NoteError::remote(format!("Failed to parse health response: {}", e)))
    }
}

impl RemoteEndpoint for HttpRemote {
    async fn fetch_all(&self) -> NoteResult<Vec<Note>> {
        tracing::debug!("GET {}/notes", self.base_url);

        let response = self
            .client
            .get(format!("{}/notes", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NoteError::remote(format!(
                "Fetch failed with status {}",
                response.status()
            )));
        }

        let notes: Vec<Note> = response
            .json()
            .await
            .map_err(|e| NoteError::remote(format!("Failed to parse notes: {}", e)))?;

        tracing::debug!("Fetched {} notes from {}", notes.len(), self.base_url);
        Ok(notes)
    }

    async fn replace_all(&self, notes: &[Note]) -> NoteResult<()> {
        tracing::debug!("POST {}/notes ({} notes)", self.base_url, notes.len());

        let response = self
            .client
            .post(format!("{}/notes", self.base_url))
            .json(notes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NoteError::remote(format!(
                "Push failed with status {}",
                response.status()
            )));
        }

        let result: ReplaceResponse = response
            .json()
            .await
            .map_err(|e| NoteError::remote(format!("Failed to parse push response: {}", e)))?;

        if !result.success {
            return Err(NoteError::remote("Server rejected the collection"));
        }
        Ok(())
    }
}

/// A durable blob acting as the server.
///
/// Used directly for single-machine setups, and by the HTTP server as its
/// backing store.
#[derive(Debug)]
pub struct BlobRemote<B: BlobStore> {
    blobs: Arc<B>,
    name: String,
}

impl<B: BlobStore> BlobRemote<B> {
    pub fn new(blobs: Arc<B>) -> Self {
        Self::with_blob_name(blobs, SERVER_SNAPSHOT_BLOB)
    }

    pub fn with_blob_name(blobs: Arc<B>, name: impl Into<String>) -> Self {
        Self {
            blobs,
            name: name.into(),
        }
    }

    pub fn blob_name(&self) -> &str {
        &self.name
    }
}

impl<B: BlobStore> RemoteEndpoint for BlobRemote<B> {
    /// Missing, blank or corrupt snapshots read as an empty collection;
    /// only an unreadable blob is an error.
    async fn fetch_all(&self) -> NoteResult<Vec<Note>> {
        let Some(content) = self.blobs.read(&self.name).await? else {
            return Ok(Vec::new());
        };

        Ok(parse_note_list(&content).unwrap_or_else(|e| {
            tracing::warn!("Serving empty collection, {} is corrupt: {}", self.name, e);
            Vec::new()
        }))
    }

    async fn replace_all(&self, notes: &[Note]) -> NoteResult<()> {
        let content = encode_note_list(notes)?;
        self.blobs.write(&self.name, &content).await
    }
}

/// A remote that can never be reached
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineRemote;

impl RemoteEndpoint for OfflineRemote {
    async fn fetch_all(&self) -> NoteResult<Vec<Note>> {
        Err(NoteError::network("No server configured"))
    }

    async fn replace_all(&self, _notes: &[Note]) -> NoteResult<()> {
        Err(NoteError::network("No server configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::MemoryBlobStore;

    #[tokio::test]
    async fn test_blob_remote_missing_is_empty() {
        let remote = BlobRemote::new(Arc::new(MemoryBlobStore::new()));
        assert!(remote.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blob_remote_corrupt_is_empty() {
        let blobs = Arc::new(MemoryBlobStore::with_blob(SERVER_SNAPSHOT_BLOB, "[{broken"));
        let remote = BlobRemote::new(blobs);
        assert!(remote.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blob_remote_unreadable_is_error() {
        let blobs = Arc::new(MemoryBlobStore::with_blob(SERVER_SNAPSHOT_BLOB, "[]"));
        blobs.set_fail_reads(true);
        let remote = BlobRemote::new(blobs);
        assert!(remote.fetch_all().await.is_err());
    }

    #[tokio::test]
    async fn test_blob_remote_replace_then_fetch() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let remote = BlobRemote::new(blobs.clone());
        let notes = vec![Note::new("a", "1"), Note::new("b", "2")];

        remote.replace_all(&notes).await.unwrap();

        assert_eq!(remote.fetch_all().await.unwrap(), notes);
        assert!(blobs.get(SERVER_SNAPSHOT_BLOB).unwrap().contains("\"updatedAt\""));
    }

    #[tokio::test]
    async fn test_offline_remote_is_unavailable() {
        let err = OfflineRemote.fetch_all().await.unwrap_err();
        assert!(err.is_remote_unavailable());
        let err = OfflineRemote.replace_all(&[]).await.unwrap_err();
        assert!(err.is_remote_unavailable());
    }

    #[tokio::test]
    async fn test_http_remote_unreachable_is_network_error() {
        // Bind then drop a listener to get a port nobody is listening on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let remote =
            HttpRemote::new(&format!("http://{}/", addr), Duration::from_millis(500)).unwrap();
        assert_eq!(remote.base_url(), format!("http://{}", addr));

        let err = remote.fetch_all().await.unwrap_err();
        assert!(matches!(err, NoteError::Network(_)));
        assert!(remote.replace_all(&[]).await.unwrap_err().is_remote_unavailable());
        assert!(remote.health().await.is_err());
    }

    #[test]
    fn test_http_remote_from_config() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::new(Some(temp_dir.path().to_path_buf())).unwrap();
        config.set_server_url("http://10.0.2.2:9000/").unwrap();

        let remote = HttpRemote::from_config(&config).unwrap();
        assert_eq!(remote.base_url(), "http://10.0.2.2:9000");
    }
}
