//! Note server implementation using Axum.
//!
//! This module exposes a blob-backed collection over HTTP so that a second
//! device can sync against it:
//! - GET /notes - The full collection as a JSON array
//! - POST /notes - Replace the full collection
//! - GET /health - Liveness check
//!
//! The server has no merge logic of its own: every POST replaces the stored
//! collection, and all conflict resolution happens in the clients.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::blob_store::BlobStore;
use crate::error::{NoteError, NoteResult};
use crate::models::Note;
use crate::remote::{BlobRemote, HealthResponse, RemoteEndpoint, ReplaceResponse};

/// Shared server state
struct AppState<B: BlobStore> {
    notes: BlobRemote<B>,
}

// Route handlers

async fn get_notes<B: BlobStore>(State(state): State<Arc<AppState<B>>>) -> impl IntoResponse {
    match state.notes.fetch_all().await {
        Ok(notes) => {
            tracing::debug!("GET /notes -> {} notes", notes.len());
            (StatusCode::OK, Json(notes)).into_response()
        }
        Err(e) => {
            // An unreadable snapshot is served like a missing one
            tracing::error!("Failed to read {}: {}", state.notes.blob_name(), e);
            (StatusCode::OK, Json(Vec::<Note>::new())).into_response()
        }
    }
}

async fn replace_notes<B: BlobStore>(
    State(state): State<Arc<AppState<B>>>,
    Json(notes): Json<Vec<Note>>,
) -> impl IntoResponse {
    tracing::debug!("POST /notes with {} notes", notes.len());

    match state.notes.replace_all(&notes).await {
        Ok(()) => (StatusCode::OK, Json(ReplaceResponse { success: true })),
        Err(e) => {
            tracing::error!("Failed to save {}: {}", state.notes.blob_name(), e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ReplaceResponse { success: false }),
            )
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Create the note server router backed by `notes`
pub fn create_router<B: BlobStore>(notes: BlobRemote<B>) -> Router {
    let state = Arc::new(AppState { notes });

    Router::new()
        .route("/notes", get(get_notes::<B>).post(replace_notes::<B>))
        .route("/health", get(health))
        .with_state(state)
}

/// Handle to a running server
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<NoteResult<()>>,
}

impl ServerHandle {
    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL for clients on this machine
    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Stop accepting connections and wait for in-flight requests
    pub async fn shutdown(mut self) -> NoteResult<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        (&mut self.task)
            .await
            .map_err(|e| NoteError::Network(format!("Server task failed: {}", e)))?
    }

    /// Run until the server stops on its own
    pub async fn wait(mut self) -> NoteResult<()> {
        (&mut self.task)
            .await
            .map_err(|e| NoteError::Network(format!("Server task failed: {}", e)))?
    }
}

/// Start the note server on `addr` in a background task
pub async fn start_server<B: BlobStore>(
    notes: BlobRemote<B>,
    addr: SocketAddr,
) -> NoteResult<ServerHandle> {
    let router = create_router(notes);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| NoteError::Network(format!("Cannot bind {}: {}", addr, e)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| NoteError::Network(e.to_string()))?;

    tracing::info!("Starting note server on {}", local_addr);

    let (tx, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                rx.await.ok();
            })
            .await
            .map_err(|e| NoteError::Network(e.to_string()))?;
        tracing::info!("Note server on {} stopped", local_addr);
        Ok(())
    });

    Ok(ServerHandle {
        local_addr,
        shutdown: Some(tx),
        task,
    })
}

/// Start the note server on all interfaces at `port`
pub async fn start_server_on_port<B: BlobStore>(
    notes: BlobRemote<B>,
    port: u16,
) -> NoteResult<ServerHandle> {
    start_server(notes, SocketAddr::from(([0, 0, 0, 0], port))).await
}
