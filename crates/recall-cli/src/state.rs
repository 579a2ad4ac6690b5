//! Application state wiring the engine to concrete infra implementations.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::OwnedMutexGuard;

use recall_core::engine::{ContextEngine, EngineParts};
use recall_core::llm::retry::{RetryPolicy, RetryingEmbedder};
use recall_core::memory::box_embedder::BoxEmbedder;
use recall_core::memory::box_index::BoxVectorIndex;
use recall_core::runtime::session_lock::SessionLocks;
use recall_core::storage::archive::BoxSessionArchive;
use recall_core::storage::box_document::BoxDocumentStore;
use recall_infra::archive::FileSessionArchive;
use recall_infra::config::{load_engine_config, resolve_data_dir};
use recall_infra::document::JsonFileStore;
use recall_infra::embedder::{HashingEmbedder, DEFAULT_DIMENSION};
use recall_infra::vector::lance::{LanceVectorIndex, LanceVectorStore};
use recall_infra::vector::memory::InMemoryVectorIndex;

/// How long background tasks get to finish when a command exits.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The opened engine plus where its state lives.
pub struct AppState {
    pub engine: ContextEngine,
    pub data_dir: PathBuf,
    pub ephemeral: bool,
    locks: SessionLocks,
    // Keeps the throwaway directory alive until exit.
    _scratch: Option<tempfile::TempDir>,
}

impl AppState {
    /// Open the engine against `data_dir`, or a temporary directory with an
    /// in-memory index when `ephemeral` is set.
    pub async fn init(data_dir: Option<PathBuf>, ephemeral: bool) -> anyhow::Result<Self> {
        let (data_dir, scratch) = if ephemeral {
            let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
            (scratch.path().to_path_buf(), Some(scratch))
        } else {
            (data_dir.unwrap_or_else(resolve_data_dir), None)
        };

        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let config = load_engine_config(&data_dir).await;

        let index = if ephemeral {
            BoxVectorIndex::new(InMemoryVectorIndex::new())
        } else {
            let store = LanceVectorStore::new(data_dir.join("vectors"))
                .await
                .context("Failed to open vector store")?;
            BoxVectorIndex::new(LanceVectorIndex::open(&store, DEFAULT_DIMENSION).await?)
        };

        let embedder = RetryingEmbedder::new(
            HashingEmbedder::new(DEFAULT_DIMENSION),
            RetryPolicy::from_config(&config.retry),
        );

        let parts = EngineParts {
            index,
            embedder: BoxEmbedder::new(embedder),
            generator: None,
            graph_store: BoxDocumentStore::new(JsonFileStore::new(data_dir.join("graph.json"))),
            working_store: BoxDocumentStore::new(JsonFileStore::new(data_dir.join("working.json"))),
            archive: BoxSessionArchive::new(FileSessionArchive::new(data_dir.join("sessions.json"))),
        };

        tracing::info!(data_dir = %data_dir.display(), ephemeral, "opening context engine");
        let engine = ContextEngine::open(parts, config, Utc::now()).await;

        Ok(Self {
            engine,
            data_dir,
            ephemeral,
            locks: SessionLocks::new(),
            _scratch: scratch,
        })
    }

    /// Hold for the whole of a command that reads or changes the current
    /// session, so at most one turn per session runs at a time.
    pub async fn lock_turn(&self) -> OwnedMutexGuard<()> {
        let session_id = self.engine.session_id().await;
        self.locks.acquire(&session_id).await
    }

    /// Let background work finish, then stop it and persist engine state.
    pub async fn close(self) -> anyhow::Result<()> {
        tracing::debug!(
            background_tasks = self.engine.supervisor().len(),
            "shutting down context engine"
        );
        self.engine.settle(SHUTDOWN_GRACE).await;
        self.engine
            .shutdown(SHUTDOWN_GRACE, Utc::now())
            .await
            .context("Failed to persist engine state")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_types::working::Role;

    #[tokio::test]
    async fn test_turn_lock_is_exclusive_per_session() {
        let state = AppState::init(None, true).await.unwrap();
        let held = state.lock_turn().await;
        let session_id = state.engine.session_id().await;
        assert!(state.locks.try_acquire(&session_id).is_none());
        drop(held);
        assert!(state.locks.try_acquire(&session_id).is_some());
        assert_eq!(state.locks.prune_idle(), 1);
        state.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_user_turn_reaches_graph_before_close() {
        let state = AppState::init(None, true).await.unwrap();
        state
            .engine
            .add_message(Role::User, "Planning a trip to Lisbon with Maria Silva", Utc::now())
            .await;
        state.engine.settle(SHUTDOWN_GRACE).await;

        let graph = state.engine.graph().read();
        assert!(graph.entity("lisbon").is_some());
        assert!(graph.entity("maria_silva").is_some());
        drop(graph);
        state.close().await.unwrap();
    }
}
