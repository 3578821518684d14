/// Video-generation orchestration
///
/// Ties the provider adapters and the history store together: submit a
/// job and persist it, check task status, cancel, and run the status
/// poller that reconciles the store as providers finish.

pub mod config;
pub mod poller;

use history::{HistoryError, HistoryItem, HistoryStore, HistoryUpdate, JobStatus};
use providers::{
    GenerationRequest, ProviderError, ProviderKind, ProviderRegistry, StatusReport,
};
use std::sync::Arc;
use thiserror::Error;

pub use config::{GeneratorConfig, PollerConfig};
pub use poller::{Poller, PollerEvent, PollerHandle};

/// Everything the orchestration layer can fail with. Nothing here is
/// fatal; each failure degrades to a `Failed` history entry the user
/// can resubmit.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    History(#[from] HistoryError),

    /// Job ran past the configured wall-clock deadline
    #[error("job exceeded the {0}s deadline")]
    Timeout(u64),

    /// Job was cancelled locally; the provider may keep running it
    #[error("cancelled by user")]
    Cancelled,
}

/// Submission and status facade
pub struct Generator {
    registry: Arc<ProviderRegistry>,
    store: HistoryStore,
    poller_config: PollerConfig,
}

impl Generator {
    pub fn new(registry: ProviderRegistry, store: HistoryStore) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
            poller_config: PollerConfig::default(),
        }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            registry: Arc::new(config.registry()),
            store: config.history_store(),
            poller_config: config.poller,
        }
    }

    /// With polling constants
    pub fn with_poller_config(mut self, poller: PollerConfig) -> Self {
        self.poller_config = poller;
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Submit one generation job.
    ///
    /// Resolves the adapter from the model id, issues a single request
    /// and, on success, appends a `Processing` history item. No
    /// retries; a transient network failure surfaces as
    /// `GenerationError::Provider(Network)` and nothing is persisted.
    pub async fn submit(
        &self,
        request: GenerationRequest,
    ) -> Result<HistoryItem, GenerationError> {
        let provider = self.registry.resolve(&request.model_id)?;
        log::info!(
            "submitting to {}: model={} duration={}s",
            provider.name(),
            request.model_id,
            request.duration_secs
        );

        let submission = provider.submit(&request).await?;

        let item = HistoryItem::new(&request.model_id, provider.kind(), &request.prompt)
            .with_task_id(&submission.task_id);
        self.store.append(item.clone())?;

        log::info!("task {} accepted as history item {}", submission.task_id, item.id);
        Ok(item)
    }

    /// One-shot status check against the provider, no store mutation.
    pub async fn check_status(
        &self,
        provider: ProviderKind,
        task_id: &str,
    ) -> Result<StatusReport, GenerationError> {
        let provider = self.registry.get(provider)?;
        Ok(provider.check_status(task_id).await?)
    }

    /// Cancel a processing item: mark it `Failed` immediately so the
    /// poller stops touching it. No provider-side cancel is issued, so
    /// the remote job may run to completion unobserved.
    pub fn cancel(&self, id: &str) -> Result<HistoryItem, GenerationError> {
        let item = self.store.get(id)?;
        if item.status != JobStatus::Processing {
            return Ok(item);
        }
        let updated = self
            .store
            .update_by_id(id, HistoryUpdate::failed(GenerationError::Cancelled.to_string()))?;
        log::info!("cancelled history item {}", id);
        Ok(updated)
    }

    /// All history, newest first
    pub fn history(&self) -> Result<Vec<HistoryItem>, GenerationError> {
        Ok(self.store.list()?)
    }

    /// Delete one history item
    pub fn delete(&self, id: &str) -> Result<(), GenerationError> {
        Ok(self.store.delete(id)?)
    }

    /// Drop all history
    pub fn clear(&self) -> Result<(), GenerationError> {
        Ok(self.store.clear()?)
    }

    /// Start the status poller over this generator's store and
    /// registry. The returned handle owns the polling task.
    pub fn start_poller(&self) -> PollerHandle {
        Poller::start(
            self.registry.clone(),
            self.store.clone(),
            self.poller_config,
        )
    }
}
