/// Provider adapters for third-party video-generation APIs
///
/// Provides a unified interface over the supported vendors:
/// - Kling (text-to-video / image-to-video)
/// - Google Veo (long-running operations API)
/// - Fal AI (queue API)
///
/// Each adapter translates one vendor's wire format into the canonical
/// request/status shapes and a tagged error type. Adapters never retry;
/// a call is a single request attempt.

pub mod error;
pub mod fal;
pub mod kling;
pub mod veo;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub use error::ProviderError;
pub use fal::FalProvider;
pub use kling::KlingProvider;
pub use veo::VeoProvider;

/// Provider identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Kling video generation
    Kling,
    /// Google Veo
    Veo,
    /// Fal AI queue
    Fal,
}

impl ProviderKind {
    /// Route a model identifier to its provider by prefix.
    ///
    /// `kling-*` is Kling, `veo-*` is Google Veo, `fal-*` (including
    /// full `fal-ai/...` queue paths) is Fal AI.
    pub fn for_model(model_id: &str) -> Result<Self, ProviderError> {
        if model_id.starts_with("kling") {
            Ok(Self::Kling)
        } else if model_id.starts_with("veo") {
            Ok(Self::Veo)
        } else if model_id.starts_with("fal") {
            Ok(Self::Fal)
        } else {
            Err(ProviderError::UnknownModel(model_id.to_string()))
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kling => write!(f, "kling"),
            Self::Veo => write!(f, "veo"),
            Self::Fal => write!(f, "fal"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kling" => Ok(Self::Kling),
            "veo" | "google-veo" => Ok(Self::Veo),
            "fal" | "fal-ai" => Ok(Self::Fal),
            other => Err(ProviderError::UnknownModel(other.to_string())),
        }
    }
}

/// Canonical task state shared by all providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Accepted by the provider, not started
    Pending,
    /// Generation in progress
    Processing,
    /// Finished with output media
    Completed,
    /// Finished without output
    Failed,
}

impl TaskStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Image payload attached to an image-to-video request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ImagePayload {
    /// Publicly reachable URL the provider fetches itself
    Url(String),
    /// Raw bytes, inlined as base64 for vendors that require it
    Bytes(Vec<u8>),
}

/// One video-generation request in canonical form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier, e.g. `kling-2.5-turbo` or `fal-ai/minimax-video`
    pub model_id: String,

    /// Free-text prompt
    pub prompt: String,

    /// Optional source image for image-to-video
    pub image: Option<ImagePayload>,

    /// Clip duration in seconds
    pub duration_secs: u32,

    /// Aspect ratio, e.g. `16:9`
    pub aspect_ratio: String,
}

impl GenerationRequest {
    /// New text-to-video request with default duration and aspect ratio
    pub fn new(model_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: prompt.into(),
            image: None,
            duration_secs: 5,
            aspect_ratio: "16:9".to_string(),
        }
    }

    /// With a source image
    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.image = Some(image);
        self
    }

    /// With clip duration in seconds
    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    /// With aspect ratio
    pub fn with_aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.aspect_ratio = ratio.into();
        self
    }
}

/// Result of a successful job submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// Provider-issued task identifier
    pub task_id: String,

    /// State reported at submission time (normally `Pending`)
    pub status: TaskStatus,
}

/// Result of one status check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    /// Canonical state
    pub status: TaskStatus,

    /// Final media URL, present once `Completed`
    pub video_url: Option<String>,

    /// Provider-supplied failure detail, if any
    pub message: Option<String>,
}

impl StatusReport {
    pub fn processing() -> Self {
        Self {
            status: TaskStatus::Processing,
            video_url: None,
            message: None,
        }
    }
}

/// Video generation provider trait
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Provider display name
    fn name(&self) -> &str;

    /// Provider identity
    fn kind(&self) -> ProviderKind;

    /// Cheap reachability/credential probe
    async fn is_available(&self) -> bool;

    /// Submit one generation job. Single attempt, no retries.
    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError>;

    /// Query the state of a previously submitted job.
    async fn check_status(&self, task_id: &str) -> Result<StatusReport, ProviderError>;
}

/// Registry of configured providers, keyed by model-id prefix
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn VideoProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one of the same kind
    pub fn register(&mut self, provider: Arc<dyn VideoProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    /// Look up a provider by kind
    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn VideoProvider>, ProviderError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(ProviderError::MissingCredentials(kind))
    }

    /// Resolve the provider responsible for a model identifier
    pub fn resolve(&self, model_id: &str) -> Result<Arc<dyn VideoProvider>, ProviderError> {
        let kind = ProviderKind::for_model(model_id)?;
        self.get(kind)
    }

    /// All registered providers
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn VideoProvider>> {
        self.providers.values()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_routing() {
        assert_eq!(
            ProviderKind::for_model("kling-2.5-turbo").unwrap(),
            ProviderKind::Kling
        );
        assert_eq!(
            ProviderKind::for_model("veo-3.0-generate-001").unwrap(),
            ProviderKind::Veo
        );
        assert_eq!(
            ProviderKind::for_model("fal-ai/minimax-video").unwrap(),
            ProviderKind::Fal
        );
        assert!(matches!(
            ProviderKind::for_model("sora-2"),
            Err(ProviderError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_request_builder() {
        let request = GenerationRequest::new("kling-2.5-turbo", "sunset")
            .with_duration(10)
            .with_aspect_ratio("9:16");

        assert_eq!(request.model_id, "kling-2.5-turbo");
        assert_eq!(request.duration_secs, 10);
        assert_eq!(request.aspect_ratio, "9:16");
        assert!(request.image.is_none());
    }

    #[test]
    fn test_registry_without_credentials() {
        let registry = ProviderRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.resolve("kling-2.5-turbo"),
            Err(ProviderError::MissingCredentials(ProviderKind::Kling))
        ));
    }
}
