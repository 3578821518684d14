/// Fal AI queue adapter
///
/// Fal queues requests per model path: `POST https://queue.fal.run/{path}`
/// returns a request id, status lives at
/// `GET {path}/requests/{id}/status` and the finished payload at
/// `GET {path}/requests/{id}`. Queue states are
/// `IN_QUEUE | IN_PROGRESS | COMPLETED` (errors surface as a non-2xx
/// status response or an ERROR state).
///
/// The model path that resolved the request is embedded in the task id
/// (`{path}#{request_id}`), so a status check reconstructs the exact
/// endpoint without probing.
use crate::error::ProviderError;
use crate::{
    GenerationRequest, ImagePayload, ProviderKind, StatusReport, Submission, TaskStatus,
    VideoProvider,
};
use base64::Engine;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://queue.fal.run";

/// Fal AI queue adapter
pub struct FalProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl FalProvider {
    /// Create new Fal adapter
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// With custom base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn auth_header(&self) -> String {
        format!("Key {}", self.api_key)
    }

    fn build_body(request: &GenerationRequest) -> FalSubmitRequest {
        let image_url = request.image.as_ref().map(|payload| match payload {
            ImagePayload::Url(url) => url.clone(),
            // Fal accepts data URIs wherever it accepts URLs
            ImagePayload::Bytes(bytes) => format!(
                "data:image/png;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(bytes)
            ),
        });

        FalSubmitRequest {
            prompt: request.prompt.clone(),
            image_url,
            duration: request.duration_secs,
            aspect_ratio: request.aspect_ratio.clone(),
        }
    }

    /// Split a composite task id back into model path and request id.
    fn split_task_id(task_id: &str) -> Result<(&str, &str), ProviderError> {
        task_id.split_once('#').ok_or_else(|| {
            ProviderError::Malformed(format!("fal task id missing model path: {task_id}"))
        })
    }

    /// Fetch the finished payload and pull out the video URL.
    async fn fetch_result(&self, path: &str, request_id: &str) -> Result<Option<String>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/{}/requests/{}", self.base_url, path, request_id))
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ProviderError::http(status, response.text().await?));
        }

        let result: FalResult = response.json().await?;
        Ok(result.video.map(|v| v.url))
    }
}

#[async_trait::async_trait]
impl VideoProvider for FalProvider {
    fn name(&self) -> &str {
        "Fal AI"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Fal
    }

    async fn is_available(&self) -> bool {
        // The queue root rejects unauthenticated requests; any response
        // at all proves reachability, a 401 proves bad credentials.
        self.client
            .get(&self.base_url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map(|r| r.status() != reqwest::StatusCode::UNAUTHORIZED)
            .unwrap_or(false)
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError> {
        let body = Self::build_body(request);

        let response = self
            .client
            .post(format!("{}/{}", self.base_url, request.model_id))
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ProviderError::http(status, response.text().await?));
        }

        let queued: FalQueuedResponse = response.json().await?;

        Ok(Submission {
            task_id: format!("{}#{}", request.model_id, queued.request_id),
            status: TaskStatus::Pending,
        })
    }

    async fn check_status(&self, task_id: &str) -> Result<StatusReport, ProviderError> {
        let (path, request_id) = Self::split_task_id(task_id)?;

        let response = self
            .client
            .get(format!(
                "{}/{}/requests/{}/status",
                self.base_url, path, request_id
            ))
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ProviderError::http(status, response.text().await?));
        }

        let queue_status: FalStatusResponse = response.json().await?;
        let status = map_status(&queue_status.status);

        if status != TaskStatus::Completed {
            return Ok(StatusReport {
                status,
                video_url: None,
                message: queue_status.error,
            });
        }

        // Completed: one more fetch for the payload itself.
        let video_url = self.fetch_result(path, request_id).await?;
        match video_url {
            Some(url) => Ok(StatusReport {
                status: TaskStatus::Completed,
                video_url: Some(url),
                message: None,
            }),
            None => Ok(StatusReport {
                status: TaskStatus::Failed,
                video_url: None,
                message: Some("completed without a video in the payload".to_string()),
            }),
        }
    }
}

/// Map a Fal queue state to the canonical vocabulary.
fn map_status(raw: &str) -> TaskStatus {
    match raw {
        "IN_QUEUE" => TaskStatus::Pending,
        "IN_PROGRESS" => TaskStatus::Processing,
        "COMPLETED" => TaskStatus::Completed,
        "ERROR" | "FAILED" => TaskStatus::Failed,
        _ => TaskStatus::Processing,
    }
}

#[derive(Debug, Serialize)]
struct FalSubmitRequest {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
    duration: u32,
    aspect_ratio: String,
}

#[derive(Debug, Deserialize)]
struct FalQueuedResponse {
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct FalStatusResponse {
    status: String,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FalResult {
    video: Option<FalVideo>,
}

#[derive(Debug, Deserialize)]
struct FalVideo {
    url: String,
}
