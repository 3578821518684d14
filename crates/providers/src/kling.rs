/// Kling video-generation adapter
///
/// Talks to the Kling open API: `POST /v1/videos/text2video` (or
/// `image2video` when a source image is attached) to submit, then
/// `GET /v1/videos/{variant}/{task_id}` to poll. Kling reports task
/// state as `submitted | processing | succeed | failed`.
use crate::error::ProviderError;
use crate::{
    GenerationRequest, ImagePayload, ProviderKind, StatusReport, Submission, TaskStatus,
    VideoProvider,
};
use base64::Engine;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.klingai.com";

/// Kling API adapter
pub struct KlingProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl KlingProvider {
    /// Create new Kling adapter
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

    /// Kling splits text-to-video and image-to-video into separate
    /// endpoints; the variant is part of the status path as well, so it
    /// is prefixed onto the task id we hand back.
    fn variant(request: &GenerationRequest) -> &'static str {
        if request.image.is_some() {
            "image2video"
        } else {
            "text2video"
        }
    }

    fn build_body(request: &GenerationRequest) -> KlingSubmitRequest {
        let image = request.image.as_ref().map(|payload| match payload {
            ImagePayload::Url(url) => url.clone(),
            ImagePayload::Bytes(bytes) => {
                base64::engine::general_purpose::STANDARD.encode(bytes)
            }
        });

        KlingSubmitRequest {
            model_name: request.model_id.clone(),
            prompt: request.prompt.clone(),
            image,
            duration: request.duration_secs.to_string(),
            aspect_ratio: request.aspect_ratio.clone(),
            external_task_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[async_trait::async_trait]
impl VideoProvider for KlingProvider {
    fn name(&self) -> &str {
        "Kling"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Kling
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/account/costs", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError> {
        let variant = Self::variant(request);
        let body = Self::build_body(request);

        let response = self
            .client
            .post(format!("{}/v1/videos/{}", self.base_url, variant))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ProviderError::http(status, response.text().await?));
        }

        let envelope: KlingEnvelope = response.json().await?;
        let data = envelope.into_data()?;

        Ok(Submission {
            task_id: format!("{}:{}", variant, data.task_id),
            status: TaskStatus::Pending,
        })
    }

    async fn check_status(&self, task_id: &str) -> Result<StatusReport, ProviderError> {
        let (variant, raw_id) = task_id.split_once(':').ok_or_else(|| {
            ProviderError::Malformed(format!("kling task id missing variant: {task_id}"))
        })?;

        let response = self
            .client
            .get(format!("{}/v1/videos/{}/{}", self.base_url, variant, raw_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ProviderError::http(status, response.text().await?));
        }

        let envelope: KlingEnvelope = response.json().await?;
        let data = envelope.into_data()?;

        Ok(data.into_report())
    }
}

/// Map a Kling task status string to the canonical vocabulary.
/// Unknown strings are treated as still in flight rather than failed.
fn map_status(raw: &str) -> TaskStatus {
    match raw {
        "submitted" => TaskStatus::Pending,
        "processing" => TaskStatus::Processing,
        "succeed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        _ => TaskStatus::Processing,
    }
}

#[derive(Debug, Serialize)]
struct KlingSubmitRequest {
    model_name: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    duration: String,
    aspect_ratio: String,
    external_task_id: String,
}

/// Kling wraps every payload in `{code, message, data}`; `code == 0`
/// means success even on HTTP 200.
#[derive(Debug, Deserialize)]
struct KlingEnvelope {
    code: i64,
    message: Option<String>,
    data: Option<KlingTaskData>,
}

impl KlingEnvelope {
    fn into_data(self) -> Result<KlingTaskData, ProviderError> {
        if self.code != 0 {
            return Err(ProviderError::Provider {
                code: self.code.to_string(),
                message: self.message.unwrap_or_default(),
            });
        }
        self.data
            .ok_or_else(|| ProviderError::Malformed("kling envelope without data".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct KlingTaskData {
    task_id: String,
    task_status: String,
    task_status_msg: Option<String>,
    task_result: Option<KlingTaskResult>,
}

impl KlingTaskData {
    fn into_report(self) -> StatusReport {
        let video_url = self
            .task_result
            .and_then(|r| r.videos.into_iter().next())
            .map(|v| v.url);

        StatusReport {
            status: map_status(&self.task_status),
            video_url,
            message: self.task_status_msg,
        }
    }
}

#[derive(Debug, Deserialize)]
struct KlingTaskResult {
    #[serde(default)]
    videos: Vec<KlingVideo>,
}

#[derive(Debug, Deserialize)]
struct KlingVideo {
    url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_status("submitted"), TaskStatus::Pending);
        assert_eq!(map_status("processing"), TaskStatus::Processing);
        assert_eq!(map_status("succeed"), TaskStatus::Completed);
        assert_eq!(map_status("failed"), TaskStatus::Failed);
        // Unknown strings keep the job alive instead of failing it
        assert_eq!(map_status("queued_somewhere"), TaskStatus::Processing);
    }

    #[test]
    fn test_variant_selection() {
        let text = GenerationRequest::new("kling-2.5-turbo", "sunset");
        assert_eq!(KlingProvider::variant(&text), "text2video");

        let image = text
            .clone()
            .with_image(ImagePayload::Url("https://example.com/a.png".to_string()));
        assert_eq!(KlingProvider::variant(&image), "image2video");
    }

    #[test]
    fn test_envelope_error_code() {
        let envelope: KlingEnvelope = serde_json::from_str(
            r#"{"code": 1102, "message": "insufficient balance", "data": null}"#,
        )
        .unwrap();

        match envelope.into_data() {
            Err(ProviderError::Provider { code, message }) => {
                assert_eq!(code, "1102");
                assert_eq!(message, "insufficient balance");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[test]
    fn test_completed_report() {
        let envelope: KlingEnvelope = serde_json::from_str(
            r#"{
                "code": 0,
                "message": "SUCCEED",
                "data": {
                    "task_id": "abc123",
                    "task_status": "succeed",
                    "task_result": {"videos": [{"url": "https://cdn.kling.test/abc123.mp4"}]}
                }
            }"#,
        )
        .unwrap();

        let report = envelope.into_data().unwrap().into_report();
        assert_eq!(report.status, TaskStatus::Completed);
        assert_eq!(
            report.video_url.as_deref(),
            Some("https://cdn.kling.test/abc123.mp4")
        );
    }

    #[test]
    fn test_image_payload_encoding() {
        let request = GenerationRequest::new("kling-2.5-turbo", "sunset")
            .with_image(ImagePayload::Bytes(vec![1, 2, 3]));
        let body = KlingProvider::build_body(&request);
        assert_eq!(body.image.as_deref(), Some("AQID"));
        assert_eq!(body.duration, "5");
    }
}
