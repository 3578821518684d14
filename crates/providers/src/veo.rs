/// Google Veo adapter
///
/// Veo runs behind the Generative Language API as a long-running
/// operation: `POST /v1beta/models/{model}:predictLongRunning` returns
/// an operation name, and `GET /v1beta/{operation}` reports `done`
/// plus either a response payload or an error object. The operation
/// name is the task id.
use crate::error::ProviderError;
use crate::{
    GenerationRequest, ImagePayload, ProviderKind, StatusReport, Submission, TaskStatus,
    VideoProvider,
};
use base64::Engine;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Veo adapter
pub struct VeoProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl VeoProvider {
    /// Create new Veo adapter
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

    fn build_body(request: &GenerationRequest) -> VeoSubmitRequest {
        let image = request.image.as_ref().map(|payload| match payload {
            ImagePayload::Url(url) => VeoImage {
                image_uri: Some(url.clone()),
                bytes_base64_encoded: None,
            },
            ImagePayload::Bytes(bytes) => VeoImage {
                image_uri: None,
                bytes_base64_encoded: Some(
                    base64::engine::general_purpose::STANDARD.encode(bytes),
                ),
            },
        });

        VeoSubmitRequest {
            instances: vec![VeoInstance {
                prompt: request.prompt.clone(),
                image,
            }],
            parameters: VeoParameters {
                aspect_ratio: request.aspect_ratio.clone(),
                duration_seconds: request.duration_secs,
            },
        }
    }
}

#[async_trait::async_trait]
impl VideoProvider for VeoProvider {
    fn name(&self) -> &str {
        "Google Veo"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Veo
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/models", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError> {
        let body = Self::build_body(request);

        let response = self
            .client
            .post(format!(
                "{}/models/{}:predictLongRunning",
                self.base_url, request.model_id
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ProviderError::http(status, response.text().await?));
        }

        let operation: VeoOperation = response.json().await?;
        let name = operation
            .name
            .ok_or_else(|| ProviderError::Malformed("operation without name".to_string()))?;

        Ok(Submission {
            task_id: name,
            status: TaskStatus::Pending,
        })
    }

    async fn check_status(&self, task_id: &str) -> Result<StatusReport, ProviderError> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, task_id))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ProviderError::http(status, response.text().await?));
        }

        let operation: VeoOperation = response.json().await?;
        Ok(operation.into_report())
    }
}

#[derive(Debug, Serialize)]
struct VeoSubmitRequest {
    instances: Vec<VeoInstance>,
    parameters: VeoParameters,
}

#[derive(Debug, Serialize)]
struct VeoInstance {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<VeoImage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VeoImage {
    #[serde(skip_serializing_if = "Option::is_none")]
    image_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes_base64_encoded: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VeoParameters {
    aspect_ratio: String,
    duration_seconds: u32,
}

/// Long-running operation envelope. `done == false` means the job is
/// still in flight; once done there is either a response or an error.
#[derive(Debug, Deserialize)]
struct VeoOperation {
    name: Option<String>,
    #[serde(default)]
    done: bool,
    response: Option<VeoOperationResponse>,
    error: Option<VeoOperationError>,
}

impl VeoOperation {
    fn into_report(self) -> StatusReport {
        if !self.done {
            return StatusReport::processing();
        }

        if let Some(error) = self.error {
            return StatusReport {
                status: TaskStatus::Failed,
                video_url: None,
                message: Some(error.message),
            };
        }

        let video_url = self
            .response
            .and_then(|r| r.generate_video_response)
            .and_then(|r| r.generated_samples.into_iter().next())
            .map(|s| s.video.uri);

        match video_url {
            Some(url) => StatusReport {
                status: TaskStatus::Completed,
                video_url: Some(url),
                message: None,
            },
            // Done without output or error: treat as failed rather
            // than polling forever.
            None => StatusReport {
                status: TaskStatus::Failed,
                video_url: None,
                message: Some("operation finished without output".to_string()),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VeoOperationResponse {
    generate_video_response: Option<VeoVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VeoVideoResponse {
    #[serde(default)]
    generated_samples: Vec<VeoSample>,
}

#[derive(Debug, Deserialize)]
struct VeoSample {
    video: VeoVideo,
}

#[derive(Debug, Deserialize)]
struct VeoVideo {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct VeoOperationError {
    #[allow(dead_code)]
    code: Option<i64>,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_operation() {
        let op: VeoOperation =
            serde_json::from_str(r#"{"name": "models/veo-3/operations/op1", "done": false}"#)
                .unwrap();
        let report = op.into_report();
        assert_eq!(report.status, TaskStatus::Processing);
        assert!(report.video_url.is_none());
    }

    #[test]
    fn test_completed_operation() {
        let op: VeoOperation = serde_json::from_str(
            r#"{
                "name": "models/veo-3/operations/op1",
                "done": true,
                "response": {
                    "generateVideoResponse": {
                        "generatedSamples": [
                            {"video": {"uri": "https://storage.test/op1.mp4"}}
                        ]
                    }
                }
            }"#,
        )
        .unwrap();

        let report = op.into_report();
        assert_eq!(report.status, TaskStatus::Completed);
        assert_eq!(report.video_url.as_deref(), Some("https://storage.test/op1.mp4"));
    }

    #[test]
    fn test_failed_operation() {
        let op: VeoOperation = serde_json::from_str(
            r#"{
                "name": "models/veo-3/operations/op1",
                "done": true,
                "error": {"code": 3, "message": "prompt rejected"}
            }"#,
        )
        .unwrap();

        let report = op.into_report();
        assert_eq!(report.status, TaskStatus::Failed);
        assert_eq!(report.message.as_deref(), Some("prompt rejected"));
    }

    #[test]
    fn test_done_without_output_fails() {
        let op: VeoOperation =
            serde_json::from_str(r#"{"name": "models/veo-3/operations/op1", "done": true}"#)
                .unwrap();
        assert_eq!(op.into_report().status, TaskStatus::Failed);
    }

    #[test]
    fn test_submit_body_shape() {
        let request = GenerationRequest::new("veo-3.0-generate-001", "sunset over water")
            .with_duration(8)
            .with_aspect_ratio("16:9");
        let body = VeoProvider::build_body(&request);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["instances"][0]["prompt"], "sunset over water");
        assert_eq!(json["parameters"]["durationSeconds"], 8);
        assert_eq!(json["parameters"]["aspectRatio"], "16:9");
    }
}
