/// Tagged provider error taxonomy
///
/// Every adapter failure is one of these variants; callers classify by
/// matching on the variant, never on message text.
use crate::ProviderKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request never produced a usable response (DNS, connect, abort)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Provider answered with an error status or error body
    #[error("provider error {code}: {message}")]
    Provider { code: String, message: String },

    /// Response arrived but did not have the expected shape
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// No adapter handles this model identifier
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Provider is known but was not configured with credentials
    #[error("no credentials configured for provider '{0}'")]
    MissingCredentials(ProviderKind),
}

impl ProviderError {
    /// Build a `Provider` variant from an HTTP status and body text.
    pub(crate) fn http(status: reqwest::StatusCode, body: String) -> Self {
        Self::Provider {
            code: status.as_u16().to_string(),
            message: body,
        }
    }

    /// Transient failures worth resubmitting; everything else is a
    /// request or configuration problem.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Provider { code, .. } => {
                matches!(code.as_str(), "429" | "500" | "502" | "503" | "504")
            }
            Self::Malformed(_) | Self::UnknownModel(_) | Self::MissingCredentials(_) => false,
        }
    }
}
