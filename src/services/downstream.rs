use thiserror::Error;

/// Failure of an external collaborator (vision API, image hosting).
#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("{service} request failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} returned status {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} returned an unexpected response: {reason}")]
    Response {
        service: &'static str,
        reason: String,
    },
    #[error("meter reading `{0}` is not an integer")]
    UnreadableValue(String),
}

impl DownstreamError {
    pub(crate) fn http(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Http { service, source }
    }

    pub(crate) fn response(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Response {
            service,
            reason: reason.into(),
        }
    }
}

/// Turn a non-success response into [`DownstreamError::Status`].
pub(crate) async fn ensure_success(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, DownstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DownstreamError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

/// Raw image as received from the client: base64 data plus its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub data: String,
    pub mime: String,
}

impl ImagePayload {
    pub const DEFAULT_MIME: &'static str = "image/jpeg";

    pub fn new(data: impl Into<String>, mime: Option<String>) -> Self {
        let mime = mime
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_MIME.to_string());
        Self {
            data: data.into(),
            mime,
        }
    }
}
