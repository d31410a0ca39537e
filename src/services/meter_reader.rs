//! Reading extraction through the Gemini `generateContent` API.
//!
//! The model is asked for a JSON array of strings and the first element is
//! taken as the reading. Converting that string into a number is left to
//! [`parse_reading`] so handlers can report unreadable output separately.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::downstream::{DownstreamError, ImagePayload, ensure_success};

const SERVICE: &str = "gemini";
const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const PROMPT: &str = "You are a meter reading expert. Extract the entire numeric value of a gas \
or water meter reading from this image. Explicitly return only the integer numeric value.";

/// Turns a meter photograph into the textual reading shown on the dial.
#[async_trait]
pub trait MeterReader: Send + Sync {
    async fn read(&self, image: &ImagePayload) -> Result<String, DownstreamError>;
}

/// Parse the reading returned by a [`MeterReader`].
pub fn parse_reading(raw: &str) -> Result<i64, DownstreamError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| DownstreamError::UnreadableValue(raw.to_string()))
}

#[derive(Clone)]
pub struct GeminiMeterReader {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl GeminiMeterReader {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DownstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DownstreamError::http(SERVICE))?;
        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Point the client at a different API root, e.g. a regional proxy.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl MeterReader for GeminiMeterReader {
    async fn read(&self, image: &ImagePayload) -> Result<String, DownstreamError> {
        tracing::debug!(model = %self.model, mime = %image.mime, "requesting meter reading");

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateContentRequest::for_image(image))
            .send()
            .await
            .map_err(DownstreamError::http(SERVICE))?;

        let response: GenerateContentResponse = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(DownstreamError::http(SERVICE))?;

        extract_reading(response)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
}

impl<'a> GenerateContentRequest<'a> {
    fn for_image(image: &'a ImagePayload) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![
                    RequestPart::Text { text: PROMPT },
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: &image.mime,
                            data: &image.data,
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: serde_json::json!({
                    "type": "ARRAY",
                    "items": { "type": "STRING" }
                }),
            },
        }
    }
}

#[derive(Deserialize, Debug)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

fn extract_reading(response: GenerateContentResponse) -> Result<String, DownstreamError> {
    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .ok_or_else(|| DownstreamError::response(SERVICE, "no candidates"))?;

    for text in parts.into_iter().filter_map(|part| part.text) {
        let values: Vec<String> = serde_json::from_str(&text)
            .map_err(|err| DownstreamError::response(SERVICE, format!("invalid JSON: {err}")))?;
        if let Some(first) = values.into_iter().next() {
            return Ok(first);
        }
    }

    Err(DownstreamError::response(SERVICE, "no reading in response"))
}
