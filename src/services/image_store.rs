//! Durable storage for meter photographs.
//!
//! Two stores exist: [`InlineImageStore`] keeps the base64 payload itself as
//! the reference, [`CloudinaryImageStore`] uploads to Cloudinary and keeps
//! the hosted URL.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;

use super::downstream::{DownstreamError, ImagePayload, ensure_success};

const SERVICE: &str = "cloudinary";
const DEFAULT_ENDPOINT: &str = "https://api.cloudinary.com/v1_1";

/// Result of storing an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// Value written to the measurement's `image` field.
    pub reference: String,
    /// Store-specific handle needed to remove the image again.
    pub handle: Option<String>,
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn store(&self, image: &ImagePayload) -> Result<StoredImage, DownstreamError>;

    /// Remove a previously stored image.
    async fn discard(&self, stored: &StoredImage) -> Result<(), DownstreamError>;
}

/// Keeps images inside the measurement record as base64.
#[derive(Debug, Clone, Default)]
pub struct InlineImageStore;

#[async_trait]
impl ImageStore for InlineImageStore {
    async fn store(&self, image: &ImagePayload) -> Result<StoredImage, DownstreamError> {
        Ok(StoredImage {
            reference: image.data.clone(),
            handle: None,
        })
    }

    async fn discard(&self, _stored: &StoredImage) -> Result<(), DownstreamError> {
        Ok(())
    }
}

/// Signed uploads to a Cloudinary account.
#[derive(Clone)]
pub struct CloudinaryImageStore {
    client: reqwest::Client,
    endpoint: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryImageStore {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DownstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DownstreamError::http(SERVICE))?;
        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        })
    }

    fn url(&self, action: &str) -> String {
        format!("{}/{}/image/{}", self.endpoint, self.cloud_name, action)
    }

    fn sign(&self, params: &[(&str, &str)]) -> String {
        sign_params(params, &self.api_secret)
    }
}

#[async_trait]
impl ImageStore for CloudinaryImageStore {
    async fn store(&self, image: &ImagePayload) -> Result<StoredImage, DownstreamError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[("timestamp", timestamp.as_str())]);
        let file = format!("data:{};base64,{}", image.mime, image.data);

        let response = self
            .client
            .post(self.url("upload"))
            .form(&[
                ("file", file.as_str()),
                ("api_key", self.api_key.as_str()),
                ("timestamp", timestamp.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await
            .map_err(DownstreamError::http(SERVICE))?;

        let uploaded: UploadResponse = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(DownstreamError::http(SERVICE))?;

        tracing::info!(public_id = %uploaded.public_id, "image uploaded");

        Ok(StoredImage {
            reference: uploaded.secure_url,
            handle: Some(uploaded.public_id),
        })
    }

    async fn discard(&self, stored: &StoredImage) -> Result<(), DownstreamError> {
        let Some(public_id) = stored.handle.as_deref() else {
            return Ok(());
        };
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", timestamp.as_str())]);

        let response = self
            .client
            .post(self.url("destroy"))
            .form(&[
                ("public_id", public_id),
                ("api_key", self.api_key.as_str()),
                ("timestamp", timestamp.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await
            .map_err(DownstreamError::http(SERVICE))?;

        let destroyed: DestroyResponse = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(DownstreamError::http(SERVICE))?;

        if destroyed.result != "ok" && destroyed.result != "not found" {
            return Err(DownstreamError::response(
                SERVICE,
                format!("destroy returned `{}`", destroyed.result),
            ));
        }
        Ok(())
    }
}

/// Cloudinary request signature: parameters sorted by name, joined as
/// `k=v&k=v`, suffixed with the API secret and hashed with SHA-256.
fn sign_params(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inline_store_keeps_payload() {
        let store = InlineImageStore;
        let image = ImagePayload::new("aGVsbG8=", None);

        let stored = store.store(&image).await.unwrap();
        assert_eq!(stored.reference, "aGVsbG8=");
        assert!(stored.handle.is_none());
        assert!(store.discard(&stored).await.is_ok());
    }

    #[test]
    fn test_sign_params_sorted() {
        let a = sign_params(&[("timestamp", "1315060510"), ("public_id", "sample")], "abcd");
        let b = sign_params(&[("public_id", "sample"), ("timestamp", "1315060510")], "abcd");

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sign_params_known_value() {
        let mut hasher = Sha256::new();
        hasher.update(b"public_id=sample&timestamp=1315060510abcd");
        let expected = hex::encode(hasher.finalize());

        assert_eq!(
            sign_params(&[("timestamp", "1315060510"), ("public_id", "sample")], "abcd"),
            expected
        );
    }

    #[test]
    fn test_sign_params_depends_on_secret() {
        let params = [("timestamp", "1315060510")];
        assert_ne!(sign_params(&params, "one"), sign_params(&params, "two"));
    }

    #[test]
    fn test_default_mime() {
        assert_eq!(ImagePayload::new("x", None).mime, "image/jpeg");
        assert_eq!(ImagePayload::new("x", Some("  ".into())).mime, "image/jpeg");
        assert_eq!(ImagePayload::new("x", Some("image/png".into())).mime, "image/png");
    }
}
