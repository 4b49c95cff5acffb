//! Hosted image storage.
//!
//! Uploads accept whatever the host accepts as a source (a remote URL or a
//! `data:` URI). Images are retired by public id, which the host derives from
//! the last path segment of the delivery URL.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::CloudinaryConfig;
use crate::core::helpers::new_id;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media host request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("media host rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedImage {
    pub url: String,
    pub public_id: String,
}

#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn upload(&self, source: &str) -> Result<HostedImage, MediaError>;
    async fn destroy(&self, public_id: &str) -> Result<(), MediaError>;
}

/// `https://res.cloudinary.com/demo/image/upload/v1/abc123.png` -> `abc123`.
pub fn public_id_from_url(url: &str) -> Option<&str> {
    let last = url.trim_end_matches('/').rsplit('/').next()?;
    let id = last.split('.').next()?;
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Retires a previously hosted image by its delivery URL. A URL that carries no
/// recognisable public id is skipped.
pub async fn retire(media: &dyn MediaHost, url: &str) -> Result<(), MediaError> {
    match public_id_from_url(url) {
        Some(public_id) => media.destroy(public_id).await,
        None => {
            warn!(url = %url, "Hosted image URL has no public id, skipping destroy");
            Ok(())
        }
    }
}

// === Cloudinary ===

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

pub struct CloudinaryHost {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryHost {
    pub fn new(config: CloudinaryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/{}",
            self.config.cloud_name, action
        )
    }

    async fn signed_post(
        &self,
        action: &str,
        mut params: Vec<(&'static str, String)>,
        unsigned: Vec<(&'static str, String)>,
    ) -> Result<reqwest::Response, MediaError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        params.push(("timestamp", timestamp));
        let signature = sign_params(&params, &self.config.api_secret);

        params.extend(unsigned);
        params.push(("api_key", self.config.api_key.clone()));
        params.push(("signature", signature));

        let response = self
            .client
            .post(self.endpoint(action))
            .form(&params)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error.message,
            Err(_) => "no error message".to_string(),
        };
        Err(MediaError::Rejected { status, message })
    }
}

/// Cloudinary request signature: SHA-1 over the sorted `key=value` pairs joined
/// by `&`, followed by the API secret.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl MediaHost for CloudinaryHost {
    async fn upload(&self, source: &str) -> Result<HostedImage, MediaError> {
        let response = self
            .signed_post("upload", Vec::new(), vec![("file", source.to_string())])
            .await?;
        let uploaded: UploadResponse = response.json().await?;
        info!(public_id = %uploaded.public_id, "Uploaded image");
        Ok(HostedImage {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<(), MediaError> {
        self.signed_post(
            "destroy",
            vec![("public_id", public_id.to_string())],
            Vec::new(),
        )
        .await?;
        info!(public_id = %public_id, "Destroyed image");
        Ok(())
    }
}

// === In-memory host ===

#[derive(Default)]
struct Ledger {
    uploaded: Vec<HostedImage>,
    destroyed: Vec<String>,
}

/// Keeps uploads in memory. Used when no media host is configured and in tests.
#[derive(Default)]
pub struct MemoryMediaHost {
    ledger: Mutex<Ledger>,
}

impl MemoryMediaHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploaded(&self) -> Vec<HostedImage> {
        self.ledger.lock().uploaded.clone()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.ledger.lock().destroyed.clone()
    }
}

#[async_trait]
impl MediaHost for MemoryMediaHost {
    async fn upload(&self, _source: &str) -> Result<HostedImage, MediaError> {
        let public_id = new_id();
        let image = HostedImage {
            url: format!("https://media.invalid/flock/{}.png", public_id),
            public_id,
        };
        self.ledger.lock().uploaded.push(image.clone());
        Ok(image)
    }

    async fn destroy(&self, public_id: &str) -> Result<(), MediaError> {
        self.ledger.lock().destroyed.push(public_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_public_id() {
        assert_eq!(
            public_id_from_url("https://res.cloudinary.com/demo/image/upload/v1712/abc123.png"),
            Some("abc123")
        );
        assert_eq!(public_id_from_url("https://host/img/xyz"), Some("xyz"));
        assert_eq!(public_id_from_url("https://host/img/.png"), None);
    }

    #[test]
    fn signature_sorts_params() {
        let a = sign_params(
            &[("timestamp", "1315060510".to_string()), ("public_id", "sample".to_string())],
            "abcd",
        );
        let b = sign_params(
            &[("public_id", "sample".to_string()), ("timestamp", "1315060510".to_string())],
            "abcd",
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);

        let mut hasher = Sha1::new();
        hasher.update(b"public_id=sample&timestamp=1315060510abcd");
        assert_eq!(a, hex::encode(hasher.finalize()));
    }

    #[tokio::test]
    async fn memory_host_records_lifecycle() {
        let host = MemoryMediaHost::new();
        let image = host.upload("data:image/png;base64,AAAA").await.unwrap();
        assert_eq!(public_id_from_url(&image.url), Some(image.public_id.as_str()));

        retire(&host, &image.url).await.unwrap();
        assert_eq!(host.destroyed(), vec![image.public_id]);
    }
}
