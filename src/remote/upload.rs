use crate::backend::UploadService;
use crate::error::{DocsnapError, Result};
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct UploadBody<'a> {
    image: &'a str,
}

/// Posts captured images to the storage script.
///
/// The script never returns anything meaningful, so the HTTP status is only
/// logged; a request that was sent without a transport error counts as sent.
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpUploader {
    pub fn new(client: reqwest::Client, endpoint: &str) -> Result<Self> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(DocsnapError::Config(
                "upload endpoint is not configured".to_string(),
            ));
        }
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl UploadService for HttpUploader {
    async fn upload(&self, base64_image: &str) -> Result<()> {
        tracing::debug!(
            endpoint = %self.endpoint,
            bytes = base64_image.len(),
            "HttpUploader: POST"
        );
        let response = self
            .client
            .post(&self.endpoint)
            .json(&UploadBody {
                image: base64_image,
            })
            .send()
            .await?;
        tracing::debug!(status = response.status().as_u16(), "HttpUploader: response");
        Ok(())
    }
}
