use crate::backend::GalleryService;
use crate::error::{DocsnapError, Result};
use crate::events::RemoteItem;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

const ACTION_COUNT: &str = "countImages";
const ACTION_GET: &str = "getImage";
const ACTION_LIST: &str = "listImages";

/// Count replies come either wrapped (`{"count": 3}`) or bare (`3`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CountResponse {
    Wrapped { count: u64 },
    Bare(u64),
}

impl CountResponse {
    fn value(&self) -> u64 {
        match self {
            CountResponse::Wrapped { count } => *count,
            CountResponse::Bare(count) => *count,
        }
    }
}

/// Build the query pairs for one call. An empty folder is left out entirely.
fn build_query(action: &str, folder: &str, index: Option<usize>) -> Vec<(&'static str, String)> {
    let mut query = vec![("action", action.to_string())];
    if !folder.is_empty() {
        query.push(("folder", folder.to_string()));
    }
    if let Some(index) = index {
        query.push(("index", index.to_string()));
    }
    query
}

fn parse_count(body: &str) -> Result<usize> {
    let parsed: CountResponse = serde_json::from_str(body)?;
    usize::try_from(parsed.value())
        .map_err(|_| DocsnapError::InvalidPayload(format!("count {} out of range", parsed.value())))
}

/// Gallery reached over the hosted script endpoint.
pub struct HttpGalleryService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGalleryService {
    pub fn new(client: reqwest::Client, endpoint: &str) -> Result<Self> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(DocsnapError::Config(
                "gallery endpoint is not configured".to_string(),
            ));
        }
        tracing::info!(endpoint, "HttpGalleryService: initializing");
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    async fn get_text(&self, query: &[(&'static str, String)]) -> Result<String> {
        tracing::debug!(endpoint = %self.endpoint, ?query, "HttpGalleryService: GET");
        let response = self.client.get(&self.endpoint).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DocsnapError::Status {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, query: &[(&'static str, String)]) -> Result<T> {
        let body = self.get_text(query).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch a whole folder in one call. Older deployments of the script only
    /// support this mode.
    pub async fn list_images(&self, folder: &str) -> Result<Vec<RemoteItem>> {
        let items: Vec<RemoteItem> = self.get_json(&build_query(ACTION_LIST, folder, None)).await?;
        tracing::debug!(folder, count = items.len(), "HttpGalleryService: listImages");
        Ok(items)
    }
}

#[async_trait]
impl GalleryService for HttpGalleryService {
    async fn count(&self, folder: &str) -> Result<usize> {
        let body = self.get_text(&build_query(ACTION_COUNT, folder, None)).await?;
        parse_count(&body)
    }

    async fn fetch_item(&self, folder: &str, index: usize) -> Result<RemoteItem> {
        self.get_json(&build_query(ACTION_GET, folder, Some(index)))
            .await
    }
}
