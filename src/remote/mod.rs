pub mod gallery;
pub mod upload;

use crate::error::Result;
use std::time::Duration;

/// Shared HTTP client configuration for the gallery and upload endpoints.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(4)
        .build()?;
    Ok(client)
}
