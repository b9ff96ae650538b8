use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "https://thispersondoesnotexist.com";

const FETCH_USER_AGENT: &str = "Mozilla/5.0";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("image request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("image endpoint returned status {0}")]
    Status(reqwest::StatusCode),
}

/// External source of generated face images. One fetch returns one image;
/// the engine never retries on its own.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn fetch(&self) -> Result<Vec<u8>, ProviderError>;
}

/// HTTPS-backed provider. A timeout surfaces as a `Request` error, which the
/// engine treats the same as any other failed fetch.
pub struct FaceProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl FaceProvider {
    pub fn new(endpoint: impl Into<String>) -> FaceProvider {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        FaceProvider {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl Default for FaceProvider {
    fn default() -> Self {
        FaceProvider::new(DEFAULT_ENDPOINT)
    }
}

#[async_trait]
impl ImageProvider for FaceProvider {
    async fn fetch(&self) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::USER_AGENT, FETCH_USER_AGENT)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(ProviderError::Status(response.status()));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
