use reqwest::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::types::AnimeRecord;

pub mod mal;
pub mod relay;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("relay returned HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("request to relay failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode relay response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid relay URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("request cancelled")]
    Cancelled,
}

/// Where the viewer gets anime listings from. Every call observes `cancel`:
/// once it fires the call resolves to [`ClientError::Cancelled`] and its
/// payload is never handed back.
pub trait AnimeSource {
    async fn seasonal(&self, cancel: &CancellationToken) -> Result<Vec<AnimeRecord>, ClientError>;
    async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<AnimeRecord>, ClientError>;
    async fn details(&self, id: u64, cancel: &CancellationToken)
    -> Result<AnimeRecord, ClientError>;
}
