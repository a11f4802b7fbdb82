use std::future::Future;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{AnimeSource, ClientError};
use crate::types::{AnimeList, AnimeRecord};

pub const DETAIL_FIELDS: &str = "id,title,main_picture,synopsis,mean,rank,popularity,num_episodes,status,broadcast,start_season,genres,media_type,rating";

/// Client for the relay's HTTP surface, the viewer's only network path.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder().build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(Url::parse(&format!("{}{}", self.base_url, path))?)
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        let response = self.client.get(self.url("/health")?).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http { status, body });
        }
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        tracing::debug!(%url, "fetching from relay");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Http { status, body: text });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Races `fetch` against `cancel` and re-checks the token once the fetch
/// settles, so a response that lands after cancellation is dropped.
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    fetch: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, ClientError> {
    if cancel.is_cancelled() {
        return Err(ClientError::Cancelled);
    }
    let result = tokio::select! {
        _ = cancel.cancelled() => return Err(ClientError::Cancelled),
        result = fetch => result,
    };
    if cancel.is_cancelled() {
        return Err(ClientError::Cancelled);
    }
    result
}

impl AnimeSource for RelayClient {
    async fn seasonal(&self, cancel: &CancellationToken) -> Result<Vec<AnimeRecord>, ClientError> {
        let url = self.url("/api/anime/season")?;
        let list: AnimeList = cancellable(cancel, self.get_json(url)).await?;
        Ok(list.into_records())
    }

    async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<AnimeRecord>, ClientError> {
        let mut url = self.url("/api/anime")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("limit", "20");
        let list: AnimeList = cancellable(cancel, self.get_json(url)).await?;
        Ok(list.into_records())
    }

    async fn details(
        &self,
        id: u64,
        cancel: &CancellationToken,
    ) -> Result<AnimeRecord, ClientError> {
        let mut url = self.url(&format!("/api/anime/{id}"))?;
        url.query_pairs_mut().append_pair("fields", DETAIL_FIELDS);
        cancellable(cancel, self.get_json(url)).await
    }
}
