use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::types::StartSeason;

pub const MAL_API_URL: &str = "https://api.myanimelist.net/v2";
pub const CLIENT_ID_HEADER: &str = "X-MAL-CLIENT-ID";
pub const LISTING_FIELDS: &str = "id,title,main_picture,broadcast,rating,start_season,synopsis,genres,mean,media_type,num_episodes";
pub const SEASON_LIMIT: u32 = 100;
pub const SEARCH_LIMIT: u32 = 20;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("MAL API HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("request to MAL failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("MAL returned malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid MAL URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A successful upstream reply: its status and the decoded JSON body.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Thin GET client for the MyAnimeList v2 API. Attaches the client id when
/// one is configured and hands JSON bodies back untouched.
#[derive(Debug, Clone)]
pub struct MalClient {
    client: Client,
    base_url: String,
    client_id: Option<String>,
}

impl MalClient {
    pub fn new(base_url: impl Into<String>, client_id: Option<String>) -> Result<Self, UpstreamError> {
        let client = Client::builder().build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            client_id: client_id.filter(|id| !id.trim().is_empty()),
        })
    }

    pub fn has_client_id(&self) -> bool {
        self.client_id.is_some()
    }

    pub fn url_for(&self, path: &str) -> Result<Url, UpstreamError> {
        Ok(Url::parse(&format!(
            "{}/{}",
            self.base_url,
            path.trim_start_matches('/')
        ))?)
    }

    pub async fn seasonal(
        &self,
        season: StartSeason,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let mut url = self.url_for(&format!(
            "anime/season/{}/{}",
            season.year,
            season.season.as_str()
        ))?;
        url.query_pairs_mut()
            .append_pair("limit", &SEASON_LIMIT.to_string())
            .append_pair("fields", LISTING_FIELDS);
        self.get(url).await
    }

    pub async fn search(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let mut url = self.url_for("anime")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("limit", &limit.to_string())
            .append_pair("fields", LISTING_FIELDS);
        self.get(url).await
    }

    /// Forwards an arbitrary API path and raw query string.
    pub async fn forward(
        &self,
        path: &str,
        query: Option<&str>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let mut url = self.url_for(path)?;
        url.set_query(query.filter(|q| !q.is_empty()));
        self.get(url).await
    }

    async fn get(&self, url: Url) -> Result<UpstreamResponse, UpstreamError> {
        tracing::debug!(%url, "fetching from MAL");
        let mut request = self.client.get(url.clone());
        if let Some(id) = &self.client_id {
            request = request.header(CLIENT_ID_HEADER, id);
        }
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!(%status, %url, body = %body, "MAL API error");
            return Err(UpstreamError::Status { status, body });
        }
        Ok(UpstreamResponse {
            status,
            body: serde_json::from_str(&body)?,
        })
    }
}
