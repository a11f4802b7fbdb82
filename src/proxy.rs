use std::future::Future;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path, Query, RawQuery, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Local;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Settings;
use crate::providers::mal::{MalClient, SEARCH_LIMIT, UpstreamError, UpstreamResponse};
use crate::types::StartSeason;

#[derive(Clone)]
pub struct RelayState {
    pub upstream: MalClient,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("missing required query parameter `{0}`")]
    MissingQuery(&'static str),
    #[error("path `{0}` contains a dot segment")]
    InvalidPath(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            RelayError::MissingQuery(param) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Missing query parameter",
                    "message": format!("`{param}` is required"),
                })),
            )
                .into_response(),
            RelayError::InvalidPath(path) => {
                tracing::warn!(path, "rejected dot segment in forwarded path");
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Invalid path",
                        "message": format!("`{path}` may not contain `.` or `..` segments"),
                    })),
                )
                    .into_response()
            }
            RelayError::Upstream(UpstreamError::Status { status, body }) => {
                let status =
                    StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
                (
                    status,
                    Json(json!({
                        "error": "MAL API error",
                        "details": body,
                    })),
                )
                    .into_response()
            }
            RelayError::Upstream(err) => {
                tracing::error!(error = %err, "relay request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Failed to fetch from MyAnimeList",
                        "message": err.to_string(),
                    })),
                )
                    .into_response()
            }
        }
    }
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status.as_u16()).unwrap_or(StatusCode::OK);
        (status, Json(self.body)).into_response()
    }
}

/// `limit` stays a string so a malformed value falls back to the default
/// instead of failing extraction.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    limit: Option<String>,
}

/// Dot segments, percent-encoded ones included, would climb out of the API
/// base once the upstream URL is normalised.
fn has_dot_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

pub fn build_router(state: RelayState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/anime/season", get(seasonal_anime))
        .route("/api/anime", get(search_anime))
        .route("/api/*path", get(forward))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(origin, error = %err, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn seasonal_anime(
    State(state): State<RelayState>,
) -> Result<UpstreamResponse, RelayError> {
    let season = StartSeason::current(Local::now().date_naive());
    tracing::info!(season = season.season.as_str(), year = season.year, "fetching seasonal anime");
    Ok(state.upstream.seasonal(season).await?)
}

async fn search_anime(
    State(state): State<RelayState>,
    Query(params): Query<SearchParams>,
) -> Result<UpstreamResponse, RelayError> {
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or(RelayError::MissingQuery("q"))?;
    let limit = match params.limit.as_deref().map(str::trim) {
        None | Some("") => SEARCH_LIMIT,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::debug!(limit = raw, "ignoring malformed limit");
            SEARCH_LIMIT
        }),
    };
    Ok(state.upstream.search(query, limit).await?)
}

async fn forward(
    State(state): State<RelayState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<UpstreamResponse, RelayError> {
    if has_dot_segment(&path) {
        return Err(RelayError::InvalidPath(path));
    }
    Ok(state.upstream.forward(&path, query.as_deref()).await?)
}

/// Runs the relay until `shutdown` resolves.
pub async fn serve<F>(settings: &Settings, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let upstream = MalClient::new(&settings.mal_api_url, settings.mal_client_id.clone())
        .context("failed to create MAL client")?;
    tracing::info!(
        client_id = if upstream.has_client_id() { "set" } else { "not set" },
        "MAL credentials"
    );
    if !upstream.has_client_id() {
        tracing::warn!("MAL_CLIENT_ID is not set; upstream calls will be rejected");
    }

    let app = build_router(RelayState { upstream }, &settings.allowed_origins);
    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port))
        .await
        .with_context(|| format!("failed to bind relay on {}:{}", settings.host, settings.port))?;
    let addr = listener
        .local_addr()
        .context("failed to read relay address")?;
    tracing::info!(%addr, "relay listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("relay server failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mal::CLIENT_ID_HEADER;
    use axum::body::Body;
    use axum::http::Request;
    use mockito::Matcher;
    use tower::ServiceExt;

    fn app(upstream_url: &str) -> Router {
        let upstream = MalClient::new(upstream_url, Some("test-client".into())).unwrap();
        build_router(
            RelayState { upstream },
            &["http://localhost:3000".to_string()],
        )
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app("http://127.0.0.1:9")
            .oneshot(get_request("/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn season_route_targets_current_season() {
        let season = StartSeason::current(Local::now().date_naive());
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                format!("/anime/season/{}/{}", season.year, season.season.as_str()).as_str(),
            )
            .match_header(CLIENT_ID_HEADER, "test-client")
            .match_query(Matcher::UrlEncoded("limit".into(), "100".into()))
            .with_status(200)
            .with_body(r#"{"data":[{"node":{"id":1,"title":"A"}}]}"#)
            .create_async()
            .await;

        let response = app(&server.url())
            .oneshot(get_request("/api/anime/season"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["data"][0]["node"]["id"], 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn upstream_error_is_mirrored_in_envelope() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/anime/season/".into()))
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"error":"invalid token"}"#)
            .create_async()
            .await;

        let response = app(&server.url())
            .oneshot(get_request("/api/anime/season"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = read_json(response).await;
        assert_eq!(body["error"], "MAL API error");
        assert_eq!(body["details"], r#"{"error":"invalid token"}"#);
    }

    #[tokio::test]
    async fn search_without_query_is_rejected_locally() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        for uri in ["/api/anime", "/api/anime?q=", "/api/anime?q=%20%20"] {
            let response = app(&server.url()).oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            let body = read_json(response).await;
            assert!(body["message"].as_str().unwrap().contains("`q`"));
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn search_forwards_term_and_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/anime")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "dandadan".into()),
                Matcher::UrlEncoded("limit".into(), "5".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"data":[]}"#)
            .create_async()
            .await;

        let response = app(&server.url())
            .oneshot(get_request("/api/anime?q=dandadan&limit=5"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn catch_all_forwards_path_and_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/anime/52991")
            .match_header(CLIENT_ID_HEADER, "test-client")
            .match_query(Matcher::UrlEncoded("fields".into(), "id,title,mean".into()))
            .with_status(200)
            .with_body(r#"{"id":52991,"title":"Sousou no Frieren","mean":9.3}"#)
            .create_async()
            .await;

        let response = app(&server.url())
            .oneshot(get_request("/api/anime/52991?fields=id,title,mean"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["mean"], 9.3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn upstream_success_status_is_mirrored() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/anime/ranking")
            .match_query(Matcher::Any)
            .with_status(203)
            .with_body(r#"{"data":[]}"#)
            .create_async()
            .await;

        let response = app(&server.url())
            .oneshot(get_request("/api/anime/ranking?ranking_type=all"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NON_AUTHORITATIVE_INFORMATION);
        assert_eq!(read_json(response).await, json!({"data": []}));
    }

    #[tokio::test]
    async fn malformed_limit_falls_back_to_default() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/anime")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "x".into()),
                Matcher::UrlEncoded("limit".into(), SEARCH_LIMIT.to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"data":[]}"#)
            .expect(2)
            .create_async()
            .await;

        for uri in ["/api/anime?limit=abc&q=x", "/api/anime?q=x&limit="] {
            let response = app(&server.url()).oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn dot_segments_are_not_forwarded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        for uri in [
            "/api/..%2F..%2Foauth2%2Ftoken",
            "/api/anime/%2e%2e/%2e%2e/secret",
            "/api/anime/.%2E/x",
            "/api/anime%5C..%5Cx",
        ] {
            let response = app(&server.url()).oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(read_json(response).await["error"], "Invalid path");
        }
        mock.assert_async().await;
    }

    #[test]
    fn dot_segment_detection() {
        assert!(has_dot_segment("../anime"));
        assert!(has_dot_segment("anime/./1"));
        assert!(has_dot_segment("anime/%2E%2e"));
        assert!(!has_dot_segment("anime/1.5"));
        assert!(!has_dot_segment("anime/...hack"));
        assert!(!has_dot_segment("anime/52991"));
    }

    #[tokio::test]
    async fn transport_failure_maps_to_500() {
        // Nothing listens on the discard port.
        let response = app("http://127.0.0.1:9")
            .oneshot(get_request("/api/anime/season"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert!(body["error"].is_string());
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn cors_allows_configured_origin_only() {
        let request = |origin: &str| {
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, origin)
                .body(Body::empty())
                .unwrap()
        };
        let allowed = app("http://127.0.0.1:9")
            .oneshot(request("http://localhost:3000"))
            .await
            .unwrap();
        assert_eq!(
            allowed.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static("http://localhost:3000"))
        );

        let denied = app("http://127.0.0.1:9")
            .oneshot(request("https://evil.example"))
            .await
            .unwrap();
        assert!(
            denied
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }
}
