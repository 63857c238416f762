use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use url::Url;

use super::CatalogService;
use crate::error::CatalogError;

// Used when a 429 carries no usable Retry-After header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;
// Tokens are refreshed this long before the advertised expiry.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct TracksResponse {
    tracks: Vec<Option<Value>>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Spotify Web API catalog, authenticated with the client-credentials flow.
pub struct SpotifyCatalog {
    client: Client,
    api_url: Url,
    auth_url: Url,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyCatalog {
    pub fn new(
        api_url: &str,
        auth_url: &str,
        client_id: String,
        client_secret: String,
    ) -> Result<Self, CatalogError> {
        let api_url = Url::parse(api_url)
            .map_err(|e| CatalogError::Unavailable(format!("invalid api url {}: {}", api_url, e)))?;
        if api_url.cannot_be_a_base() {
            return Err(CatalogError::Unavailable(format!(
                "api url {} cannot be a base",
                api_url
            )));
        }
        let auth_url = Url::parse(auth_url)
            .map_err(|e| CatalogError::Auth(format!("invalid auth url {}: {}", auth_url, e)))?;

        Ok(Self {
            client: Client::new(),
            api_url,
            auth_url,
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn access_token(&self) -> Result<String, CatalogError> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref() {
            if current.expires_at > Instant::now() {
                return Ok(current.value.clone());
            }
        }

        debug!("Requesting catalog access token");

        let response = self
            .client
            .post(self.auth_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Auth(format!("token request failed ({}): {}", status, body)));
        }

        let body: TokenResponse = response.json().await?;
        let lifetime = body.expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS);
        let value = body.access_token;
        *token = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });

        Ok(value)
    }

    /// Sends an authorized GET. `Ok(None)` means the resource does not exist.
    async fn get(&self, url: Url) -> Result<Option<Response>, CatalogError> {
        let token = self.access_token().await?;
        let response = self.client.get(url.clone()).bearer_auth(token).send().await?;

        match response.status() {
            status if status.is_success() => Ok(Some(response)),
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = retry_after(&response);
                warn!("Rate limit (429) at {}", url.path());
                Err(CatalogError::RateLimited { retry_after })
            }
            StatusCode::UNAUTHORIZED => {
                *self.token.lock().await = None;
                Err(CatalogError::Auth(format!("token rejected at {}", url.path())))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(CatalogError::Unavailable(format!("HTTP {} - {}", status, body)))
            }
        }
    }
}

fn retry_after(response: &Response) -> Duration {
    let seconds = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    Duration::from_secs(seconds)
}

#[async_trait]
impl CatalogService for SpotifyCatalog {
    async fn get_tracks(&self, ids: &[String]) -> Result<Vec<Option<Value>>, CatalogError> {
        let mut url = self.endpoint(&["tracks"]);
        url.query_pairs_mut().append_pair("ids", &ids.join(","));

        match self.get(url).await? {
            Some(response) => {
                let body: TracksResponse = response.json().await?;
                Ok(body.tracks)
            }
            None => Ok(vec![None; ids.len()]),
        }
    }

    async fn get_artist(&self, id: &str) -> Result<Option<Value>, CatalogError> {
        match self.get(self.endpoint(&["artists", id])).await? {
            Some(response) => Ok(Some(response.json().await?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;

    #[derive(Clone, Default)]
    struct ServerState {
        token_requests: Arc<AtomicUsize>,
    }

    async fn token(State(state): State<ServerState>, headers: HeaderMap) -> Response {
        state.token_requests.fetch_add(1, Ordering::SeqCst);
        if headers.get("authorization").is_none() {
            return StatusCode::BAD_REQUEST.into_response();
        }
        Json(json!({ "access_token": "tok", "token_type": "Bearer", "expires_in": 3600 }))
            .into_response()
    }

    async fn tracks(headers: HeaderMap, Query(params): Query<HashMap<String, String>>) -> Response {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer tok") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let ids = params.get("ids").cloned().unwrap_or_default();
        let tracks: Vec<Value> = ids
            .split(',')
            .map(|id| {
                if id == "missing" {
                    Value::Null
                } else {
                    json!({ "id": id })
                }
            })
            .collect();
        Json(json!({ "tracks": tracks })).into_response()
    }

    async fn artist(Path(id): Path<String>) -> Response {
        match id.as_str() {
            "busy" => (StatusCode::TOO_MANY_REQUESTS, [("Retry-After", "7")]).into_response(),
            "busy-no-header" => StatusCode::TOO_MANY_REQUESTS.into_response(),
            "ghost" => StatusCode::NOT_FOUND.into_response(),
            "broken" => StatusCode::BAD_GATEWAY.into_response(),
            _ => Json(json!({ "id": id, "genres": ["pop"] })).into_response(),
        }
    }

    async fn spawn_catalog() -> (SpotifyCatalog, ServerState) {
        let state = ServerState::default();
        let router = Router::new()
            .route("/token", post(token))
            .route("/v1/tracks", get(tracks))
            .route("/v1/artists/:id", get(artist))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let catalog = SpotifyCatalog::new(
            &format!("http://{}/v1", addr),
            &format!("http://{}/token", addr),
            "id".to_string(),
            "secret".to_string(),
        )
        .unwrap();
        (catalog, state)
    }

    #[tokio::test]
    async fn tracks_keep_request_order_and_nulls() {
        let (catalog, _) = spawn_catalog().await;
        let ids = vec!["a".to_string(), "missing".to_string(), "c".to_string()];

        let tracks = catalog.get_tracks(&ids).await.unwrap();

        assert_eq!(tracks.len(), 3);
        assert_eq!(tracks[0].as_ref().unwrap()["id"], "a");
        assert!(tracks[1].is_none());
        assert_eq!(tracks[2].as_ref().unwrap()["id"], "c");
    }

    #[tokio::test]
    async fn access_token_is_reused() {
        let (catalog, state) = spawn_catalog().await;

        catalog.get_tracks(&["a".to_string()]).await.unwrap();
        catalog.get_artist("someone").await.unwrap();

        assert_eq!(state.token_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let (catalog, _) = spawn_catalog().await;

        match catalog.get_artist("busy").await {
            Err(CatalogError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Duration::from_secs(7))
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
        match catalog.get_artist("busy-no-header").await {
            Err(CatalogError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Duration::from_secs(DEFAULT_RETRY_AFTER_SECS))
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_artist_is_absent_and_server_errors_are_unavailable() {
        let (catalog, _) = spawn_catalog().await;

        assert!(catalog.get_artist("ghost").await.unwrap().is_none());
        assert!(matches!(
            catalog.get_artist("broken").await,
            Err(CatalogError::Unavailable(_))
        ));
        assert_eq!(catalog.get_artist("x").await.unwrap().unwrap()["genres"][0], "pop");
    }
}
