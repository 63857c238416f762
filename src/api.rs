use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::analysis::{self, PopularityReport};
use crate::query::{ChartStore, Country, CountryCharts, SearchHit};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<ChartStore>>,
    pub charts_dir: PathBuf,
}

impl AppState {
    pub fn new(store: ChartStore) -> Self {
        Self {
            charts_dir: store.root().to_path_buf(),
            store: Arc::new(RwLock::new(store)),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.to_string(),
        }
    }

    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

#[derive(Deserialize)]
pub struct AnalysisQuery {
    #[serde(default)]
    pub track: String,
    #[serde(default)]
    pub artist: String,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub message: String,
    pub status: String,
}

pub fn create_router(state: AppState, static_dir: &FsPath) -> Router {
    Router::new()
        .route("/api/continents", get(get_continents))
        .route("/api/countries/:continent", get(get_countries))
        .route("/api/search", get(search_tracks))
        .route("/api/charts/:continent/:country", get(get_charts))
        .route("/api/analysis", get(get_analysis))
        .route("/api/reload", post(reload_charts))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// GET /api/continents
async fn get_continents(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.store.read().await.continents())
}

// GET /api/countries/:continent
async fn get_countries(
    State(state): State<AppState>,
    Path(continent): Path<String>,
) -> ApiResult<Vec<Country>> {
    state
        .store
        .read()
        .await
        .countries(&continent)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Continent not found"))
}

// GET /api/search?query=
async fn search_tracks(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Vec<SearchHit>> {
    state
        .store
        .read()
        .await
        .search(&params.query)
        .map(Json)
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

// GET /api/charts/:continent/:country
async fn get_charts(
    State(state): State<AppState>,
    Path((continent, country)): Path<(String, String)>,
) -> ApiResult<CountryCharts> {
    let store = state.store.read().await;
    if store.countries(&continent).is_none() {
        return Err(ApiError::not_found("Continent not found"));
    }
    store
        .country_charts(&continent, &country)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Country not found"))
}

// GET /api/analysis?track=&artist=
async fn get_analysis(
    State(state): State<AppState>,
    Query(params): Query<AnalysisQuery>,
) -> ApiResult<PopularityReport> {
    let store = state.store.read().await;
    analysis::analyze(&store, &params.track, &params.artist)
        .map(Json)
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

// POST /api/reload
async fn reload_charts(State(state): State<AppState>) -> Json<ReloadResponse> {
    tokio::spawn(async move {
        match ChartStore::load(&state.charts_dir).await {
            Ok(store) => {
                *state.store.write().await = store;
                info!("Reloaded charts from {}", state.charts_dir.display());
            }
            Err(e) => {
                error!("Error reloading charts: {}", e);
            }
        }
    });

    Json(ReloadResponse {
        message: "Chart reload initiated".to_string(),
        status: "success".to_string(),
    })
}
