use crate::{
    errors::AppError,
    semantic::{Page, PageRequest, QueryResult, SearchError, SearchService},
    tags::{TagCatalog, TagCategory, DEFAULT_SAMPLE_SIZE},
};
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    collections::BTreeMap,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::signal;
use tower::Layer;
use tower_http::set_header::SetResponseHeaderLayer;

const THUMBNAIL_CACHE_CONTROL: &str = "public, max-age=86400";

/// Everything a request handler needs. Built once at startup.
pub struct ServerState {
    pub service: Arc<SearchService>,
    pub tags: Arc<TagCatalog>,
    /// Index file re-read by /api/reload
    pub index_path: PathBuf,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl ServerState {
    fn page_limit(&self, offset: usize, limit: usize) -> usize {
        PageRequest::new(offset, limit).effective_limit(self.default_page_size, self.max_page_size)
    }
}

pub fn router(state: ServerState, thumbnails_dir: &Path) -> Router {
    let thumbnails = SetResponseHeaderLayer::if_not_present(
        header::CACHE_CONTROL,
        HeaderValue::from_static(THUMBNAIL_CACHE_CONTROL),
    )
    .layer(tower_http::services::ServeDir::new(thumbnails_dir));

    Router::new()
        .nest_service("/thumbnails", thumbnails)
        .route("/api/search", post(search))
        .route("/api/similar", post(similar))
        .route("/api/tags", get(tags))
        .route("/api/tags/sample", get(sample_tags))
        .route("/api/health", get(health))
        .route("/api/reload", post(reload))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(Arc::new(state))
}

async fn serve(state: ServerState, thumbnails_dir: PathBuf, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(state, &thumbnails_dir);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::warn!("shutting down");
}

pub fn start_daemon(
    state: ServerState,
    thumbnails_dir: PathBuf,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(serve(state, thumbnails_dir, addr))
}

#[derive(Debug)]
struct HttpError(AppError);

// Tell axum how to convert `AppError` into a response.
// Internal causes are logged and never sent to the client.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self.0 {
            AppError::Search(SearchError::EmptyQuery) | AppError::Search(SearchError::EmptyCode) => {
                (StatusCode::BAD_REQUEST, self.0.to_string())
            }
            AppError::Search(SearchError::NotFound(_)) => (StatusCode::NOT_FOUND, self.0.to_string()),
            AppError::Search(_) => {
                log::error!("search failed: {:?}", self.0);
                (StatusCode::INTERNAL_SERVER_ERROR, "search failed".to_string())
            }
            AppError::Reload(_) => {
                log::error!("{:?}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to reload style index".to_string(),
                )
            }
            AppError::Join(_) | AppError::Other(_) => {
                log::error!("{:?}", self.0);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

// This enables using `?` on anything that converts into `AppError`.
impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    /// Free-text description. Missing and blank are both rejected.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub offset: usize,
    /// Page size; 0 uses the configured default
    #[serde(default)]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<QueryResult>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

impl SearchResponse {
    pub fn new(query: String, page: Page<QueryResult>) -> Self {
        Self {
            query,
            results: page.items,
            total: page.total,
            offset: page.offset,
            limit: page.limit,
            has_more: page.has_more,
        }
    }
}

async fn search(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let service = state.service.clone();
    let query = payload.query.unwrap_or_default();
    let found = tokio::task::spawn_blocking(move || service.search_by_text(&query)).await??;

    let limit = state.page_limit(payload.offset, payload.limit);
    let page = Page::slice(found.results, payload.offset, limit);

    Ok(Json(SearchResponse::new(found.query, page)))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimilarRequest {
    #[serde(default)]
    pub sref_code: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarResponse {
    pub reference_sref: String,
    pub results: Vec<QueryResult>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

impl SimilarResponse {
    pub fn new(reference_sref: String, page: Page<QueryResult>) -> Self {
        Self {
            reference_sref,
            results: page.items,
            total: page.total,
            offset: page.offset,
            limit: page.limit,
            has_more: page.has_more,
        }
    }
}

async fn similar(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<SimilarRequest>,
) -> Result<Json<SimilarResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    // No encoder call here, so no need to leave the async worker
    let code = payload.sref_code.unwrap_or_default();
    let found = state.service.search_by_code(&code)?;

    let limit = state.page_limit(payload.offset, payload.limit);
    let page = Page::slice(found.results, payload.offset, limit);

    Ok(Json(SimilarResponse::new(found.reference, page)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagsResponse {
    pub tags: Vec<String>,
    pub total_unique_tags: usize,
    pub categories: BTreeMap<TagCategory, Vec<String>>,
    /// True when the built-in list is served instead of the curated file
    pub fallback: bool,
}

impl From<&TagCatalog> for TagsResponse {
    fn from(catalog: &TagCatalog) -> Self {
        let tags = catalog.terms();
        Self {
            total_unique_tags: tags.len(),
            tags,
            categories: catalog.grouped_by_category(),
            fallback: catalog.used_fallback(),
        }
    }
}

async fn tags(State(state): State<Arc<ServerState>>) -> Json<TagsResponse> {
    Json(TagsResponse::from(state.tags.as_ref()))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SampleParams {
    pub n: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleResponse {
    pub tags: Vec<String>,
}

async fn sample_tags(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<SampleParams>,
) -> Json<SampleResponse> {
    let n = params.n.unwrap_or(DEFAULT_SAMPLE_SIZE);
    Json(SampleResponse {
        tags: state.tags.sample(n),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sref_count: usize,
    pub dimensions: usize,
    pub encoder: String,
    pub tags_fallback: bool,
}

async fn health(State(state): State<Arc<ServerState>>) -> Result<Json<HealthResponse>, HttpError> {
    let store = state.service.store()?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        sref_count: store.len(),
        dimensions: store.dimensions(),
        encoder: state.service.encoder_name().to_string(),
        tags_fallback: state.tags.used_fallback(),
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub sref_count: usize,
}

async fn reload(State(state): State<Arc<ServerState>>) -> Result<Json<ReloadResponse>, HttpError> {
    let path = state.index_path.clone();
    let store = tokio::task::spawn_blocking(move || crate::semantic::EmbeddingStore::load(&path))
        .await??;

    let sref_count = store.len();
    state.service.reload(Arc::new(store))?;

    Ok(Json(ReloadResponse { sref_count }))
}
