//! JSON HTTP API.
//!
//! Exposes the Kanban board, the association graph, contacts, statuses,
//! autocomplete and photos under `/api/v1`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/v1/kanban/move` | Move a contact to a column and position |
//! | `POST` | `/api/v1/graph/clusters/recompute` | Relabel connected components |
//! | `GET`  | `/api/v1/graph` | Nodes, edges and clusters |
//! | `POST` | `/api/v1/graph/edges` | Link two contacts |
//! | `DELETE` | `/api/v1/graph/edges/{id}` | Remove a link |
//! | `PATCH` | `/api/v1/graph/nodes/{id}/position` | Store layout coordinates |
//! | `GET` `POST` | `/api/v1/contacts` | List / create |
//! | `GET` `PATCH` `DELETE` | `/api/v1/contacts/{id}` | Read / update / delete |
//! | `PUT` `DELETE` | `/api/v1/contacts/{id}/photo` | Upload (raw body) / remove |
//! | `GET`  | `/api/v1/photos/{name}` | Serve a stored photo |
//! | `GET` `POST` | `/api/v1/statuses` | List / create |
//! | `PATCH` `DELETE` | `/api/v1/statuses/{id}` | Update / delete |
//! | `POST` | `/api/v1/statuses/reorder` | Reorder columns |
//! | `GET`  | `/api/v1/suggestions/{kind}` | Autocomplete tags, interests, occupations |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "contact not found: 42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `payload_too_large` (413), `internal` (500), `transaction_failed` (503).
//!
//! # CORS
//!
//! Origins come from `[server].cors_origins`; `"*"` allows any origin.

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection, QueryRejection},
        DefaultBodyLimit, Path, Query, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use crm_core::cluster::{self, RecomputeSummary};
use crm_core::error::CrmError;
use crm_core::kanban::{self, MoveOutcome, MoveRequest};
use crm_core::lookup::LookupKind;
use crm_core::store::Store;

use crate::config::Config;
use crate::contacts::{self, ContactInput, ContactPatch, ListQuery};
use crate::graph::{self, EdgeInput, NodePosition};
use crate::lookups;
use crate::models::{ContactPage, ContactView, EdgeView, GraphView, StatusView, SuggestionItem};
use crate::photos::{self, PhotoStore};
use crate::sqlite_store::SqliteStore;
use crate::statuses::{self, ReorderRequest, StatusInput, StatusPatch};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    /// Transactional port used by the reindexer and the clusterer.
    pub store: Arc<dyn Store>,
    pub photos: PhotoStore,
}

impl AppState {
    pub fn new(config: Config, pool: SqlitePool) -> Self {
        let photos = PhotoStore::new(&config.storage);
        Self {
            store: Arc::new(SqliteStore::new(pool.clone())),
            config: Arc::new(config),
            pool,
            photos,
        }
    }
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = crate::db::connect(config).await?;
    crate::migrate::migrate_pool(&pool).await?;

    let app = build_router(AppState::new(config.clone(), pool))?;

    info!(addr = %bind_addr, "CRM server listening");
    println!("CRM server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.server.allows_any_origin() {
        return Ok(layer.allow_origin(Any));
    }
    let origins = config
        .server
        .cors_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin: {}", origin))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// Build the full router. Exposed so tests can drive it without a socket.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config)?;
    // Leave headroom so oversize photos reach the handler's own 413.
    let photo_limit = DefaultBodyLimit::max(state.photos.max_bytes() + 1);

    let api = Router::new()
        .route("/kanban/move", post(handle_move))
        .route("/graph", get(handle_graph))
        .route("/graph/clusters/recompute", post(handle_recompute))
        .route("/graph/edges", post(handle_create_edge))
        .route("/graph/edges/{id}", delete(handle_delete_edge))
        .route("/graph/nodes/{id}/position", patch(handle_node_position))
        .route("/contacts", get(handle_list_contacts).post(handle_create_contact))
        .route(
            "/contacts/{id}",
            get(handle_get_contact)
                .patch(handle_update_contact)
                .delete(handle_delete_contact),
        )
        .route(
            "/contacts/{id}/photo",
            put(handle_upload_photo)
                .delete(handle_remove_photo)
                .layer(photo_limit),
        )
        .route("/photos/{name}", get(handle_get_photo))
        .route("/statuses", get(handle_list_statuses).post(handle_create_status))
        .route("/statuses/reorder", post(handle_reorder_statuses))
        .route(
            "/statuses/{id}",
            patch(handle_update_status).delete(handle_delete_status),
        )
        .route("/suggestions/{kind}", get(handle_suggestions));

    Ok(Router::new()
        .route("/health", get(handle_health))
        .nest("/api/v1", api)
        .layer(cors)
        .with_state(state))
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<CrmError> for AppError {
    fn from(err: CrmError) -> Self {
        let status = match &err {
            CrmError::NotFound { .. } => StatusCode::NOT_FOUND,
            CrmError::Invalid(_) => StatusCode::BAD_REQUEST,
            CrmError::Conflict(_) => StatusCode::CONFLICT,
            CrmError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            CrmError::Transaction(_) => StatusCode::SERVICE_UNAVAILABLE,
            CrmError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(code = err.code(), error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Constructs a 404 Not Found error.
fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/v1/kanban/move ============

/// Move a contact. Responds 503 `transaction_failed` if the move lost a
/// race with another writer; nothing was applied and the client may retry.
async fn handle_move(
    State(state): State<AppState>,
    payload: Result<Json<MoveRequest>, JsonRejection>,
) -> Result<Json<MoveOutcome>, AppError> {
    let request = json_body(payload)?;
    let outcome = kanban::move_contact(state.store.as_ref(), &request).await?;
    info!(
        contact_id = %outcome.id,
        status_id = %outcome.status_id,
        position = outcome.sort_order_in_status,
        "moved contact"
    );
    Ok(Json(outcome))
}

// ============ Graph ============

async fn handle_recompute(
    State(state): State<AppState>,
) -> Result<Json<RecomputeSummary>, AppError> {
    let summary = cluster::recompute(state.store.as_ref()).await?;
    info!(
        clusters = summary.clusters_found,
        contacts = summary.contacts_updated,
        "recomputed clusters"
    );
    Ok(Json(summary))
}

async fn handle_graph(State(state): State<AppState>) -> Result<Json<GraphView>, AppError> {
    Ok(Json(graph::get_graph(&state.pool).await?))
}

async fn handle_create_edge(
    State(state): State<AppState>,
    payload: Result<Json<EdgeInput>, JsonRejection>,
) -> Result<(StatusCode, Json<EdgeView>), AppError> {
    let input = json_body(payload)?;
    let edge = graph::create_edge(&state.pool, &input).await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

async fn handle_delete_edge(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    graph::delete_edge(&state.pool, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_node_position(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<NodePosition>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let position = json_body(payload)?;
    graph::update_node_position(&state.pool, &id, &position).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Contacts ============

async fn handle_list_contacts(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ContactPage>, AppError> {
    let query = query_params(query)?;
    let page = contacts::list_contacts(&state.pool, &state.config.pagination, &query).await?;
    Ok(Json(page))
}

async fn handle_create_contact(
    State(state): State<AppState>,
    payload: Result<Json<ContactInput>, JsonRejection>,
) -> Result<(StatusCode, Json<ContactView>), AppError> {
    let input = json_body(payload)?;
    let contact = contacts::create_contact(&state.pool, &input).await?;
    Ok((StatusCode::CREATED, Json(contact)))
}

async fn handle_get_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContactView>, AppError> {
    Ok(Json(contacts::get_contact(&state.pool, &id).await?))
}

async fn handle_update_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ContactPatch>, JsonRejection>,
) -> Result<Json<ContactView>, AppError> {
    let patch = json_body(payload)?;
    Ok(Json(contacts::update_contact(&state.pool, &id, &patch).await?))
}

async fn handle_delete_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if let Some(photo) = contacts::delete_contact(&state.pool, &id).await? {
        state.photos.delete(&photo).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============ Photos ============

async fn handle_upload_photo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ContactView>, AppError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::from(CrmError::PayloadTooLarge(rejection.body_text()))
        } else {
            bad_request(rejection.body_text())
        }
    })?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let contact =
        photos::upload_photo(&state.pool, &state.photos, &id, content_type, &body).await?;
    Ok(Json(contact))
}

async fn handle_remove_photo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContactView>, AppError> {
    Ok(Json(
        photos::remove_photo(&state.pool, &state.photos, &id).await?,
    ))
}

async fn handle_get_photo(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let (bytes, content_type) = state.photos.open(&name).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

// ============ Statuses ============

#[derive(Deserialize)]
struct StatusListParams {
    #[serde(default)]
    include_inactive: bool,
}

async fn handle_list_statuses(
    State(state): State<AppState>,
    query: Result<Query<StatusListParams>, QueryRejection>,
) -> Result<Json<Vec<StatusView>>, AppError> {
    let params = query_params(query)?;
    Ok(Json(
        statuses::list_statuses(&state.pool, params.include_inactive).await?,
    ))
}

async fn handle_create_status(
    State(state): State<AppState>,
    payload: Result<Json<StatusInput>, JsonRejection>,
) -> Result<(StatusCode, Json<StatusView>), AppError> {
    let input = json_body(payload)?;
    let status = statuses::create_status(&state.pool, &input).await?;
    Ok((StatusCode::CREATED, Json(status)))
}

async fn handle_update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<StatusPatch>, JsonRejection>,
) -> Result<Json<StatusView>, AppError> {
    let patch = json_body(payload)?;
    Ok(Json(statuses::update_status(&state.pool, &id, &patch).await?))
}

async fn handle_delete_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    statuses::delete_status(&state.pool, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_reorder_statuses(
    State(state): State<AppState>,
    payload: Result<Json<ReorderRequest>, JsonRejection>,
) -> Result<Json<Vec<StatusView>>, AppError> {
    let request = json_body(payload)?;
    Ok(Json(
        statuses::reorder_statuses(&state.pool, &request.order).await?,
    ))
}

// ============ GET /api/v1/suggestions/{kind} ============

#[derive(Deserialize)]
struct SuggestionParams {
    #[serde(default)]
    q: String,
    #[serde(default = "default_suggestion_limit")]
    limit: i64,
}

fn default_suggestion_limit() -> i64 {
    10
}

async fn handle_suggestions(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    query: Result<Query<SuggestionParams>, QueryRejection>,
) -> Result<Json<Vec<SuggestionItem>>, AppError> {
    let kind = LookupKind::parse(&kind).ok_or_else(|| {
        warn!(%kind, "unknown suggestion kind");
        not_found(format!("no suggestions for '{}'", kind))
    })?;
    let params = query_params(query)?;
    Ok(Json(
        lookups::suggest(&state.pool, kind, &params.q, params.limit).await?,
    ))
}
