mod bulk;
mod export;
mod http;
mod metrics;
mod models;
mod security;
mod valuation;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Multipart, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bulk::{BatchConfig, BatchError, BatchErrorKind, BatchPipeline};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, ArtifactQuery, FlatRowsRequest};
use security::{SessionState, require_session};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;
use valuation::{
    ValuationClient, ValuationConfig, ValuationError,
    config::{LOOKUP_TIMEOUT, REPORT_TIMEOUT},
};

const BULK_FILENAME: &str = "simple_value_results.csv";
const EXPORT_FILENAME: &str = "results.csv";

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "valuation.api", "server crashed: {err}");
    }
}

async fn run() -> eyre::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let valuation = ValuationClient::new(ValuationConfig::from_env());
    if valuation.config().api_key.is_none() {
        warn!(
            target = "valuation.api",
            "VALUATION_API_KEY is not set; upstream calls will be rejected"
        );
    }
    let batch = BatchPipeline::new(Arc::new(valuation.clone()), BatchConfig::from_env());
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    let openapi: serde_json::Value = serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or(json!({"openapi": "3.0.3"}));

    let state = AppState {
        valuation,
        batch,
        openapi: Arc::new(openapi),
        prometheus_handle,
    };
    let app = router(state, SessionState::from_env());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "valuation.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    valuation: ValuationClient,
    batch: BatchPipeline<ValuationClient>,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: PrometheusHandle,
}

fn router(state: AppState, session: SessionState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .route("/bulk/simple-value", post(bulk_simple_value))
        .route("/report/simple-value", post(report_simple_value))
        .route("/lookup", post(property_lookup))
        .route("/artifact", get(artifact))
        .route("/csv", post(export_csv))
        .route_layer(middleware::from_fn_with_state(
            session.clone(),
            require_session,
        ));

    let api = Router::new()
        .merge(protected)
        .route("/session", post(security::login).with_state(session));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .nest("/api", api)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(16 * 1024 * 1024)
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "valuation-bulk-api",
    }))
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Ok(key) = std::env::var("OPENAPI_KEY") {
        let presented = headers
            .get("X-Docs-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != key {
            return Err(AppError::new(StatusCode::UNAUTHORIZED, "unauthorized", None));
        }
    }
    Ok(Json((*state.openapi).clone()))
}

async fn swagger_ui() -> Response {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Valuation Bulk API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response()
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    let body = state.prometheus_handle.render();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

fn csv_attachment(filename: &str, body: String) -> Response {
    let disposition = format!("attachment; filename=\"{filename}\"");
    let mut response = ([(header::CONTENT_TYPE, "text/csv")], body).into_response();
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

/// Resolve every row of an uploaded table against the valuation service.
///
/// - Method: `POST`
/// - Path: `/api/bulk/simple-value`
/// - Body: `multipart/form-data` with a `file` part (CSV with a header row)
/// - Response: `text/csv`, one result row per input row
async fn bulk_simple_value(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    crate::metrics::inc_requests("/api/bulk/simple-value");
    let mut upload: Option<Bytes> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request("invalid_multipart", err.to_string()))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| AppError::bad_request("invalid_multipart", err.to_string()))?;
            upload = Some(bytes);
            break;
        }
    }
    let Some(table) = upload else {
        return Err(AppError::new(StatusCode::BAD_REQUEST, "file_required", None));
    };

    let batch_id = Uuid::new_v4();
    let span = info_span!(target: "valuation.bulk", "batch", batch_id = %batch_id);
    let output = state.batch.run(&table).instrument(span).await?;

    let row_count = output.rows.len();
    let mut response = csv_attachment(BULK_FILENAME, output.csv);
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&batch_id.to_string()) {
        headers.insert("X-Batch-Id", value);
    }
    headers.insert("X-Batch-Rows", HeaderValue::from(row_count));
    Ok(response)
}

/// Single-record valuation, forwarded verbatim.
///
/// - Method: `POST`
/// - Path: `/api/report/simple-value`
/// - Body: `{address, city, state, zip}` or `{apn, fips}`
async fn report_simple_value(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, AppError> {
    crate::metrics::inc_requests("/api/report/simple-value");
    let reply = match state.valuation.simple_value(&body, REPORT_TIMEOUT).await {
        Ok(reply) => reply,
        Err(ValuationError::MissingApiKey) => return Err(AppError::missing_api_key()),
        Err(ValuationError::Timeout) => {
            return Err(AppError::new(StatusCode::GATEWAY_TIMEOUT, "proxy_timeout", None));
        }
        Err(err) => {
            warn!(target = "valuation.upstream", error = %err, "report proxy failed");
            return Err(AppError::new(
                StatusCode::GATEWAY_TIMEOUT,
                "proxy_error",
                Some(err.to_string()),
            ));
        }
    };

    if !reply.status.is_success() {
        let body = if reply.body.is_empty() {
            reply
                .status
                .canonical_reason()
                .unwrap_or_default()
                .to_string()
        } else {
            reply.body
        };
        return Ok((reply.status, body).into_response());
    }
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        reply.body,
    )
        .into_response())
}

/// Property lookup, forwarded verbatim with the upstream status.
///
/// - Method: `POST`
/// - Path: `/api/lookup`
async fn property_lookup(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, AppError> {
    crate::metrics::inc_requests("/api/lookup");
    let started = Instant::now();
    let reply = match state.valuation.property_lookup(&body, LOOKUP_TIMEOUT).await {
        Ok(reply) => reply,
        Err(ValuationError::MissingApiKey) => return Err(AppError::missing_api_key()),
        Err(err) => {
            warn!(target = "valuation.upstream", error = %err, "lookup proxy failed");
            return Err(AppError::new(StatusCode::BAD_GATEWAY, "proxy_error", None));
        }
    };
    info!(
        target = "valuation.upstream",
        status = reply.status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "property lookup"
    );
    let content_type = reply
        .headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    Ok((reply.status, [(header::CONTENT_TYPE, content_type)], reply.body).into_response())
}

/// Download a report artifact (PDF) through the service credential.
///
/// - Method: `GET`
/// - Path: `/api/artifact?url=/v1/...`
async fn artifact(
    State(state): State<AppState>,
    Query(query): Query<ArtifactQuery>,
) -> Result<Response, AppError> {
    crate::metrics::inc_requests("/api/artifact");
    let upstream = match state.valuation.fetch_artifact(&query.url).await {
        Ok(response) => response,
        Err(ValuationError::MissingApiKey) => return Err(AppError::missing_api_key()),
        Err(ValuationError::InvalidArtifactUrl) => {
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                "invalid_artifact_url",
                None,
            ));
        }
        Err(err) => {
            warn!(target = "valuation.upstream", error = %err, "artifact proxy failed");
            return Err(AppError::new(StatusCode::BAD_GATEWAY, "proxy_error", None));
        }
    };

    let status = upstream.status();
    if !status.is_success() {
        let text = upstream.text().await.unwrap_or_default();
        let body = if text.is_empty() {
            status.canonical_reason().unwrap_or_default().to_string()
        } else {
            text
        };
        return Ok((status, body).into_response());
    }

    let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
    let disposition = upstream
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("attachment"));
    let mut response = Body::from_stream(upstream.bytes_stream()).into_response();
    let headers = response.headers_mut();
    if let Some(value) = content_type {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}

/// Export already-flattened rows as CSV.
///
/// - Method: `POST`
/// - Path: `/api/csv`
/// - Body: `{"flatRows": [{...}, ...]}`
async fn export_csv(Json(req): Json<FlatRowsRequest>) -> Response {
    crate::metrics::inc_requests("/api/csv");
    let rows = req.flat_rows.unwrap_or_default();
    csv_attachment(EXPORT_FILENAME, export::rows_to_csv(&rows))
}

#[derive(Debug)]
enum AppError {
    Batch(BatchError),
    Http {
        status: StatusCode,
        error: String,
        detail: Option<String>,
    },
}

impl AppError {
    fn new(status: StatusCode, error: &str, detail: Option<String>) -> Self {
        Self::Http {
            status,
            error: error.to_string(),
            detail,
        }
    }

    fn bad_request(error: &str, detail: String) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error, Some(detail))
    }

    fn missing_api_key() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "missing_api_key", None)
    }
}

impl From<BatchError> for AppError {
    fn from(value: BatchError) -> Self {
        Self::Batch(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Batch(err) => {
                let status = match err.kind() {
                    BatchErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    BatchErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
                };
                warn!(target = "valuation.bulk", stage = err.stage(), "{err}");
                let payload = ApiError::new(err.stage(), Some(err.detail().to_string()));
                (status, Json(payload)).into_response()
            }
            AppError::Http {
                status,
                error,
                detail,
            } => (status, Json(ApiError::new(error, detail))).into_response(),
        }
    }
}
