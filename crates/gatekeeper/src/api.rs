//! HTTP API: archive upload, release management, health and metrics

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gatekeeper_lib::{
    health::{ComponentStatus, HealthRegistry},
    Gatekeeper, ReleaseError, ReleaseManager, StructuredLogger, ToolError,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Multipart field carrying the uploaded archive
pub const ARCHIVE_FIELD: &str = "archive";

const UPLOAD_FORM: &str = r#"<!doctype html>
<html>
  <head><title>Chart Gatekeeper</title></head>
  <body>
    <h1>Deploy Helm charts</h1>
    <form action="/deploy" method="post" enctype="multipart/form-data">
      <input type="file" name="archive" accept=".zip,.tar.gz,.tgz">
      <input type="submit" value="Deploy">
    </form>
  </body>
</html>
"#;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gatekeeper: Gatekeeper,
    pub releases: ReleaseManager,
    pub health_registry: HealthRegistry,
    pub logger: StructuredLogger,
    pub max_archive_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct ReleaseRequest {
    #[serde(default)]
    release: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Pull the release name out of a JSON body, or explain why not
fn release_from_body(body: &Bytes) -> Result<String, Response> {
    let request: ReleaseRequest = serde_json::from_slice(body).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            format!("Request body must be JSON with a \"release\" name: {}", e),
        )
    })?;
    match request.release {
        Some(release) if !release.trim().is_empty() => Ok(release),
        _ => Err(error_response(
            StatusCode::BAD_REQUEST,
            "Missing \"release\" name in request body",
        )),
    }
}

async fn index() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

async fn deploy(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    let mut upload = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return error_response(e.status(), e.body_text()),
        };
        if field.name() != Some(ARCHIVE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return error_response(StatusCode::BAD_REQUEST, "No selected file");
        }
        match field.bytes().await {
            Ok(bytes) => {
                upload = Some((filename, bytes));
                break;
            }
            Err(e) => return error_response(e.status(), e.body_text()),
        }
    }

    let Some((filename, bytes)) = upload else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("No \"{}\" file in request", ARCHIVE_FIELD),
        );
    };

    match state
        .gatekeeper
        .process_archive(&filename, bytes.to_vec())
        .await
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to extract archive: {}", e),
        ),
    }
}

async fn undeploy(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let release = match release_from_body(&body) {
        Ok(release) => release,
        Err(response) => return response,
    };

    match state.releases.uninstall(&release).await {
        Ok(output) => {
            state.logger.log_release_uninstalled(&release, true);
            (
                StatusCode::OK,
                Json(json!({ "release": release, "status": "uninstalled", "log": output.stdout })),
            )
                .into_response()
        }
        Err(ReleaseError::Validation(message)) => error_response(StatusCode::BAD_REQUEST, message),
        Err(ReleaseError::Tool(e)) => {
            state.logger.log_release_uninstalled(&release, false);
            let log = e.captured_log().map(str::to_string).unwrap_or_else(|| e.to_string());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "release": release, "status": "error", "log": log })),
            )
                .into_response()
        }
    }
}

async fn status(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let release = match release_from_body(&body) {
        Ok(release) => release,
        Err(response) => return response,
    };

    match state.releases.status(&release).await {
        Ok(found) => {
            state.logger.log_release_status(&release, true);
            (
                StatusCode::OK,
                Json(json!({ "release": release, "status": "found", "details": found.details })),
            )
                .into_response()
        }
        Err(ReleaseError::Validation(message)) => error_response(StatusCode::BAD_REQUEST, message),
        Err(ReleaseError::Tool(ToolError::NonZeroExit { stderr, .. })) => {
            state.logger.log_release_status(&release, false);
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "release": release, "status": "not found or error", "log": stderr })),
            )
                .into_response()
        }
        Err(ReleaseError::Tool(e)) => {
            warn!(release = %release, error = %e, "Release status lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "release": release, "status": "error", "log": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_archive_bytes;
    Router::new()
        .route("/", get(index))
        .route("/deploy", post(deploy))
        .route("/undeploy", post(undeploy))
        .route("/status", post(status))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
