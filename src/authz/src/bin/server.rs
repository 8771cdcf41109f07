//! # Warden Authorization Server
//!
//! HTTP front end for the access engine. Exposes access checks and
//! action listings over JSON.
//!
//! ## Endpoints
//!
//! - `POST /v1/authorize/access` - Access check
//! - `POST /v1/authorize/actions` - List allowed actions on one or
//!   more resources
//! - `GET /health` - Health check
//!
//! ## Configuration
//!
//! Environment variables:
//! - `PORT` - HTTP server port (default: 8080)
//! - `RUST_LOG` - Log level (default: info)
//! - `WARDEN_SUPER_ORG` - Organization whose members are superusers
//! - `DATABASE_URL` - PostgreSQL connection string; in-memory stores
//!   when unset

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    serve, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_authz::{
    AccessEngine, AuthzError, CheckRequest, DirectoryStore, EngineConfig, ErrorKind,
    InMemoryDirectoryStore, InMemoryPolicyStore, PolicyStore, ResourceActions,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    engine: Arc<AccessEngine>,
    start_time: std::time::Instant,
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// Application error wrapper mapping engine errors onto HTTP statuses
#[derive(Debug)]
struct AppError(AuthzError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self.0.kind() {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, "validation"),
            ErrorKind::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            ErrorKind::Conflict => (StatusCode::CONFLICT, "conflict"),
            ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: self.0.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        AppError(err)
    }
}

/// Access check request body
#[derive(Debug, Deserialize)]
struct AccessBody {
    user_id: String,
    action: String,
    resource: String,
    organization_id: String,
    /// Organization to impersonate; superusers only
    #[serde(default)]
    org: Option<String>,
    #[serde(default)]
    context: HashMap<String, String>,
}

/// Access check response body
#[derive(Debug, Serialize)]
struct AccessResponse {
    access: bool,
}

/// Action listing request body; `resource` for one resource,
/// `resources` for several
#[derive(Debug, Deserialize)]
struct ActionsBody {
    user_id: String,
    organization_id: String,
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    resources: Vec<String>,
}

/// Action listing response body
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ActionsResponse {
    Single { actions: Vec<String> },
    Multi { resources: Vec<ResourceActions> },
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    version: String,
}

/// POST /v1/authorize/access
async fn authorize_access(
    State(state): State<AppState>,
    Json(body): Json<AccessBody>,
) -> Result<Json<AccessResponse>, AppError> {
    let request = CheckRequest {
        user_id: body.user_id,
        action: body.action,
        resource: body.resource,
        organization_id: body.organization_id,
        impersonate: body.org,
        context: body.context,
    };

    let access = state.engine.is_authorized(&request).await?;
    Ok(Json(AccessResponse {
        access: access.access,
    }))
}

/// POST /v1/authorize/actions
async fn authorize_actions(
    State(state): State<AppState>,
    Json(body): Json<ActionsBody>,
) -> Result<Json<ActionsResponse>, AppError> {
    if let Some(resource) = body.resource {
        let actions = state
            .engine
            .list_actions(&body.user_id, &resource, &body.organization_id)
            .await?;
        return Ok(Json(ActionsResponse::Single { actions }));
    }

    let resources = state
        .engine
        .list_actions_multi(&body.user_id, &body.resources, &body.organization_id)
        .await?;
    Ok(Json(ActionsResponse::Multi { resources }))
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: warden_authz::VERSION.to_string(),
    })
}

/// Create the HTTP router with all endpoints
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/v1/authorize/access", post(authorize_access))
        .route("/v1/authorize/actions", post(authorize_actions))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(trace).layer(cors))
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Starting graceful shutdown");
}

/// Build the engine stores from the environment
async fn build_stores() -> anyhow::Result<(Arc<dyn DirectoryStore>, Arc<dyn PolicyStore>)> {
    #[cfg(feature = "postgres")]
    if let Ok(database_url) = std::env::var("DATABASE_URL") {
        use warden_authz::{PostgresDirectoryStore, PostgresPolicyStore};

        info!("Connecting to PostgreSQL");
        let directory = PostgresDirectoryStore::connect(&database_url).await?;
        directory.run_migrations().await?;
        let policies = PostgresPolicyStore::from_pool(directory.pool().clone());
        return Ok((Arc::new(directory), Arc::new(policies)));
    }

    info!("DATABASE_URL not set, using in-memory stores");
    Ok((
        Arc::new(InMemoryDirectoryStore::new()),
        Arc::new(InMemoryPolicyStore::new()),
    ))
}

/// Main server entrypoint
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Warden Authorization Server v{}", warden_authz::VERSION);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let super_organization = std::env::var("WARDEN_SUPER_ORG").ok();

    info!("Configuration:");
    info!("  Port: {}", port);
    info!(
        "  Super organization: {}",
        super_organization.as_deref().unwrap_or("<none>")
    );

    let (directory, policies) = build_stores().await?;

    let config = EngineConfig { super_organization };
    let engine = AccessEngine::new(config, directory, policies);

    let state = AppState {
        engine: Arc::new(engine),
        start_time: std::time::Instant::now(),
    };

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}
