// Customer Warehouse Loader - Web Server
// REST API with Axum: submit batches, inspect the audit trail

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use customer_warehouse::{
    init_logging, recent_batches, run_batch, AuditEntry, BatchResult, CustomerRecord,
    LoaderConfig, SqliteGateway, StorageError,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    config: Arc<LoaderConfig>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }

    fn err(status: StatusCode, message: String) -> Response {
        (
            status,
            Json(ApiResponse::<T> {
                success: false,
                data: None,
                error: Some(message),
            }),
        )
            .into_response()
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// POST /api/batches - Load a JSON array of customers as one batch
async fn post_batch(
    State(state): State<AppState>,
    Json(records): Json<Vec<CustomerRecord>>,
) -> Response {
    let config = state.config.clone();
    let joined = tokio::task::spawn_blocking(move || run_batch(&config, &records)).await;

    match joined {
        Ok(Ok(result)) => ApiResponse::<BatchResult>::ok(result),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "could not open warehouse session");
            ApiResponse::<BatchResult>::err(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(e) => ApiResponse::<BatchResult>::err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/audit - Most recent batches
async fn get_audit(State(state): State<AppState>) -> Response {
    let config = state.config.clone();
    let joined = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<AuditEntry>> {
        let gateway = SqliteGateway::open(&config.database_path)?;
        recent_batches(gateway.connection(), 50)
    })
    .await;

    match joined {
        Ok(Ok(entries)) => ApiResponse::ok(entries),
        Ok(Err(e)) => ApiResponse::<Vec<AuditEntry>>::err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        Err(e) => ApiResponse::<Vec<AuditEntry>>::err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/customers/:id - One customer as stored
async fn get_customer(State(state): State<AppState>, Path(customer_id): Path<i64>) -> Response {
    let config = state.config.clone();
    let joined = tokio::task::spawn_blocking(move || -> Result<Option<CustomerRecord>, StorageError> {
        let gateway = SqliteGateway::open(&config.database_path)?;
        gateway.get_customer(customer_id)
    })
    .await;

    match joined {
        Ok(Ok(Some(customer))) => ApiResponse::ok(customer),
        Ok(Ok(None)) => ApiResponse::<CustomerRecord>::err(
            StatusCode::NOT_FOUND,
            format!("customer {} not found", customer_id),
        ),
        Ok(Err(e)) => ApiResponse::<CustomerRecord>::err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        Err(e) => ApiResponse::<CustomerRecord>::err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    println!("🌐 Customer Warehouse Loader - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = LoaderConfig::default().with_env_overrides();
    println!("✓ Warehouse: {:?}", config.database_path);

    // Create shared state
    let state = AppState {
        config: Arc::new(config),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/batches", post(post_batch))
        .route("/audit", get(get_audit))
        .route("/customers/:id", get(get_customer))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   API: http://localhost:3000/api/batches");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;

    Ok(())
}
