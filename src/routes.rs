//! Route definitions and router setup
//!
//! Read-mostly HTTP surface over the governance core plus the audit trail.

mod audit;
mod governance;

use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    let cors = build_cors_layer(settings);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        .route("/health", get(health_check))
        // Revision chain and drift
        .route("/api/revisions", get(governance::list_revisions))
        .route("/api/revisions/reload", post(governance::reload_revisions))
        .route("/api/drift", get(governance::check_drift))
        // Governance runs and reports
        .route("/api/governance/runs", post(governance::create_run))
        .route("/api/governance/runs/latest", get(governance::latest_run))
        .route("/api/governance/dashboard", get(governance::dashboard))
        .route("/api/governance/score", get(governance::score))
        .route("/api/governance/summary", get(governance::summary))
        // Audit trail
        .route("/api/audit", get(audit::list_records).post(audit::append_record))
        .route(
            "/api/audit/{id}",
            get(audit::get_record)
                .put(audit::update_record)
                .delete(audit::delete_record),
        )
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let layer = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins)
    };

    layer
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// Health check endpoint
async fn health_check(
    axum::extract::State(state): axum::extract::State<SharedState>,
) -> axum::Json<serde_json::Value> {
    let history = state.history.read().await;
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "revisions": history.len(),
        "tip": history.tip(),
        "audit_engine": state.audit.engine(),
    }))
}
