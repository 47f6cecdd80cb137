//! Route configuration and setup.
//!
//! Health probes and the OpenAPI document are public; everything else sits behind the
//! provisioning secret.

pub mod health;

use crate::auth::{provisioning_auth_middleware, AuthState};
use crate::handlers;
use crate::state::AppState;
use axum::{
    http::{HeaderName, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use nexus_core::Config;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::constants::PROVISIONING_STATUS_PATH;

/// Provisioning payloads are small JSON documents.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router<()>, anyhow::Error> {
    let cors = setup_cors(config)?;
    let auth_state = Arc::new(AuthState {
        provisioning_secret: config.provisioning_api_secret().to_string(),
    });

    let protected_routes = protected_routes().layer(axum::middleware::from_fn_with_state(
        auth_state,
        provisioning_auth_middleware,
    ));

    let http_concurrency_limit = config.http_concurrency_limit();
    tracing::info!(
        http_concurrency_limit = http_concurrency_limit,
        "HTTP concurrency limit layer enabled"
    );

    let app = public_routes()
        .merge(protected_routes)
        .nest(
            "/docs",
            utoipa_rapidoc::RapiDoc::new("/api/openapi.json")
                .path("/docs")
                .into(),
        )
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let cors = if config.cors_origins().iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins()
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                HeaderName::from_static("x-provisioning-secret"),
            ])
    };
    Ok(cors)
}

fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/live", get(health::liveness_check))
        .route("/ready", get(health::readiness_check))
        .route(
            "/api/openapi.json",
            get(|| async { Json(crate::api_doc::get_openapi_spec()) }),
        )
}

fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/tenants/check-subdomain",
            post(handlers::subdomain::check_subdomain),
        )
        .route("/tenants/provision", post(handlers::provision::provision_tenant))
        .route("/tenants/by-email", get(handlers::tenants::get_tenant_by_email))
        .route("/tenants/{subdomain}", get(handlers::tenants::get_tenant))
        .route(
            "/tenants/{subdomain}/resume",
            post(handlers::provision::resume_tenant),
        )
        .route(
            "/tenants/{subdomain}/rotate-credentials",
            post(handlers::credentials::rotate_credentials),
        )
        .route(
            "/tenants/{subdomain}/status",
            post(handlers::tenants::change_status),
        )
        .route(
            "/tenant/update-credentials",
            post(handlers::credentials::update_credentials),
        )
        .route(
            PROVISIONING_STATUS_PATH,
            get(handlers::provisioning_status::provisioning_status),
        )
}
