//! # Portal HTTP API Module
//!
//! REST API over the [`Portal`] using axum.
//!
//! ## Endpoints
//!
//! - `GET /health`, `GET /status`, `GET /export`
//! - `GET|POST /areas`
//! - `GET /indicators`, `GET /indicators/tree`, `GET /indicators/{id}`,
//!   `GET /indicators/{id}/history`
//! - `POST /schemas/validate`, `POST /calculations/evaluate`
//! - `GET|POST /drafts`, `GET|PUT|DELETE /drafts/{id}`,
//!   `POST|DELETE /drafts/{id}/lock`, `POST /drafts/{id}/ready`,
//!   `POST /drafts/{id}/publish`
//! - `GET|POST /assessments`, `GET /assessments/{id}`,
//!   `PUT /assessments/{id}/responses/{indicator_id}`,
//!   `POST /assessments/{id}/movs`, `DELETE /assessments/{id}/movs/{mov_id}`,
//!   `POST /assessments/{id}/{submit,resubmit,review,rework,forward,finalize,feedback}`,
//!   `PUT /assessments/{id}/assessments/{indicator_id}`,
//!   `GET /assessments/{id}/result`
//!
//! Security settings (API key, rate limit, CORS origins) come from
//! [`PortalConfig`].

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{Caller, USER_ID_HEADER, USER_ROLE_HEADER, keys_match};
pub use middleware::create_rate_limiter;
pub use types::{
    ApiError, AreaQuery, AssessResponseRequest, CreateAssessmentRequest, CreateDraftRequest,
    ErrorResponse, EvaluateRequest, ExportResponse, FeedbackRequest, FinalizeRequest,
    HealthResponse, ReworkRequest, SaveDraftRequest, SaveDraftResponse, SaveResponseRequest,
    StatusResponse, TreeResponse, UnlockQuery, UnlockResponse, ValidateSchemaRequest,
    ValidateSchemaResponse, VerdictOverride,
};

use crate::config::PortalConfig;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use sglgb_core::{Portal, PortalError};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Request body ceiling.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub portal: Arc<RwLock<Portal>>,
    pub config: Arc<PortalConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(portal: Portal, config: PortalConfig) -> Self {
        Self {
            portal: Arc::new(RwLock::new(portal)),
            config: Arc::new(config),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

const CORS_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

fn cors_headers() -> [HeaderName; 4] {
    [
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        HeaderName::from_static(USER_ID_HEADER),
        HeaderName::from_static(USER_ROLE_HEADER),
    ]
}

/// Build the CORS layer from `cors_origins`:
/// - `"*"`: all origins
/// - unset: localhost only
/// - otherwise: the comma-separated origins
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed)
                    .allow_methods(CORS_METHODS)
                    .allow_headers(cors_headers())
            }
        }
        None => {
            tracing::info!("CORS: No origins configured, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(CORS_METHODS)
        .allow_headers(cors_headers())
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the router with all endpoints and middleware.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit, rate
/// limiting (when enabled), API key authentication (when configured).
pub fn create_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/export", get(handlers::export_handler))
        .route(
            "/areas",
            get(handlers::list_areas_handler).post(handlers::put_area_handler),
        )
        .route("/indicators", get(handlers::list_indicators_handler))
        .route("/indicators/tree", get(handlers::indicator_tree_handler))
        .route("/indicators/{id}", get(handlers::get_indicator_handler))
        .route(
            "/indicators/{id}/history",
            get(handlers::indicator_history_handler),
        )
        .route("/schemas/validate", post(handlers::validate_schema_handler))
        .route("/calculations/evaluate", post(handlers::evaluate_handler))
        .route(
            "/drafts",
            get(handlers::list_drafts_handler).post(handlers::create_draft_handler),
        )
        .route(
            "/drafts/{id}",
            get(handlers::get_draft_handler)
                .put(handlers::save_draft_handler)
                .delete(handlers::delete_draft_handler),
        )
        .route(
            "/drafts/{id}/lock",
            post(handlers::lock_draft_handler).delete(handlers::unlock_draft_handler),
        )
        .route("/drafts/{id}/ready", post(handlers::ready_draft_handler))
        .route("/drafts/{id}/publish", post(handlers::publish_draft_handler))
        .route(
            "/assessments",
            get(handlers::list_assessments_handler).post(handlers::create_assessment_handler),
        )
        .route("/assessments/{id}", get(handlers::get_assessment_handler))
        .route(
            "/assessments/{id}/responses/{indicator_id}",
            put(handlers::save_response_handler),
        )
        .route("/assessments/{id}/movs", post(handlers::attach_mov_handler))
        .route(
            "/assessments/{id}/movs/{mov_id}",
            delete(handlers::remove_mov_handler),
        )
        .route("/assessments/{id}/submit", post(handlers::submit_handler))
        .route("/assessments/{id}/resubmit", post(handlers::resubmit_handler))
        .route("/assessments/{id}/review", post(handlers::review_handler))
        .route("/assessments/{id}/rework", post(handlers::rework_handler))
        .route("/assessments/{id}/forward", post(handlers::forward_handler))
        .route("/assessments/{id}/finalize", post(handlers::finalize_handler))
        .route("/assessments/{id}/feedback", post(handlers::feedback_handler))
        .route(
            "/assessments/{id}/assessments/{indicator_id}",
            put(handlers::assess_response_handler),
        )
        .route("/assessments/{id}/result", get(handlers::result_handler));

    // Authentication (innermost - runs last on request)
    match config.api_key.as_deref() {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                Arc::<str>::from(key),
                auth::api_key_auth_middleware,
            ));
        }
        None => {
            tracing::warn!(
                "API key authentication DISABLED - all endpoints are publicly accessible! \
                 Set SGLGB_API_KEY to enable authentication."
            );
        }
    }

    if config.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", config.rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(config.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    // Outermost first: tracing, CORS, then the body limit
    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(config.cors_origins.as_deref()))
                .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server on the configured address.
pub async fn run_server(portal: Portal, config: PortalConfig) -> Result<(), PortalError> {
    let addr = config.addr();
    let router = create_router(AppState::new(portal, config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PortalError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("SGLGB portal listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| PortalError::IoError(format!("Server error: {}", e)))
}
