//! Axum-based HTTP gateway for the booking API and dashboard pages.
//!
//! Provides:
//! - Per-client rate limiting (login attempts and general API traffic)
//! - CORS, security headers and request body limits (10KB max)
//! - Request timeouts (30s) to prevent slow-loris attacks
//! - Access logging through `tower_http::trace`

pub mod assets;
pub mod auth;
pub mod bookings;
pub mod rate_limit;

use crate::auth::SessionService;
use crate::booking;
use crate::config::{Config, Environment, GatewayConfig};
use crate::store::{self, Store};
use crate::validation::FieldError;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, Method, Response, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use rate_limit::GatewayRateLimiter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
    script-src 'self' 'unsafe-inline' 'unsafe-hashes'; \
    script-src-attr 'unsafe-inline'; \
    style-src 'self' 'unsafe-inline'; \
    img-src 'self' data:";

const STRICT_TRANSPORT_SECURITY: &str = "max-age=15552000; includeSubDomains";

/// JSON status + body pair returned by every API handler.
pub type ApiResponse = (StatusCode, Json<serde_json::Value>);

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub sessions: Arc<SessionService>,
    pub rate_limiter: Arc<GatewayRateLimiter>,
    pub environment: Environment,
    pub min_password_len: usize,
    pub notification_limit: usize,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, sessions: Arc<SessionService>, config: &Config) -> Self {
        Self {
            store,
            sessions,
            rate_limiter: Arc::new(GatewayRateLimiter::new(
                config.gateway.login_rate_limit_per_minute,
                config.gateway.api_rate_limit_per_minute,
            )),
            environment: config.environment,
            min_password_len: config.auth.min_password_len,
            notification_limit: config.notifications.list_limit,
            started_at: Instant::now(),
        }
    }
}

// ── Shared responses ────────────────────────────────────────────────

pub(crate) fn failure(status: StatusCode, message: &str) -> ApiResponse {
    (
        status,
        Json(serde_json::json!({"success": false, "message": message})),
    )
}

pub(crate) fn validation_failed(errors: Vec<FieldError>) -> ApiResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "success": false,
            "message": "Validation error",
            "errors": errors,
        })),
    )
}

/// Body could not be read as JSON. Oversized bodies keep their 413.
pub(crate) fn bad_body(rejection: &JsonRejection) -> ApiResponse {
    let status = match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    };
    failure(status, &format!("Invalid request: {}", rejection.body_text()))
}

/// Log an internal failure and answer with the bare message. The auth routes
/// use this in every environment: their callers are unauthenticated.
pub(crate) fn opaque_error(message: &str, err: &dyn std::fmt::Display) -> ApiResponse {
    tracing::error!("{message}: {err}");
    failure(StatusCode::INTERNAL_SERVER_ERROR, message)
}

/// Log an internal failure; expose its detail only outside production.
pub(crate) fn internal_error(
    state: &AppState,
    message: &str,
    err: &dyn std::fmt::Display,
) -> ApiResponse {
    if state.environment.is_production() {
        return opaque_error(message, err);
    }
    tracing::error!("{message}: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "success": false,
            "message": message,
            "detail": err.to_string(),
        })),
    )
}

// ── Router ──────────────────────────────────────────────────────────

fn cors_layer(config: &GatewayConfig, environment: Environment) -> CorsLayer {
    let origin = if config.allowed_origins.is_empty() || !environment.is_production() {
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin: {origin}");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

/// Assemble routes and middleware. Exposed separately from [`run_gateway`]
/// so tests can drive the full stack with `oneshot`.
pub fn build_router(state: AppState, config: &GatewayConfig) -> Router {
    let login = Router::new()
        .route("/auth/login", post(auth::handle_login))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_login,
        ));

    let api = Router::new()
        .route("/health", get(handle_health))
        .route(
            "/bookings",
            get(bookings::handle_list_bookings).post(bookings::handle_create_booking),
        )
        .route(
            "/bookings/{id}",
            put(bookings::handle_update_booking).delete(bookings::handle_delete_booking),
        )
        .route(
            "/notifications",
            get(bookings::handle_list_notifications).post(bookings::handle_create_notification),
        )
        .route(
            "/notifications/{id}",
            put(bookings::handle_update_notification)
                .delete(bookings::handle_delete_notification),
        )
        .route("/auth/verify", post(auth::handle_verify))
        .route("/auth/logout", post(auth::handle_logout))
        .route("/auth/change-password", post(auth::handle_change_password))
        .route(
            "/shop-status",
            get(bookings::handle_get_shop_status).post(bookings::handle_set_shop_status),
        )
        .merge(login)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_api,
        ));

    let hsts = state
        .environment
        .is_production()
        .then(|| HeaderValue::from_static(STRICT_TRANSPORT_SECURITY));
    let cors = cors_layer(config, state.environment);

    Router::new()
        .nest("/api", api)
        .route("/", get(assets::handle_index))
        .route("/dashboard", get(assets::handle_dashboard))
        .route("/today", get(assets::handle_today))
        .fallback(assets::handle_static)
        .with_state(state)
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::STRICT_TRANSPORT_SECURITY,
            move |_: &Response<Body>| hsts.clone(),
        ))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP gateway until Ctrl-C / SIGTERM, then close the store.
pub async fn run_gateway(config: Config) -> Result<()> {
    let store = store::create_store(&config.store)?;

    let sessions = Arc::new(SessionService::new(store.clone()));

    // Startup proceeds even when the store is down; handlers report the outage.
    if let Err(e) = sessions.bootstrap(&config.auth.default_admin_password) {
        tracing::warn!("Admin credential bootstrap failed: {e}");
    }
    if let Err(e) = booking::shop::init_shop_status(store.as_ref()) {
        tracing::warn!("Shop status initialization failed: {e}");
    }
    match sessions.purge_expired() {
        Ok(removed) if removed > 0 => tracing::info!(removed, "Removed expired sessions"),
        Ok(_) => {}
        Err(e) => tracing::warn!("Expired session sweep failed: {e}"),
    }

    let cleanup_task = if config.cleanup.enabled {
        let schedule = config.cleanup_schedule()?;
        tracing::info!(
            schedule = %config.cleanup.schedule,
            timezone = %config.cleanup.timezone,
            "Daily booking cleanup scheduled"
        );
        Some(booking::cleanup::spawn_daily_cleanup(store.clone(), schedule))
    } else {
        tracing::info!("Daily booking cleanup disabled");
        None
    };

    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.gateway.host, config.gateway.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let actual_port = listener.local_addr()?.port();

    let state = AppState::new(store.clone(), sessions, &config);
    let app = build_router(state, &config.gateway);

    tracing::info!(
        environment = config.environment.as_str(),
        store = store.name(),
        "Tea booking server listening on http://{}:{actual_port}",
        config.gateway.host
    );
    tracing::info!("Customer page: http://{}:{actual_port}/", config.gateway.host);
    tracing::info!("Dashboard: http://{}:{actual_port}/dashboard", config.gateway.host);

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    if let Some(task) = cleanup_task {
        task.abort();
    }
    if let Err(e) = store.close() {
        tracing::warn!("Store did not close cleanly: {e}");
    }
    tracing::info!("Server stopped");

    served.context("HTTP server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /api/health: always public
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let connected = state.store.health_check();
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "uptime": state.started_at.elapsed().as_secs_f64(),
        "database": if connected { "connected" } else { "disconnected" },
        "store": state.store.name(),
        "environment": state.environment.as_str(),
    }))
}
