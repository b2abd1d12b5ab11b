use std::time::Duration;

use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
};
use chrono::Utc;
use tokio::task::JoinHandle;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod credential;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;

// Routers segregated by access level (public, user, moderator, admin).
pub mod routes;
use routes::{admin, authenticated, moderator, public};

// --- Public Re-exports ---

pub use auth::SessionAuthenticator;
pub use config::AppConfig;
pub use error::{ApiError, AuthError, StoreError};
pub use repository::{MemoryStore, PostgresRepository, Storage};

/// ApiDoc
///
/// OpenAPI document aggregated from every `#[utoipa::path]` handler, served
/// at `/api-docs/openapi.json` and browsable under `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    info(title = "Web Blog API", description = "Blogging REST API with session authentication and role-based access."),
    paths(
        handlers::health::health,
        handlers::auth::register_user, handlers::auth::verify_user,
        handlers::auth::login_user, handlers::auth::logout_user,
        handlers::posts::list_posts, handlers::posts::list_user_posts, handlers::posts::get_post,
        handlers::posts::create_post, handlers::posts::update_post, handlers::posts::delete_post,
        handlers::comments::list_post_comments, handlers::comments::create_comment,
        handlers::comments::list_comments, handlers::comments::delete_comment,
        handlers::users::list_users
    ),
    components(
        schemas(
            models::User, models::Role, models::Post, models::Comment,
            models::RegisterUserPayload, models::VerifyUserPayload, models::LoginUserPayload,
            models::LogoutUserPayload, models::CreatePostPayload, models::UpdatePostPayload,
            models::CreateCommentPayload, models::TokenResponse, models::RegisteredUser,
            models::HealthEnvelope, error::ErrorEnvelope, error::ErrorBody,
        )
    ),
    tags(
        (name = "authentication", description = "Registration, verification and sessions"),
        (name = "posts", description = "Blog posts"),
        (name = "comments", description = "Comments on posts"),
        (name = "users", description = "User administration"),
        (name = "health", description = "Service information")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Everything a request may need, cloned into each handler and middleware.
/// All members are cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub authenticator: SessionAuthenticator,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(storage: Storage, config: AppConfig) -> Self {
        Self {
            authenticator: SessionAuthenticator::new(config.session_lifetime),
            storage,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for Storage {
    fn from_ref(app_state: &AppState) -> Storage {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for SessionAuthenticator {
    fn from_ref(app_state: &AppState) -> SessionAuthenticator {
        app_state.authenticator.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the `/v1` API from the per-access-level routers, then wraps it
/// in the request-id, tracing and CORS layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let api = Router::new()
        .merge(public::public_routes(&state))
        .merge(authenticated::authenticated_routes(&state))
        .merge(moderator::moderator_routes(&state))
        .merge(admin::admin_routes(&state))
        .method_not_allowed_fallback(handlers::method_not_allowed);

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/v1", api)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, correlated by the `x-request-id` set above.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}

/// spawn_session_sweeper
///
/// Periodically deletes expired sessions. Lazy deletion on validation stays in
/// place; this only bounds the growth of sessions nobody presents again.
pub fn spawn_session_sweeper(storage: Storage, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match storage.sessions.delete_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "expired sessions swept"),
                Err(e) => tracing::warn!(error = %e, "session sweep failed"),
            }
        }
    })
}
