use crate::{
    AppState,
    handlers::{auth, comments, health, posts},
    middleware::load_post,
};
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session: service information, read-only
/// post and comment listings, and the register/verify/login/logout flow.
pub fn public_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // GET /health
        .route("/health", get(health::health))
        // GET /posts?limit=&offset=
        .route("/posts", get(posts::list_posts))
        // GET /users/{id}/posts
        .route("/users/{id}/posts", get(posts::list_user_posts))
        // GET /posts/{id}
        // The post is resolved by `load_post` before the handler runs.
        .route(
            "/posts/{id}",
            get(posts::get_post).route_layer(from_fn_with_state(state.clone(), load_post)),
        )
        // GET /posts/{id}/comments
        .route("/posts/{id}/comments", get(comments::list_post_comments))
        // --- Authentication Flow ---
        .route("/authentication/register", post(auth::register_user))
        .route("/authentication/verify", post(auth::verify_user))
        .route("/authentication/login", post(auth::login_user))
        .route("/authentication/logout", delete(auth::logout_user))
}
