use crate::{
    AppState,
    handlers::{comments, posts},
    middleware::{authenticate, authorize, require_role},
};
use axum::{Router, middleware::from_fn_with_state, routing::post};

/// Authenticated Router Module
///
/// Content creation. Layers run outermost first: `authenticate` attaches the
/// session owner, then `authorize` checks it against the `user` level.
pub fn authenticated_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // POST /posts
        .route("/posts", post(posts::create_post))
        // POST /posts/{id}/comments
        .route("/posts/{id}/comments", post(comments::create_comment))
        .route_layer(from_fn_with_state(require_role(state, "user"), authorize))
        .route_layer(from_fn_with_state(state.clone(), authenticate))
}
