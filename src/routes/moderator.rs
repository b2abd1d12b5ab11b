use crate::{
    AppState,
    handlers::{comments, posts},
    middleware::{authenticate, authorize, load_post, require_role},
};
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, patch},
};

/// Moderator Router Module
///
/// Edits and removals of any post or comment, and the global comment listing.
/// The post context is loaded only after the role check has passed, so an
/// unauthorized caller cannot probe which post ids exist.
pub fn moderator_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // PATCH/DELETE /posts/{id}
        .route(
            "/posts/{id}",
            patch(posts::update_post)
                .delete(posts::delete_post)
                .route_layer(from_fn_with_state(state.clone(), load_post)),
        )
        // GET /posts/comments
        .route("/posts/comments", get(comments::list_comments))
        // DELETE /posts/comments/{id}
        .route("/posts/comments/{id}", delete(comments::delete_comment))
        .route_layer(from_fn_with_state(require_role(state, "moderator"), authorize))
        .route_layer(from_fn_with_state(state.clone(), authenticate))
}
