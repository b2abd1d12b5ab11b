use crate::{
    AppState,
    handlers::users,
    middleware::{authenticate, authorize, require_role},
};
use axum::{Router, middleware::from_fn_with_state, routing::get};

/// Admin Router Module
///
/// User management. Everything here sits behind the `admin` level.
pub fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // GET /users
        .route("/users", get(users::list_users))
        .route_layer(from_fn_with_state(require_role(state, "admin"), authorize))
        .route_layer(from_fn_with_state(state.clone(), authenticate))
}
