use axum::{Json, extract::State};

use crate::{
    AppState,
    error::{ApiError, ErrorEnvelope},
    models::{DataEnvelope, FilterQuery, User},
};

/// list_users
///
/// Admin-only, paginated. Password hashes are never serialized.
#[utoipa::path(
    get,
    path = "/v1/users",
    tag = "users",
    params(FilterQuery),
    responses(
        (status = 200, description = "Users", body = DataEnvelope<Vec<User>>),
        (status = 403, description = "Role below admin", body = ErrorEnvelope)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    filter: FilterQuery,
) -> Result<Json<DataEnvelope<Vec<User>>>, ApiError> {
    let users = state.storage.users.find_all(filter).await?;
    Ok(Json(DataEnvelope::new(users)))
}
