use axum::{Json, extract::State};

use crate::{
    AppState,
    models::{DataEnvelope, HealthEnvelope},
};

pub const API_TITLE: &str = "Web Blog API";
pub const API_DESCRIPTION: &str = "Blogging REST API with session authentication and role-based access.";

#[utoipa::path(
    get,
    path = "/v1/health",
    tag = "health",
    responses((status = 200, description = "Service information", body = DataEnvelope<HealthEnvelope>))
)]
pub async fn health(State(state): State<AppState>) -> Json<DataEnvelope<HealthEnvelope>> {
    Json(DataEnvelope::new(HealthEnvelope {
        title: API_TITLE.to_string(),
        description: API_DESCRIPTION.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        url: state.config.address.clone(),
    }))
}
