use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Request, State, rejection::PathRejection},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    error::{ApiError, AuthError},
    models::{Post, User},
    repository::RoleRepository,
};

/// authenticate
///
/// Resolves `Authorization: <scheme> <token>` to a `User` and stores it in the
/// request extensions. Any failure short-circuits with 401.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())?.to_string();

    let user = state
        .authenticator
        .validate_token(state.storage.sessions.as_ref(), &token)
        .await?;

    tracing::debug!(user_id = user.id, role = %user.role.name, "request authenticated");
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Exactly two space-separated parts. The scheme itself is not interpreted.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MalformedHeader)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        [scheme, token] if !scheme.is_empty() && !token.is_empty() => Ok(*token),
        _ => Err(AuthError::MalformedHeader),
    }
}

/// RoleRequirement
///
/// State for one `authorize` layer: the role name every request through it
/// must reach, and where to resolve that name.
#[derive(Clone)]
pub struct RoleRequirement {
    pub roles: Arc<dyn RoleRepository>,
    pub role: &'static str,
}

pub fn require_role(state: &AppState, role: &'static str) -> RoleRequirement {
    RoleRequirement {
        roles: state.storage.roles.clone(),
        role,
    }
}

/// authorize
///
/// Compares the authenticated user's role level with the level of the
/// required role, looked up by name on every request. Must be layered inside
/// `authenticate`.
pub async fn authorize(
    State(requirement): State<RoleRequirement>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(level) = request.extensions().get::<User>().map(|u| u.role.level) else {
        tracing::error!(role = requirement.role, "authorize layered without authenticate");
        return Err(ApiError::Internal(
            "authorization reached without an authenticated user".to_string(),
        ));
    };

    let required = requirement
        .roles
        .find_by_name(requirement.role)
        .await
        .map_err(AuthError::AuthorizationLookupFailure)?;

    if level < required.level {
        return Err(AuthError::Forbidden.into());
    }

    Ok(next.run(request).await)
}

/// load_post
///
/// Loads the post named by the `{id}` path segment and attaches it to the
/// request for `PostContext`.
pub async fn load_post(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Path(id) = path.map_err(|e| ApiError::BadRequest(format!("id: {}", e.body_text())))?;

    let post = state.storage.posts.find(id).await?;
    request.extensions_mut().insert(post);

    Ok(next.run(request).await)
}

/// PostContext
///
/// The post attached by `load_post`.
#[derive(Debug, Clone)]
pub struct PostContext(pub Post);

impl<S> FromRequestParts<S> for PostContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Post>()
            .cloned()
            .map(PostContext)
            .ok_or_else(|| {
                tracing::error!("PostContext requested on a route without load_post");
                ApiError::Internal("post context missing".to_string())
            })
    }
}
