use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use tower::ServiceExt;
use web_blog::{
    AppConfig, AppState, MemoryStore, SessionAuthenticator, Storage, StoreError,
    auth::AuthUser,
    create_router,
    credential::Password,
    models::{NewPost, NewUser, Role, User},
    repository::{PostRepository, RoleRepository, UserRepository},
};

// --- Test Harness ---

struct Harness {
    store: Arc<MemoryStore>,
    state: AppState,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(Storage::memory(store.clone()), AppConfig::default());
        Self { store, state }
    }

    fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Creates a verified account with `role` and returns it with a live token.
    async fn account(&self, name: &str, role: &str) -> (User, String) {
        let (user, verification) = self
            .store
            .create_with_verification(
                NewUser {
                    email: format!("{name}@example.com"),
                    username: name.to_string(),
                    password: Password::from_hash(b"unused".to_vec()),
                },
                "user",
                Utc::now() + TimeDelta::hours(1),
            )
            .await
            .unwrap();
        self.store.verify(verification.id).await.unwrap();
        self.store.assign_role(user.id, role).await.unwrap();

        let auth = &self.state.authenticator;
        let token = auth.generate_token().unwrap();
        auth.create_session(self.store.as_ref(), &token, user.id)
            .await
            .unwrap();
        (user, token)
    }

    async fn post_by(&self, user: &User) -> i64 {
        PostRepository::create(
            self.store.as_ref(),
            NewPost {
                user_id: user.id,
                title: "First".to_string(),
                content: "Hello".to_string(),
            },
        )
        .await
        .unwrap()
        .id
    }
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// --- Extractor ---

#[tokio::test]
async fn test_auth_user_extractor_reads_the_attached_identity() {
    let user = User {
        id: 7,
        username: "attached".to_string(),
        ..User::default()
    };
    let (mut parts, _) = Request::builder()
        .uri("/")
        .extension(user)
        .body(())
        .unwrap()
        .into_parts();

    let AuthUser(resolved) = AuthUser::from_request_parts(&mut parts, &()).await.unwrap();
    assert_eq!(resolved.id, 7);
}

#[tokio::test]
async fn test_auth_user_extractor_rejects_without_identity() {
    let (mut parts, _) = Request::builder().uri("/").body(()).unwrap().into_parts();

    let rejection = AuthUser::from_request_parts(&mut parts, &()).await.unwrap_err();
    assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
}

// --- Authentication Layer ---

#[tokio::test]
async fn test_public_routes_need_no_session() {
    let harness = Harness::new();

    let response = harness
        .router()
        .oneshot(request(Method::GET, "/v1/posts", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(json_body(response).await, serde_json::json!({ "data": [] }));
}

#[tokio::test]
async fn test_missing_token_is_rejected_with_error_envelope() {
    let harness = Harness::new();

    let response = harness
        .router()
        .oneshot(request(
            Method::POST,
            "/v1/posts",
            None,
            Some(serde_json::json!({ "title": "t", "content": "c" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["status"], 401);
    assert!(body["error"]["timestamp"].is_i64());
}

#[tokio::test]
async fn test_expired_session_is_unauthorized_and_deleted() {
    let harness = Harness::new();
    let (_, token) = harness.account("late", "user").await;
    let digest = SessionAuthenticator::digest(&token);
    harness
        .store
        .set_session_expiry(&digest, Utc::now() - TimeDelta::seconds(5))
        .await;

    let response = harness
        .router()
        .oneshot(request(
            Method::POST,
            "/v1/posts",
            Some(&token),
            Some(serde_json::json!({ "title": "t", "content": "c" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(harness.store.session(&digest).await.is_none());
}

#[tokio::test]
async fn test_user_can_create_post_with_valid_session() {
    let harness = Harness::new();
    let (user, token) = harness.account("writer", "user").await;

    let response = harness
        .router()
        .oneshot(request(
            Method::POST,
            "/v1/posts",
            Some(&token),
            Some(serde_json::json!({ "title": "Hello", "content": "World" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["data"]["user_id"], user.id);
    assert_eq!(body["data"]["title"], "Hello");
}

#[tokio::test]
async fn test_unsupported_method_is_not_allowed_before_authentication() {
    let harness = Harness::new();
    let router = harness.router();

    let response = router
        .clone()
        .oneshot(request(Method::PUT, "/v1/posts/1", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["status"], 405);

    let response = router
        .oneshot(request(Method::PUT, "/v1/users", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// --- Authorization Layer ---

#[tokio::test]
async fn test_moderator_routes_reject_plain_users() {
    let harness = Harness::new();
    let (user, token) = harness.account("plain", "user").await;
    let post_id = harness.post_by(&user).await;

    let response = harness
        .router()
        .oneshot(request(
            Method::PATCH,
            &format!("/v1/posts/{post_id}"),
            Some(&token),
            Some(serde_json::json!({ "title": "Edited" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let unchanged = harness.store.find(post_id).await.unwrap();
    assert_eq!(unchanged.title, "First");
}

#[tokio::test]
async fn test_moderator_can_patch_and_delete_posts() {
    let harness = Harness::new();
    let (author, _) = harness.account("author", "user").await;
    let (_, token) = harness.account("warden", "moderator").await;
    let post_id = harness.post_by(&author).await;
    let router = harness.router();

    let response = router
        .clone()
        .oneshot(request(
            Method::PATCH,
            &format!("/v1/posts/{post_id}"),
            Some(&token),
            Some(serde_json::json!({ "title": "Edited" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["title"], "Edited");
    assert_eq!(body["data"]["content"], "Hello");

    let response = router
        .clone()
        .oneshot(request(Method::DELETE, &format!("/v1/posts/{post_id}"), Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = router
        .oneshot(request(Method::GET, &format!("/v1/posts/{post_id}"), None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_post_context_rejects_bad_and_unknown_ids() {
    let harness = Harness::new();
    let (_, token) = harness.account("checker", "moderator").await;
    let router = harness.router();

    let response = router
        .clone()
        .oneshot(request(Method::GET, "/v1/posts/not-a-number", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router
        .oneshot(request(Method::DELETE, "/v1/posts/999", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_users_listing_is_admin_only() {
    let harness = Harness::new();
    let (_, moderator) = harness.account("moddy", "moderator").await;
    let (_, admin) = harness.account("boss", "admin").await;
    let router = harness.router();

    let response = router
        .clone()
        .oneshot(request(Method::GET, "/v1/users", Some(&moderator), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = router
        .oneshot(request(Method::GET, "/v1/users?limit=1", Some(&admin), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let users = body["data"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert!(users[0].get("password").is_none());
}

#[tokio::test]
async fn test_comment_on_missing_post_is_not_found() {
    let harness = Harness::new();
    let (_, token) = harness.account("talker", "user").await;

    let response = harness
        .router()
        .oneshot(request(
            Method::POST,
            "/v1/posts/4242/comments",
            Some(&token),
            Some(serde_json::json!({ "content": "first!" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// --- Failing Role Lookup ---

struct BrokenRoles;

#[async_trait]
impl RoleRepository for BrokenRoles {
    async fn find_by_name(&self, _name: &str) -> Result<Role, StoreError> {
        Err(StoreError::Timeout)
    }
}

#[tokio::test]
async fn test_role_lookup_failure_is_internal_error() {
    let harness = Harness::new();
    let (_, token) = harness.account("unlucky", "admin").await;

    let mut state = harness.state.clone();
    state.storage.roles = Arc::new(BrokenRoles);

    let response = create_router(state)
        .oneshot(request(Method::GET, "/v1/users", Some(&token), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"]["message"], "internal server error");
}
