use anyhow::anyhow;
use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            ApiResponse, ChangePasswordRequest, LoginRequest, RegisterRequest,
            UpdateProfileRequest,
        },
        extractors::{CurrentUser, JsonBody},
        jwt::JwtKeys,
        middleware::require_auth,
        repo_types::UserUpdate,
        validation::{
            validate_change_password, validate_login, validate_profile_update, validate_register,
        },
    },
    error::{ApiError, INVALID_CREDENTIALS, INVALID_TOKEN, WRONG_CURRENT_PASSWORD},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn me_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me).put(update_me))
        .route("/change-password", put(change_password))
        .route("/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse>), ApiError> {
    let new_user = validate_register(payload).map_err(|e| {
        warn!(error = %e, "invalid registration");
        e
    })?;

    if state.users.find_by_email(&new_user.email).await?.is_some() {
        warn!(email = %new_user.email, "email already registered");
        return Err(ApiError::DuplicateEmail);
    }

    // Name and email format are validated here. A concurrent registration
    // can still win between the check and the insert; the store reports that
    // as DuplicateEmail.
    let user = state.users.create(new_user).await?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(
            ApiResponse::ok()
                .message("Registration successful")
                .token(token)
                .user(&user),
        ),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let (email, password) = validate_login(payload)?;

    let user = match state.users.find_by_email_with_password(&email).await? {
        Some(u) if u.is_active => u,
        Some(u) => {
            warn!(user_id = %u.id, "login to deactivated account");
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
        }
        None => {
            warn!(email = %email, "login unknown email");
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
        }
    };

    let hash = user
        .password_hash
        .clone()
        .ok_or_else(|| anyhow!("password hash not loaded for {}", user.id))?;
    if !state.users.hasher().verify_async(password, hash).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(
        ApiResponse::ok()
            .message("Login successful")
            .token(token)
            .user(&user),
    ))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<ApiResponse> {
    Json(ApiResponse::ok().user(&user))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(payload): JsonBody<UpdateProfileRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let update = validate_profile_update(payload)?;
    let updated = state.users.update_by_id(user.id, update).await?;

    info!("profile updated");
    Ok(Json(
        ApiResponse::ok()
            .message("Profile updated")
            .user(&updated),
    ))
}

/// The caller's existing token stays valid until it expires.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(payload): JsonBody<ChangePasswordRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let (current, new) = validate_change_password(payload)?;

    let stored = state
        .users
        .find_by_id_with_password(user.id)
        .await?
        .ok_or(ApiError::Unauthorized(INVALID_TOKEN))?;
    let hash = stored
        .password_hash
        .ok_or_else(|| anyhow!("password hash not loaded for {}", user.id))?;

    if !state.users.hasher().verify_async(current, hash).await? {
        warn!("current password mismatch");
        return Err(ApiError::Unauthorized(WRONG_CURRENT_PASSWORD));
    }

    state
        .users
        .update_by_id(
            user.id,
            UserUpdate {
                password: Some(new),
                ..Default::default()
            },
        )
        .await?;

    info!("password changed");
    Ok(Json(
        ApiResponse::ok().message("Password changed successfully"),
    ))
}

/// Tokens are stateless; the client discards its copy.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn logout(CurrentUser(user): CurrentUser) -> Json<ApiResponse> {
    info!("user logged out");
    Json(ApiResponse::ok().message("Logged out successfully"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::{
        app::build_app,
        auth::memory::InMemoryUserRepository,
        error::{EMAIL_TAKEN, NO_TOKEN},
    };

    use super::*;

    struct TestApp {
        app: Router,
        state: AppState,
        repo: Arc<InMemoryUserRepository>,
    }

    fn test_app() -> TestApp {
        let repo = Arc::new(InMemoryUserRepository::new());
        let state = AppState::fake_with_repo(repo.clone());
        TestApp {
            app: build_app(state.clone()),
            state,
            repo,
        }
    }

    impl TestApp {
        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, json)
        }

        async fn register(&self, name: &str, email: &str, password: &str) -> (StatusCode, Value) {
            self.call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "name": name, "email": email, "password": password })),
            )
            .await
        }

        async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
            self.call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await
        }
    }

    fn token_of(body: &Value) -> String {
        body["token"].as_str().expect("token in body").to_string()
    }

    #[tokio::test]
    async fn full_credential_lifecycle() {
        let t = test_app();

        let (status, body) = t.register("Alice", "alice@x.com", "secret1").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        token_of(&body);

        let (status, body) = t.login("alice@x.com", "secret1").await;
        assert_eq!(status, StatusCode::OK);
        let token = token_of(&body);

        let (status, body) = t.call(Method::GET, "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["name"], "Alice");

        let (status, body) = t
            .call(
                Method::PUT,
                "/api/auth/change-password",
                Some(&token),
                Some(json!({ "currentPassword": "secret1", "newPassword": "secret2" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body.get("token").is_none());
        assert!(body.get("user").is_none());

        let (status, _) = t.login("alice@x.com", "secret1").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = t.login("alice@x.com", "secret2").await;
        assert_eq!(status, StatusCode::OK);

        // no revocation: the pre-change token still works
        let (status, _) = t.call(Method::GET, "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn register_returns_public_view_and_valid_token() {
        let t = test_app();
        let (status, body) = t.register("Alice", "Alice@X.com", "secret1").await;
        assert_eq!(status, StatusCode::CREATED);

        let user = body["user"].as_object().unwrap();
        assert!(!user.contains_key("passwordHash"));
        assert!(!user.contains_key("password"));
        assert!(!body.to_string().contains("$argon2"));
        assert_eq!(user["email"], "alice@x.com");
        assert_eq!(user["role"], "user");
        assert_eq!(user["avatar"], "");
        assert_eq!(user["isActive"], true);

        let id: Uuid = user["id"].as_str().unwrap().parse().unwrap();
        assert_eq!(t.state.keys.verify(&token_of(&body)).unwrap(), id);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let t = test_app();
        let (status, _) = t.register("Alice", "alice@x.com", "secret1").await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = t.register("Other", " ALICE@x.com", "secret9").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], EMAIL_TAKEN);
        assert_eq!(t.repo.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_duplicate_registrations_have_one_winner() {
        let t = test_app();
        let (a, b) = tokio::join!(
            t.register("Alice", "race@x.com", "secret1"),
            t.register("Alice", "race@x.com", "secret1"),
        );
        let mut statuses = [a.0, b.0];
        statuses.sort();
        assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);
        assert_eq!(t.repo.len().await, 1);
    }

    #[tokio::test]
    async fn register_validation_errors() {
        let t = test_app();

        let (status, body) = t
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "email": "alice@x.com", "password": "secret1" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Please provide name, email and password");

        let (status, body) = t.register("Alice", "alice@x.com", "12345").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Password must be at least 6 characters");

        let (status, body) = t.register("Alice", "not-an-email", "secret1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid email address");

        let (status, body) = t.register("A", "alice@x.com", "secret1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Name must be at least 2 characters");

        assert_eq!(t.repo.len().await, 0);
    }

    #[tokio::test]
    async fn taken_email_conflicts_before_name_is_checked() {
        let t = test_app();
        t.register("Alice", "alice@x.com", "secret1").await;

        let (status, body) = t.register("A", "alice@x.com", "secret1").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], EMAIL_TAKEN);
    }

    #[tokio::test]
    async fn whitespace_password_can_register_and_log_in() {
        let t = test_app();
        let (status, _) = t.register("Alice", "alice@x.com", "      ").await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = t.login("alice@x.com", "      ").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = t.login("alice@x.com", "     ").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let t = test_app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = t.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Invalid request body");
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let t = test_app();
        t.register("Alice", "alice@x.com", "secret1").await;

        let wrong_password = t.login("alice@x.com", "nope-nope").await;
        let unknown_email = t.login("bob@x.com", "secret1").await;
        assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_password, unknown_email);
        assert_eq!(wrong_password.1["message"], INVALID_CREDENTIALS);
    }

    #[tokio::test]
    async fn login_requires_fields() {
        let t = test_app();
        let (status, body) = t
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "alice@x.com" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Please provide email and password");
    }

    #[tokio::test]
    async fn deactivated_account_is_locked_out() {
        let t = test_app();
        let (_, body) = t.register("Alice", "alice@x.com", "secret1").await;
        let token = token_of(&body);
        let id: Uuid = body["user"]["id"].as_str().unwrap().parse().unwrap();
        t.repo.set_active(id, false).await;

        let (status, body) = t.login("alice@x.com", "secret1").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], INVALID_CREDENTIALS);

        let (status, body) = t.call(Method::GET, "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], INVALID_TOKEN);
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let t = test_app();
        for (method, uri) in [
            (Method::GET, "/api/auth/me"),
            (Method::PUT, "/api/auth/me"),
            (Method::PUT, "/api/auth/change-password"),
            (Method::POST, "/api/auth/logout"),
        ] {
            let (status, body) = t.call(method, uri, None, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body["message"], NO_TOKEN);
        }
    }

    #[tokio::test]
    async fn bad_tokens_get_one_uniform_message() {
        let t = test_app();
        let (_, body) = t.register("Alice", "alice@x.com", "secret1").await;
        let token = token_of(&body);
        let tampered = format!("{}x", token);
        let ghost = t.state.keys.sign(Uuid::new_v4()).unwrap();
        let id: Uuid = body["user"]["id"].as_str().unwrap().parse().unwrap();
        let stale = t.state.keys.sign_expired(id).unwrap();

        let forged = t.call(Method::GET, "/api/auth/me", Some(&tampered), None).await;
        let garbage = t.call(Method::GET, "/api/auth/me", Some("abc"), None).await;
        let unknown = t.call(Method::GET, "/api/auth/me", Some(&ghost), None).await;
        let expired = t.call(Method::GET, "/api/auth/me", Some(&stale), None).await;

        assert_eq!(forged.0, StatusCode::UNAUTHORIZED);
        assert_eq!(forged.1["message"], INVALID_TOKEN);
        assert_eq!(forged, garbage);
        assert_eq!(forged, unknown);
        assert_eq!(expired, unknown);
    }

    #[tokio::test]
    async fn update_profile_changes_only_name_and_avatar() {
        let t = test_app();
        let (_, body) = t.register("Alice", "alice@x.com", "secret1").await;
        let token = token_of(&body);

        let (status, body) = t
            .call(
                Method::PUT,
                "/api/auth/me",
                Some(&token),
                Some(json!({
                    "name": "Alicia",
                    "avatar": "https://cdn.example/a.png",
                    "email": "evil@x.com",
                    "role": "admin"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["name"], "Alicia");
        assert_eq!(body["user"]["avatar"], "https://cdn.example/a.png");
        assert_eq!(body["user"]["email"], "alice@x.com");
        assert_eq!(body["user"]["role"], "user");

        // empty fields are ignored
        let (status, body) = t
            .call(
                Method::PUT,
                "/api/auth/me",
                Some(&token),
                Some(json!({ "name": "" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["name"], "Alicia");

        let (status, body) = t
            .call(
                Method::PUT,
                "/api/auth/me",
                Some(&token),
                Some(json!({ "name": "A" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Name must be at least 2 characters");
    }

    #[tokio::test]
    async fn change_password_rejects_wrong_current() {
        let t = test_app();
        let (_, body) = t.register("Alice", "alice@x.com", "secret1").await;
        let token = token_of(&body);

        let (status, body) = t
            .call(
                Method::PUT,
                "/api/auth/change-password",
                Some(&token),
                Some(json!({ "currentPassword": "wrong1", "newPassword": "secret2" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], WRONG_CURRENT_PASSWORD);

        let (status, body) = t
            .call(
                Method::PUT,
                "/api/auth/change-password",
                Some(&token),
                Some(json!({ "currentPassword": "secret1", "newPassword": "123" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "New password must be at least 6 characters");

        let (status, _) = t.login("alice@x.com", "secret1").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_always_succeeds_when_authenticated() {
        let t = test_app();
        let (_, body) = t.register("Alice", "alice@x.com", "secret1").await;
        let token = token_of(&body);

        for _ in 0..2 {
            let (status, body) = t
                .call(Method::POST, "/api/auth/logout", Some(&token), None)
                .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["success"], true);
        }
    }
}
