use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, RequestPartsExt, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

use crate::directory::users::{User, UserProfile};
use crate::security::AccountPasswordHasher;
use crate::shared::enums::UserRole;
use crate::shared::state::AppState;

pub const AUTH_COOKIE: &str = "auth_token";

// ============================================================================
// Extractors
// ============================================================================

/// Resolves the session token carried by the request into a full user row.
/// Handlers take this as an argument when they require a logged-in caller.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);

        let token = extract_token(parts)
            .await
            .ok_or((StatusCode::UNAUTHORIZED, "Authentication required"))?;

        let session = {
            let mut manager = app_state.session_manager.lock().await;
            manager
                .resolve_token(&token)
                .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Session lookup failed"))?
        };
        let session =
            session.ok_or((StatusCode::UNAUTHORIZED, "Invalid or expired session"))?;

        let user = load_user(&app_state, session.user_id)?
            .ok_or((StatusCode::UNAUTHORIZED, "Invalid or expired session"))?;
        if !user.is_active {
            return Err((StatusCode::UNAUTHORIZED, "Account is disabled"));
        }

        Ok(AuthenticatedUser { user })
    }
}

/// Like [`AuthenticatedUser`] but never rejects. Pages that render for both
/// anonymous and logged-in visitors use this.
#[derive(Debug, Clone, Default)]
pub struct OptionalAuth(pub Option<User>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(
            AuthenticatedUser::from_request_parts(parts, state)
                .await
                .ok()
                .map(|auth| auth.user),
        ))
    }
}

async fn extract_token(parts: &mut Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(header::AUTHORIZATION) {
        if let Ok(text) = value.to_str() {
            if let Some(token) = text.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    let cookies = parts.extract::<Cookies>().await.ok()?;
    cookies.get(AUTH_COOKIE).map(|c| c.value().to_string())
}

fn load_user(
    state: &AppState,
    user_id: Uuid,
) -> Result<Option<User>, (StatusCode, &'static str)> {
    use crate::shared::schema::users::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database unavailable"))?;
    users
        .filter(id.eq(user_id))
        .first::<User>(&mut conn)
        .optional()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database unavailable"))
}

// ============================================================================
// Middleware
// ============================================================================

pub fn is_public_path(path: &str) -> bool {
    matches!(path, "/login" | "/register" | "/health" | "/favicon.ico")
        || path.starts_with("/static/")
        || path.starts_with("/css/")
        || path == "/api/auth/login"
        || path == "/api/auth/register"
}

/// Gate for the whole router. Only checks that a live session exists; role
/// checks stay in the handlers where the rules live.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if is_public_path(&path) {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| cookies.get(AUTH_COOKIE).map(|c| c.value().to_string()));

    let has_session = match token {
        Some(token) => {
            let mut manager = state.session_manager.lock().await;
            manager.resolve_token(&token).ok().flatten().is_some()
        }
        None => false,
    };

    if has_session {
        return next.run(request).await;
    }
    if path.starts_with("/api/") {
        (StatusCode::UNAUTHORIZED, "Authentication required").into_response()
    } else {
        Redirect::to("/login").into_response()
    }
}

fn create_auth_cookie(token: &str, hours: i64) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(tower_cookies::cookie::SameSite::Lax)
        .max_age(time::Duration::hours(hours))
        .build()
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, String)> {
    use crate::shared::schema::users::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    // The login field accepts either the username or the email address.
    let user: Option<User> = users
        .filter(username.eq(&req.username).or(email.eq(&req.username)))
        .first(&mut conn)
        .optional()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let Some(user) = user else {
        return Err((
            StatusCode::UNAUTHORIZED,
            "Invalid username or password".to_string(),
        ));
    };
    if !user.is_active {
        return Err((StatusCode::UNAUTHORIZED, "Account is disabled".to_string()));
    }

    let hasher = state.extensions.get::<AccountPasswordHasher>().ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "Password hasher not configured".to_string(),
    ))?;
    let ok = hasher
        .verify(&req.password, &user.password_hash)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Verify error: {e}")))?;
    if !ok {
        warn!("Failed login attempt for {}", req.username);
        return Err((
            StatusCode::UNAUTHORIZED,
            "Invalid username or password".to_string(),
        ));
    }

    let hours = state.config.as_ref().map(|c| c.session_hours).unwrap_or(168);
    let session = {
        let mut manager = state.session_manager.lock().await;
        manager
            .create_session(user.id, hours)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Session error: {e}")))?
    };

    cookies.add(create_auth_cookie(&session.token, hours));
    info!("User {} logged in", user.username);
    Ok(Json(LoginResponse {
        token: session.token,
        user: user.into(),
    }))
}

/// Form variant backing the HTML login page.
pub async fn login_form(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Form(req): Form<LoginRequest>,
) -> Redirect {
    match login(State(state), cookies, Json(req)).await {
        Ok(_) => Redirect::to("/"),
        Err(_) => Redirect::to("/login?error=1"),
    }
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, String)> {
    use crate::shared::schema::users::dsl::*;

    let hasher = state.extensions.get::<AccountPasswordHasher>().ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "Password hasher not configured".to_string(),
    ))?;

    let validation = hasher.validate(&req.password, Some(&req.username), Some(&req.email));
    if !validation.is_valid {
        let message = validation
            .issues
            .first()
            .map(|i| i.message())
            .unwrap_or_else(|| "Password is too weak".to_string());
        return Err((StatusCode::BAD_REQUEST, message));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let taken: i64 = users
        .filter(username.eq(&req.username).or(email.eq(&req.email)))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if taken > 0 {
        return Err((
            StatusCode::CONFLICT,
            "Username or email is already in use".to_string(),
        ));
    }

    let hash = hasher
        .hash(&req.password)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Hash error: {e}")))?;

    // Self-registration always lands on the lowest rung.
    let user = User {
        id: Uuid::new_v4(),
        username: req.username.clone(),
        email: req.email,
        display_name: req.display_name.unwrap_or_else(|| req.username.clone()),
        password_hash: hash,
        role: UserRole::default().to_string(),
        is_administrator: false,
        is_active: true,
        team_id: None,
        created_at: Utc::now(),
    };
    diesel::insert_into(users)
        .values(&user)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    let hours = state.config.as_ref().map(|c| c.session_hours).unwrap_or(168);
    let session = {
        let mut manager = state.session_manager.lock().await;
        manager
            .create_session(user.id, hours)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Session error: {e}")))?
    };

    cookies.add(create_auth_cookie(&session.token, hours));
    info!("User {} registered", user.username);
    Ok(Json(LoginResponse {
        token: session.token,
        user: user.into(),
    }))
}

pub async fn logout(State(state): State<Arc<AppState>>, cookies: Cookies) -> StatusCode {
    if let Some(cookie) = cookies.get(AUTH_COOKIE) {
        let token = cookie.value().to_string();
        let mut manager = state.session_manager.lock().await;
        if let Err(e) = manager.delete_session(&token) {
            warn!("Failed to delete session: {}", e);
        }
    }
    cookies.remove(Cookie::build((AUTH_COOKIE, "")).path("/").build());
    StatusCode::NO_CONTENT
}

pub async fn logout_redirect(State(state): State<Arc<AppState>>, cookies: Cookies) -> Redirect {
    logout(State(state), cookies).await;
    Redirect::to("/login")
}

pub async fn me(auth: AuthenticatedUser) -> Json<UserProfile> {
    Json(auth.user.into())
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/register", post(register))
        .route("/api/auth/me", get(me))
        .route("/login", post(login_form))
        .route("/logout", get(logout_redirect))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_paths_skip_the_gate() {
        assert!(is_public_path("/login"));
        assert!(is_public_path("/health"));
        assert!(is_public_path("/static/css/app.css"));
        assert!(is_public_path("/css/app.css"));
        assert!(is_public_path("/api/auth/login"));
        assert!(!is_public_path("/api/tasks"));
        assert!(!is_public_path("/"));
    }

    #[test]
    fn auth_cookie_is_scoped_and_http_only() {
        let cookie = create_auth_cookie("abc123", 24);
        assert_eq!(cookie.name(), AUTH_COOKIE);
        assert_eq!(cookie.value(), "abc123");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(24)));
    }
}
