use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::security::AccountPasswordHasher;
use crate::shared::enums::UserRole;
use crate::shared::schema::users;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: String,
    pub is_administrator: bool,
    pub is_active: bool,
    pub team_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn role_enum(&self) -> UserRole {
        self.role.parse().unwrap_or_default()
    }

    /// Role check with the administrator flag as a trump.
    pub fn can_act_as(&self, min: UserRole) -> bool {
        self.is_administrator || self.role_enum().at_least(min)
    }
}

/// Serialized user shape. A separate type so the password hash cannot reach
/// a response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub is_administrator: bool,
    pub is_active: bool,
    pub team_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id,
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            role: user.role,
            is_administrator: user.is_administrator,
            is_active: user.is_active,
            team_id: user.team_id,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub password: String,
    pub role: Option<String>,
    pub team_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignTeamRequest {
    pub team_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub search: Option<String>,
    pub role: Option<String>,
    pub team_id: Option<Uuid>,
    pub active: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn hasher(state: &AppState) -> Result<&AccountPasswordHasher, (StatusCode, String)> {
    state.extensions.get::<AccountPasswordHasher>().ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "Password hasher not configured".to_string(),
    ))
}

fn username_or_email_taken(
    conn: &mut PgConnection,
    candidate_username: &str,
    candidate_email: &str,
    exclude: Option<Uuid>,
) -> Result<bool, diesel::result::Error> {
    use crate::shared::schema::users::dsl::*;
    let mut query = users
        .filter(username.eq(candidate_username).or(email.eq(candidate_email)))
        .into_boxed();
    if let Some(user_id) = exclude {
        query = query.filter(id.ne(user_id));
    }
    let count: i64 = query.count().get_result(conn)?;
    Ok(count > 0)
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    if !auth.user.can_act_as(UserRole::Manager) {
        return Err((
            StatusCode::FORBIDDEN,
            "Manager role required to create users".to_string(),
        ));
    }

    let role_value = match &req.role {
        Some(r) => r
            .parse::<UserRole>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?,
        None => UserRole::default(),
    };

    let validation = hasher(&state)?.validate(&req.password, Some(&req.username), Some(&req.email));
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

    if username_or_email_taken(&mut conn, &req.username, &req.email, None)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?
    {
        return Err((
            StatusCode::CONFLICT,
            "Username or email is already in use".to_string(),
        ));
    }

    let password_hash = hasher(&state)?
        .hash(&req.password)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Hash error: {e}")))?;

    let user = User {
        id: Uuid::new_v4(),
        username: req.username.clone(),
        email: req.email,
        display_name: req.display_name.unwrap_or_else(|| req.username.clone()),
        password_hash,
        role: role_value.to_string(),
        is_administrator: false,
        is_active: true,
        team_id: req.team_id,
        created_at: Utc::now(),
    };

    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    info!("Created user {} with role {}", user.username, user.role);
    Ok(Json(user.into()))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Vec<UserProfile>>, (StatusCode, String)> {
    use crate::shared::schema::users::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let mut q = users.into_boxed();

    if let Some(search) = &query.search {
        if !search.is_empty() {
            let pattern = format!("%{}%", search);
            q = q.filter(
                username
                    .ilike(pattern.clone())
                    .or(display_name.ilike(pattern.clone()))
                    .or(email.ilike(pattern)),
            );
        }
    }
    if let Some(role_filter) = &query.role {
        let parsed = role_filter
            .parse::<UserRole>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
        q = q.filter(role.eq(parsed.to_string()));
    }
    if let Some(team) = query.team_id {
        q = q.filter(team_id.eq(team));
    }
    if let Some(active) = query.active {
        q = q.filter(is_active.eq(active));
    }

    let limit = query.limit.unwrap_or(50).min(200);
    let offset = query.offset.unwrap_or(0);

    let results: Vec<User> = q
        .order(username.asc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(results.into_iter().map(UserProfile::from).collect()))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    use crate::shared::schema::users::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let user: User = users
        .filter(id.eq(user_id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "User not found".to_string()))?;

    Ok(Json(user.into()))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    use crate::shared::schema::users::dsl::*;

    if auth.user.id != user_id && !auth.user.can_act_as(UserRole::Manager) {
        return Err((
            StatusCode::FORBIDDEN,
            "Cannot edit another user's profile".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    if let Some(new_email) = &req.email {
        let taken = users
            .filter(email.eq(new_email))
            .filter(id.ne(user_id))
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        if taken > 0 {
            return Err((StatusCode::CONFLICT, "Email is already in use".to_string()));
        }
        diesel::update(users.filter(id.eq(user_id)))
            .set(email.eq(new_email))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(new_display_name) = &req.display_name {
        diesel::update(users.filter(id.eq(user_id)))
            .set(display_name.eq(new_display_name))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }

    get_user(State(state), Path(user_id)).await
}

pub async fn change_role(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<ChangeRoleRequest>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    use crate::shared::schema::users::dsl::*;

    if !auth.user.can_act_as(UserRole::Manager) {
        return Err((
            StatusCode::FORBIDDEN,
            "Manager role required to change roles".to_string(),
        ));
    }

    let new_role = req
        .role
        .parse::<UserRole>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let updated = diesel::update(users.filter(id.eq(user_id)))
        .set(role.eq(new_role.to_string()))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    if updated == 0 {
        return Err((StatusCode::NOT_FOUND, "User not found".to_string()));
    }

    info!("User {} role changed to {}", user_id, new_role);
    get_user(State(state), Path(user_id)).await
}

pub async fn assign_team(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AssignTeamRequest>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    use crate::shared::schema::users::dsl::*;

    if !auth.user.can_act_as(UserRole::Manager) {
        return Err((
            StatusCode::FORBIDDEN,
            "Manager role required to move users between teams".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    if let Some(team) = req.team_id {
        use crate::shared::schema::teams::dsl as teams_dsl;
        let exists: i64 = teams_dsl::teams
            .filter(teams_dsl::id.eq(team))
            .count()
            .get_result(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        if exists == 0 {
            return Err((StatusCode::NOT_FOUND, "Team not found".to_string()));
        }
    }

    let updated = diesel::update(users.filter(id.eq(user_id)))
        .set(team_id.eq(req.team_id))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    if updated == 0 {
        return Err((StatusCode::NOT_FOUND, "User not found".to_string()));
    }

    get_user(State(state), Path(user_id)).await
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    use crate::shared::schema::users::dsl::*;

    let acting_on_self = auth.user.id == user_id;
    if !acting_on_self && !auth.user.is_administrator {
        return Err((
            StatusCode::FORBIDDEN,
            "Only administrators can reset other users' passwords".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let target: User = users
        .filter(id.eq(user_id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "User not found".to_string()))?;

    if acting_on_self {
        let current = req.current_password.as_deref().ok_or((
            StatusCode::BAD_REQUEST,
            "Current password is required".to_string(),
        ))?;
        let ok = hasher(&state)?
            .verify(current, &target.password_hash)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Verify error: {e}")))?;
        if !ok {
            return Err((
                StatusCode::UNAUTHORIZED,
                "Current password is incorrect".to_string(),
            ));
        }
    }

    let validation = hasher(&state)?.validate(
        &req.new_password,
        Some(&target.username),
        Some(&target.email),
    );
    if !validation.is_valid {
        let message = validation
            .issues
            .first()
            .map(|i| i.message())
            .unwrap_or_else(|| "Password is too weak".to_string());
        return Err((StatusCode::BAD_REQUEST, message));
    }

    let new_hash = hasher(&state)?
        .hash(&req.new_password)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Hash error: {e}")))?;

    diesel::update(users.filter(id.eq(user_id)))
        .set(password_hash.eq(new_hash))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    info!("Password changed for user {}", target.username);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn activate_user(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    set_active(state, auth, user_id, true).await
}

pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    set_active(state, auth, user_id, false).await
}

async fn set_active(
    state: Arc<AppState>,
    auth: AuthenticatedUser,
    user_id: Uuid,
    active: bool,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    use crate::shared::schema::users::dsl::*;

    if !auth.user.can_act_as(UserRole::Manager) {
        return Err((
            StatusCode::FORBIDDEN,
            "Manager role required to change account status".to_string(),
        ));
    }
    if !active && auth.user.id == user_id {
        return Err((
            StatusCode::BAD_REQUEST,
            "Cannot deactivate your own account".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let updated = diesel::update(users.filter(id.eq(user_id)))
        .set(is_active.eq(active))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    if updated == 0 {
        return Err((StatusCode::NOT_FOUND, "User not found".to_string()));
    }

    if !active {
        // A disabled account must not keep riding an existing login.
        let mut manager = state.session_manager.lock().await;
        if let Err(e) = manager.delete_user_sessions(user_id) {
            warn!("Failed to revoke sessions for {}: {}", user_id, e);
        }
    }

    get_user(State(state), Path(user_id)).await
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    use crate::shared::schema::users::dsl::*;

    if !auth.user.can_act_as(UserRole::Director) {
        return Err((
            StatusCode::FORBIDDEN,
            "Director role required to delete users".to_string(),
        ));
    }
    if auth.user.id == user_id {
        return Err((
            StatusCode::BAD_REQUEST,
            "Cannot delete your own account".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let deleted = diesel::delete(users.filter(id.eq(user_id)))
        .execute(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => (
                StatusCode::CONFLICT,
                "User still owns tasks or projects; reassign them first".to_string(),
            ),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Delete error: {other}"),
            ),
        })?;
    if deleted == 0 {
        return Err((StatusCode::NOT_FOUND, "User not found".to_string()));
    }

    info!("Deleted user {}", user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_users_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/api/users/:id/role", put(change_role))
        .route("/api/users/:id/team", put(assign_team))
        .route("/api/users/:id/password", put(change_password))
        .route("/api/users/:id/activate", post(activate_user))
        .route("/api/users/:id/deactivate", post(deactivate_user))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(role: &str, admin: bool) -> User {
        User {
            id: Uuid::new_v4(),
            username: "jdoe".to_string(),
            email: "jdoe@example.com".to_string(),
            display_name: "J. Doe".to_string(),
            password_hash: String::new(),
            role: role.to_string(),
            is_administrator: admin,
            is_active: true,
            team_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn role_helpers_respect_hierarchy() {
        let analyst = sample_user("analyst", false);
        let manager = sample_user("manager", false);
        let director = sample_user("director", false);

        assert!(!analyst.can_act_as(UserRole::Manager));
        assert!(manager.can_act_as(UserRole::Manager));
        assert!(!manager.can_act_as(UserRole::Director));
        assert!(director.can_act_as(UserRole::Manager));
        assert!(director.can_act_as(UserRole::Director));
    }

    #[test]
    fn administrator_flag_overrides_role() {
        let admin_analyst = sample_user("analyst", true);
        assert!(admin_analyst.can_act_as(UserRole::Director));
    }

    #[test]
    fn unknown_role_string_falls_back_to_analyst() {
        let odd = sample_user("wizard", false);
        assert_eq!(odd.role_enum(), UserRole::Analyst);
    }

    #[test]
    fn profile_carries_no_password_material() {
        let user = sample_user("manager", false);
        let profile = UserProfile::from(user);
        let json = serde_json::to_value(&profile).expect("serialize profile");
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "jdoe");
    }
}
