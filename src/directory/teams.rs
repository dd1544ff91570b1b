use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::directory::users::{User, UserProfile};
use crate::shared::enums::UserRole;
use crate::shared::schema::teams;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = teams)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub member_count: i64,
    pub task_count: i64,
    pub created_at: DateTime<Utc>,
}

impl TeamResponse {
    fn from_parts(team: Team, member_count: i64, task_count: i64) -> Self {
        TeamResponse {
            id: team.id,
            name: team.name,
            description: team.description,
            is_active: team.is_active,
            member_count,
            task_count,
            created_at: team.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeamRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TeamListQuery {
    pub search: Option<String>,
    pub active: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn team_counts(
    conn: &mut PgConnection,
    team: Uuid,
) -> Result<(i64, i64), diesel::result::Error> {
    use crate::shared::schema::tasks::dsl as tasks_dsl;
    use crate::shared::schema::users::dsl as users_dsl;

    let members: i64 = users_dsl::users
        .filter(users_dsl::team_id.eq(team))
        .count()
        .get_result(conn)?;
    let tasks: i64 = tasks_dsl::tasks
        .filter(tasks_dsl::team_id.eq(team))
        .count()
        .get_result(conn)?;
    Ok((members, tasks))
}

pub async fn create_team(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Json(req): Json<CreateTeamRequest>,
) -> Result<Json<TeamResponse>, (StatusCode, String)> {
    if !auth.user.can_act_as(UserRole::Manager) {
        return Err((
            StatusCode::FORBIDDEN,
            "Manager role required to create teams".to_string(),
        ));
    }
    if req.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Team name is required".to_string()));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let team = Team {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        description: req.description,
        is_active: true,
        created_at: Utc::now(),
    };

    diesel::insert_into(teams::table)
        .values(&team)
        .execute(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => (
                StatusCode::CONFLICT,
                "A team with that name already exists".to_string(),
            ),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Insert error: {other}"),
            ),
        })?;

    info!("Created team {}", team.name);
    Ok(Json(TeamResponse::from_parts(team, 0, 0)))
}

pub async fn list_teams(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Query(query): Query<TeamListQuery>,
) -> Result<Json<Vec<TeamResponse>>, (StatusCode, String)> {
    use crate::shared::schema::teams::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let mut q = teams.into_boxed();
    if let Some(search) = &query.search {
        if !search.is_empty() {
            q = q.filter(name.ilike(format!("%{}%", search)));
        }
    }
    if let Some(active) = query.active {
        q = q.filter(is_active.eq(active));
    }

    let limit = query.limit.unwrap_or(50).min(200);
    let offset = query.offset.unwrap_or(0);

    let rows: Vec<Team> = q
        .order(name.asc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let mut responses = Vec::with_capacity(rows.len());
    for team in rows {
        let (members, tasks) = team_counts(&mut conn, team.id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        responses.push(TeamResponse::from_parts(team, members, tasks));
    }
    Ok(Json(responses))
}

pub async fn get_team(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<Uuid>,
) -> Result<Json<TeamResponse>, (StatusCode, String)> {
    use crate::shared::schema::teams::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let team: Team = teams
        .filter(id.eq(team_id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Team not found".to_string()))?;

    let (members, tasks) = team_counts(&mut conn, team.id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(TeamResponse::from_parts(team, members, tasks)))
}

pub async fn update_team(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(team_id): Path<Uuid>,
    Json(req): Json<UpdateTeamRequest>,
) -> Result<Json<TeamResponse>, (StatusCode, String)> {
    use crate::shared::schema::teams::dsl::*;

    if !auth.user.can_act_as(UserRole::Manager) {
        return Err((
            StatusCode::FORBIDDEN,
            "Manager role required to edit teams".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let exists: i64 = teams
        .filter(id.eq(team_id))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if exists == 0 {
        return Err((StatusCode::NOT_FOUND, "Team not found".to_string()));
    }

    if let Some(new_name) = &req.name {
        if new_name.trim().is_empty() {
            return Err((StatusCode::BAD_REQUEST, "Team name is required".to_string()));
        }
        diesel::update(teams.filter(id.eq(team_id)))
            .set(name.eq(new_name.trim()))
            .execute(&mut conn)
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => (
                    StatusCode::CONFLICT,
                    "A team with that name already exists".to_string(),
                ),
                other => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Update error: {other}"),
                ),
            })?;
    }
    if let Some(new_description) = &req.description {
        diesel::update(teams.filter(id.eq(team_id)))
            .set(description.eq(new_description))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(active) = req.is_active {
        diesel::update(teams.filter(id.eq(team_id)))
            .set(is_active.eq(active))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }

    get_team(State(state), Path(team_id)).await
}

pub async fn delete_team(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(team_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    use crate::shared::schema::teams::dsl::*;
    use crate::shared::schema::users::dsl as users_dsl;

    if !auth.user.can_act_as(UserRole::Director) {
        return Err((
            StatusCode::FORBIDDEN,
            "Director role required to delete teams".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let members: i64 = users_dsl::users
        .filter(users_dsl::team_id.eq(team_id))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if members > 0 {
        return Err((
            StatusCode::CONFLICT,
            "Team still has members; move them first".to_string(),
        ));
    }

    let deleted = diesel::delete(teams.filter(id.eq(team_id)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete error: {e}")))?;
    if deleted == 0 {
        return Err((StatusCode::NOT_FOUND, "Team not found".to_string()));
    }

    info!("Deleted team {}", team_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn team_members(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<Uuid>,
) -> Result<Json<Vec<UserProfile>>, (StatusCode, String)> {
    use crate::shared::schema::teams::dsl as teams_dsl;
    use crate::shared::schema::users::dsl as users_dsl;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let exists: i64 = teams_dsl::teams
        .filter(teams_dsl::id.eq(team_id))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if exists == 0 {
        return Err((StatusCode::NOT_FOUND, "Team not found".to_string()));
    }

    let members: Vec<User> = users_dsl::users
        .filter(users_dsl::team_id.eq(team_id))
        .order(users_dsl::username.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(members.into_iter().map(UserProfile::from).collect()))
}

pub fn configure_teams_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/teams", get(list_teams).post(create_team))
        .route(
            "/api/teams/:id",
            get(get_team).put(update_team).delete(delete_team),
        )
        .route("/api/teams/:id/members", get(team_members))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_carries_counts() {
        let team = Team {
            id: Uuid::new_v4(),
            name: "Platform".to_string(),
            description: Some("Core infrastructure".to_string()),
            is_active: true,
            created_at: Utc::now(),
        };
        let response = TeamResponse::from_parts(team, 4, 17);
        assert_eq!(response.name, "Platform");
        assert_eq!(response.member_count, 4);
        assert_eq!(response.task_count, 17);
    }
}
