use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::shared::enums::{ProjectStatus, TaskStatus, UserRole};
use crate::shared::schema::projects;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = projects)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub team_id: Option<Uuid>,
    pub created_by: Uuid,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Task tallies per workflow column.
#[derive(Debug, Default, Serialize)]
pub struct StatusCounts {
    pub todo: i64,
    pub in_progress: i64,
    pub in_review: i64,
    pub completed: i64,
}

impl StatusCounts {
    pub fn from_rows(rows: Vec<(String, i64)>) -> Self {
        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            match status.parse::<TaskStatus>() {
                Ok(TaskStatus::Todo) => counts.todo = n,
                Ok(TaskStatus::InProgress) => counts.in_progress = n,
                Ok(TaskStatus::InReview) => counts.in_review = n,
                Ok(TaskStatus::Completed) => counts.completed = n,
                Err(_) => {}
            }
        }
        counts
    }

    pub fn total(&self) -> i64 {
        self.todo + self.in_progress + self.in_review + self.completed
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub team_id: Option<Uuid>,
    pub created_by: Uuid,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub progress_percent: f64,
    pub task_counts: StatusCounts,
}

impl ProjectResponse {
    fn from_parts(project: Project, counts: StatusCounts) -> Self {
        let total = counts.total();
        ProjectResponse {
            id: project.id,
            name: project.name,
            description: project.description,
            status: project.status,
            team_id: project.team_id,
            created_by: project.created_by,
            due_date: project.due_date,
            created_at: project.created_at,
            total_tasks: total,
            completed_tasks: counts.completed,
            progress_percent: progress_percent(total, counts.completed),
            task_counts: counts,
        }
    }
}

/// Completed share as a percentage with one decimal. A project without tasks
/// reports zero rather than dividing by zero.
pub fn progress_percent(total: i64, completed: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed as f64 / total as f64 * 1000.0).round() / 10.0
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub team_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct AssignProjectTeamRequest {
    pub team_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub team_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub fn project_task_counts(
    conn: &mut PgConnection,
    project: Uuid,
) -> Result<StatusCounts, diesel::result::Error> {
    use crate::shared::schema::tasks::dsl as tasks_dsl;

    let rows: Vec<(String, i64)> = tasks_dsl::tasks
        .filter(tasks_dsl::project_id.eq(project))
        .group_by(tasks_dsl::status)
        .select((tasks_dsl::status, diesel::dsl::count_star()))
        .load(conn)?;
    Ok(StatusCounts::from_rows(rows))
}

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Json(req): Json<CreateProjectRequest>,
) -> Result<Json<ProjectResponse>, (StatusCode, String)> {
    if !auth.user.can_act_as(UserRole::Manager) {
        return Err((
            StatusCode::FORBIDDEN,
            "Manager role required to create projects".to_string(),
        ));
    }
    if req.name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Project name is required".to_string(),
        ));
    }

    let status = match &req.status {
        Some(s) => s
            .parse::<ProjectStatus>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?,
        None => ProjectStatus::default(),
    };

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

    let project = Project {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        description: req.description,
        status: status.to_string(),
        team_id: req.team_id,
        created_by: auth.user.id,
        due_date: req.due_date,
        created_at: Utc::now(),
    };

    diesel::insert_into(projects::table)
        .values(&project)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    info!("Created project {}", project.name);
    Ok(Json(ProjectResponse::from_parts(
        project,
        StatusCounts::default(),
    )))
}

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Query(query): Query<ProjectListQuery>,
) -> Result<Json<Vec<ProjectResponse>>, (StatusCode, String)> {
    use crate::shared::schema::projects::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let mut q = projects.into_boxed();
    if let Some(search) = &query.search {
        if !search.is_empty() {
            q = q.filter(name.ilike(format!("%{}%", search)));
        }
    }
    if let Some(status_filter) = &query.status {
        let parsed = status_filter
            .parse::<ProjectStatus>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
        q = q.filter(status.eq(parsed.to_string()));
    }
    if let Some(team) = query.team_id {
        q = q.filter(team_id.eq(team));
    }

    let limit = query.limit.unwrap_or(50).min(200);
    let offset = query.offset.unwrap_or(0);

    let rows: Vec<Project> = q
        .order(created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let mut responses = Vec::with_capacity(rows.len());
    for project in rows {
        let counts = project_task_counts(&mut conn, project.id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        responses.push(ProjectResponse::from_parts(project, counts));
    }
    Ok(Json(responses))
}

pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectResponse>, (StatusCode, String)> {
    use crate::shared::schema::projects::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let project: Project = projects
        .filter(id.eq(project_id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Project not found".to_string()))?;

    let counts = project_task_counts(&mut conn, project.id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(ProjectResponse::from_parts(project, counts)))
}

pub async fn update_project(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectResponse>, (StatusCode, String)> {
    use crate::shared::schema::projects::dsl::*;

    if !auth.user.can_act_as(UserRole::Manager) {
        return Err((
            StatusCode::FORBIDDEN,
            "Manager role required to edit projects".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let exists: i64 = projects
        .filter(id.eq(project_id))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if exists == 0 {
        return Err((StatusCode::NOT_FOUND, "Project not found".to_string()));
    }

    if let Some(new_name) = &req.name {
        if new_name.trim().is_empty() {
            return Err((
                StatusCode::BAD_REQUEST,
                "Project name is required".to_string(),
            ));
        }
        diesel::update(projects.filter(id.eq(project_id)))
            .set(name.eq(new_name.trim()))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(new_description) = &req.description {
        diesel::update(projects.filter(id.eq(project_id)))
            .set(description.eq(new_description))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(new_status) = &req.status {
        let parsed = new_status
            .parse::<ProjectStatus>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
        diesel::update(projects.filter(id.eq(project_id)))
            .set(status.eq(parsed.to_string()))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(new_due) = req.due_date {
        diesel::update(projects.filter(id.eq(project_id)))
            .set(due_date.eq(new_due))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }

    get_project(State(state), Path(project_id)).await
}

pub async fn assign_project_team(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
    Json(req): Json<AssignProjectTeamRequest>,
) -> Result<Json<ProjectResponse>, (StatusCode, String)> {
    use crate::shared::schema::projects::dsl::*;

    if !auth.user.can_act_as(UserRole::Manager) {
        return Err((
            StatusCode::FORBIDDEN,
            "Manager role required to move projects between teams".to_string(),
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

    let updated = diesel::update(projects.filter(id.eq(project_id)))
        .set(team_id.eq(req.team_id))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    if updated == 0 {
        return Err((StatusCode::NOT_FOUND, "Project not found".to_string()));
    }

    get_project(State(state), Path(project_id)).await
}

pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    use crate::shared::schema::projects::dsl::*;

    if !auth.user.can_act_as(UserRole::Director) {
        return Err((
            StatusCode::FORBIDDEN,
            "Director role required to delete projects".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    // Tasks keep their rows; the foreign key nulls their project link.
    let deleted = diesel::delete(projects.filter(id.eq(project_id)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete error: {e}")))?;
    if deleted == 0 {
        return Err((StatusCode::NOT_FOUND, "Project not found".to_string()));
    }

    info!("Deleted project {}", project_id);
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_projects_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/api/projects/:id/team", put(assign_project_team))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_rounds_to_one_decimal() {
        assert_eq!(progress_percent(3, 1), 33.3);
        assert_eq!(progress_percent(3, 2), 66.7);
        assert_eq!(progress_percent(4, 4), 100.0);
    }

    #[test]
    fn empty_project_reports_zero_progress() {
        assert_eq!(progress_percent(0, 0), 0.0);
    }

    #[test]
    fn status_rows_map_into_counts() {
        let counts = StatusCounts::from_rows(vec![
            ("todo".to_string(), 5),
            ("in_progress".to_string(), 2),
            ("completed".to_string(), 3),
            ("mystery".to_string(), 9),
        ]);
        assert_eq!(counts.todo, 5);
        assert_eq!(counts.in_progress, 2);
        assert_eq!(counts.in_review, 0);
        assert_eq!(counts.completed, 3);
        assert_eq!(counts.total(), 10);
    }
}
