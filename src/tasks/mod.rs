use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
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
use crate::directory::users::User;
use crate::shared::enums::{HistoryAction, TaskComplexity, TaskPriority, TaskStatus, UserRole};
use crate::shared::schema::tasks;
use crate::shared::state::AppState;

pub mod attachments;
pub mod comments;
pub mod dependencies;
pub mod history;
pub mod time_logs;
pub mod ui;
pub mod workflow;

use self::comments::CommentResponse;
use self::workflow::WorkflowError;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = tasks)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub complexity: String,
    pub estimated_hours: Option<f64>,
    pub actual_hours: f64,
    pub created_by: Uuid,
    pub assignee_id: Option<Uuid>,
    pub supervisor_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn status_enum(&self) -> TaskStatus {
        self.status.parse().unwrap_or_default()
    }

    /// Creator, assignee, supervisor, and managers may change a task.
    pub fn can_edit(&self, user: &User) -> bool {
        user.can_act_as(UserRole::Manager)
            || self.created_by == user.id
            || self.assignee_id == Some(user.id)
            || self.supervisor_id == Some(user.id)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.due_date.map_or(false, |due| due < now)
            && self.status_enum() != TaskStatus::Completed
    }
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub complexity: String,
    pub estimated_hours: Option<f64>,
    pub actual_hours: f64,
    pub created_by: Uuid,
    pub assignee_id: Option<Uuid>,
    pub supervisor_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub subtask_total: i64,
    pub subtask_completed: i64,
    pub subtask_progress: Option<f64>,
    pub time_variance: Option<f64>,
    pub overdue: bool,
}

#[derive(Debug, Serialize)]
pub struct TaskDetailResponse {
    pub task: TaskResponse,
    pub comments: Vec<CommentResponse>,
}

/// Completed share of subtasks, `None` when there are none.
pub fn subtask_progress(total: i64, completed: i64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some((completed as f64 / total as f64 * 1000.0).round() / 10.0)
}

fn enrich(conn: &mut PgConnection, task: Task) -> Result<TaskResponse, diesel::result::Error> {
    use crate::shared::schema::tasks::dsl::*;

    let subtask_total: i64 = tasks
        .filter(parent_task_id.eq(task.id))
        .count()
        .get_result(conn)?;
    let subtask_completed: i64 = tasks
        .filter(parent_task_id.eq(task.id))
        .filter(status.eq(TaskStatus::Completed.to_string()))
        .count()
        .get_result(conn)?;

    let overdue = task.is_overdue(Utc::now());
    Ok(TaskResponse {
        subtask_total,
        subtask_completed,
        subtask_progress: subtask_progress(subtask_total, subtask_completed),
        time_variance: task.estimated_hours.map(|est| task.actual_hours - est),
        overdue,
        id: task.id,
        title: task.title,
        description: task.description,
        status: task.status,
        priority: task.priority,
        complexity: task.complexity,
        estimated_hours: task.estimated_hours,
        actual_hours: task.actual_hours,
        created_by: task.created_by,
        assignee_id: task.assignee_id,
        supervisor_id: task.supervisor_id,
        team_id: task.team_id,
        project_id: task.project_id,
        parent_task_id: task.parent_task_id,
        tags: task.tags,
        started_at: task.started_at,
        due_date: task.due_date,
        completed_at: task.completed_at,
        created_at: task.created_at,
        updated_at: task.updated_at,
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub complexity: Option<String>,
    pub estimated_hours: Option<f64>,
    pub assignee_id: Option<Uuid>,
    pub supervisor_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub tags: Option<Vec<String>>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub complexity: Option<String>,
    pub estimated_hours: Option<f64>,
    pub supervisor_id: Option<Uuid>,
    pub tags: Option<Vec<String>>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct AssignTaskRequest {
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePriorityRequest {
    pub priority: String,
}

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub top_level: Option<bool>,
    pub tag: Option<String>,
    pub overdue: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn load_task(
    conn: &mut PgConnection,
    task: Uuid,
) -> Result<Task, (StatusCode, String)> {
    use crate::shared::schema::tasks::dsl::*;
    tasks
        .filter(id.eq(task))
        .first(conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Task not found".to_string()))
}

fn check_user_assignable(
    conn: &mut PgConnection,
    target: Uuid,
) -> Result<String, (StatusCode, String)> {
    use crate::shared::schema::users::dsl::*;
    let row: Option<(String, bool)> = users
        .filter(id.eq(target))
        .select((username, is_active))
        .first(conn)
        .optional()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    match row {
        None => Err((StatusCode::NOT_FOUND, "User not found".to_string())),
        Some((_, false)) => Err((
            StatusCode::BAD_REQUEST,
            "Cannot assign a deactivated user".to_string(),
        )),
        Some((name, true)) => Ok(name),
    }
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<TaskResponse>, (StatusCode, String)> {
    if req.title.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Task title is required".to_string()));
    }

    let priority = match &req.priority {
        Some(p) => p
            .parse::<TaskPriority>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?,
        None => TaskPriority::default(),
    };
    let complexity = match &req.complexity {
        Some(c) => c
            .parse::<TaskComplexity>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?,
        None => TaskComplexity::default(),
    };

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    if let Some(parent) = req.parent_task_id {
        use crate::shared::schema::tasks::dsl as tasks_dsl;
        let exists: i64 = tasks_dsl::tasks
            .filter(tasks_dsl::id.eq(parent))
            .count()
            .get_result(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        if exists == 0 {
            return Err((StatusCode::NOT_FOUND, "Parent task not found".to_string()));
        }
    }
    if let Some(assignee) = req.assignee_id {
        check_user_assignable(&mut conn, assignee)?;
    }
    if let Some(supervisor) = req.supervisor_id {
        check_user_assignable(&mut conn, supervisor)?;
    }

    let now = Utc::now();
    let task = Task {
        id: Uuid::new_v4(),
        title: req.title.trim().to_string(),
        description: req.description,
        status: TaskStatus::Todo.to_string(),
        priority: priority.to_string(),
        complexity: complexity.to_string(),
        estimated_hours: req.estimated_hours,
        actual_hours: 0.0,
        created_by: auth.user.id,
        assignee_id: req.assignee_id,
        supervisor_id: req.supervisor_id,
        team_id: req.team_id,
        project_id: req.project_id,
        parent_task_id: req.parent_task_id,
        tags: req.tags.unwrap_or_default(),
        started_at: None,
        due_date: req.due_date,
        completed_at: None,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(tasks::table)
        .values(&task)
        .execute(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => (
                StatusCode::BAD_REQUEST,
                "Referenced project or team does not exist".to_string(),
            ),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Insert error: {other}"),
            ),
        })?;

    history::record(
        &mut conn,
        task.id,
        auth.user.id,
        HistoryAction::Created,
        None,
        None,
        Some(task.title.clone()),
    )
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("History error: {e}")))?;

    info!("Created task {} ({})", task.title, task.id);
    let response = enrich(&mut conn, task)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(response))
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<TaskResponse>>, (StatusCode, String)> {
    use crate::shared::schema::tasks::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let mut q = tasks.into_boxed();

    if let Some(search) = &query.search {
        if !search.is_empty() {
            let pattern = format!("%{}%", search);
            q = q.filter(title.ilike(pattern.clone()).or(description.ilike(pattern)));
        }
    }
    if let Some(status_filter) = &query.status {
        let parsed = status_filter
            .parse::<TaskStatus>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
        q = q.filter(status.eq(parsed.to_string()));
    }
    if let Some(priority_filter) = &query.priority {
        let parsed = priority_filter
            .parse::<TaskPriority>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
        q = q.filter(priority.eq(parsed.to_string()));
    }
    if let Some(assignee) = query.assignee_id {
        q = q.filter(assignee_id.eq(assignee));
    }
    if let Some(creator) = query.created_by {
        q = q.filter(created_by.eq(creator));
    }
    if let Some(team) = query.team_id {
        q = q.filter(team_id.eq(team));
    }
    if let Some(project) = query.project_id {
        q = q.filter(project_id.eq(project));
    }
    if let Some(parent) = query.parent_task_id {
        q = q.filter(parent_task_id.eq(parent));
    }
    if query.top_level == Some(true) {
        q = q.filter(parent_task_id.is_null());
    }
    if let Some(tag) = &query.tag {
        q = q.filter(tags.contains(vec![tag.clone()]));
    }
    if query.overdue == Some(true) {
        q = q
            .filter(due_date.lt(Utc::now()))
            .filter(status.ne(TaskStatus::Completed.to_string()));
    }

    let limit = query.limit.unwrap_or(100).min(500);
    let offset = query.offset.unwrap_or(0);

    let rows: Vec<Task> = q
        .order(created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let mut responses = Vec::with_capacity(rows.len());
    for task in rows {
        responses.push(
            enrich(&mut conn, task)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?,
        );
    }
    Ok(Json(responses))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskResponse>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let task = load_task(&mut conn, task_id)?;
    let response = enrich(&mut conn, task)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(response))
}

pub async fn get_task_detail(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskDetailResponse>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let task = load_task(&mut conn, task_id)?;
    let response = enrich(&mut conn, task)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    let task_comments = comments::comments_for_task(&mut conn, task_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(TaskDetailResponse {
        task: response,
        comments: task_comments,
    }))
}

pub async fn list_subtasks(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Vec<TaskResponse>>, (StatusCode, String)> {
    use crate::shared::schema::tasks::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    load_task(&mut conn, task_id)?;

    let rows: Vec<Task> = tasks
        .filter(parent_task_id.eq(task_id))
        .order(created_at.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let mut responses = Vec::with_capacity(rows.len());
    for task in rows {
        responses.push(
            enrich(&mut conn, task)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?,
        );
    }
    Ok(Json(responses))
}

pub async fn update_task(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<TaskResponse>, (StatusCode, String)> {
    use crate::shared::schema::tasks::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let task = load_task(&mut conn, task_id)?;
    if !task.can_edit(&auth.user) {
        return Err((
            StatusCode::FORBIDDEN,
            "Not allowed to edit this task".to_string(),
        ));
    }

    let mut changed = false;
    let mut log_change = |conn: &mut PgConnection,
                          field: &str,
                          old: Option<String>,
                          new: Option<String>|
     -> Result<(), (StatusCode, String)> {
        history::record(
            conn,
            task_id,
            auth.user.id,
            HistoryAction::Updated,
            Some(field),
            old,
            new,
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("History error: {e}")))
    };

    if let Some(new_title) = &req.title {
        let new_title = new_title.trim();
        if new_title.is_empty() {
            return Err((StatusCode::BAD_REQUEST, "Task title is required".to_string()));
        }
        if new_title != task.title {
            diesel::update(tasks.filter(id.eq(task_id)))
                .set(title.eq(new_title))
                .execute(&mut conn)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
            log_change(
                &mut conn,
                "title",
                Some(task.title.clone()),
                Some(new_title.to_string()),
            )?;
            changed = true;
        }
    }
    if let Some(new_description) = &req.description {
        if Some(new_description) != task.description.as_ref() {
            diesel::update(tasks.filter(id.eq(task_id)))
                .set(description.eq(new_description))
                .execute(&mut conn)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
            log_change(
                &mut conn,
                "description",
                task.description.clone(),
                Some(new_description.clone()),
            )?;
            changed = true;
        }
    }
    if let Some(new_priority) = &req.priority {
        let parsed = new_priority
            .parse::<TaskPriority>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
        if parsed.to_string() != task.priority {
            diesel::update(tasks.filter(id.eq(task_id)))
                .set(priority.eq(parsed.to_string()))
                .execute(&mut conn)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
            log_change(
                &mut conn,
                "priority",
                Some(task.priority.clone()),
                Some(parsed.to_string()),
            )?;
            changed = true;
        }
    }
    if let Some(new_complexity) = &req.complexity {
        let parsed = new_complexity
            .parse::<TaskComplexity>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
        if parsed.to_string() != task.complexity {
            diesel::update(tasks.filter(id.eq(task_id)))
                .set(complexity.eq(parsed.to_string()))
                .execute(&mut conn)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
            log_change(
                &mut conn,
                "complexity",
                Some(task.complexity.clone()),
                Some(parsed.to_string()),
            )?;
            changed = true;
        }
    }
    if let Some(new_estimate) = req.estimated_hours {
        if Some(new_estimate) != task.estimated_hours {
            diesel::update(tasks.filter(id.eq(task_id)))
                .set(estimated_hours.eq(new_estimate))
                .execute(&mut conn)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
            log_change(
                &mut conn,
                "estimated_hours",
                task.estimated_hours.map(|v| v.to_string()),
                Some(new_estimate.to_string()),
            )?;
            changed = true;
        }
    }
    if let Some(new_supervisor) = req.supervisor_id {
        if Some(new_supervisor) != task.supervisor_id {
            let name = check_user_assignable(&mut conn, new_supervisor)?;
            diesel::update(tasks.filter(id.eq(task_id)))
                .set(supervisor_id.eq(new_supervisor))
                .execute(&mut conn)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
            log_change(
                &mut conn,
                "supervisor",
                task.supervisor_id.map(|s| s.to_string()),
                Some(name),
            )?;
            changed = true;
        }
    }
    if let Some(new_tags) = &req.tags {
        if *new_tags != task.tags {
            diesel::update(tasks.filter(id.eq(task_id)))
                .set(tags.eq(new_tags))
                .execute(&mut conn)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
            log_change(
                &mut conn,
                "tags",
                Some(task.tags.join(",")),
                Some(new_tags.join(",")),
            )?;
            changed = true;
        }
    }
    if let Some(new_due) = req.due_date {
        if Some(new_due) != task.due_date {
            diesel::update(tasks.filter(id.eq(task_id)))
                .set(due_date.eq(new_due))
                .execute(&mut conn)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
            log_change(
                &mut conn,
                "due_date",
                task.due_date.map(|d| d.to_rfc3339()),
                Some(new_due.to_rfc3339()),
            )?;
            changed = true;
        }
    }

    if changed {
        diesel::update(tasks.filter(id.eq(task_id)))
            .set(updated_at.eq(Utc::now()))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }

    get_task(State(state), Path(task_id)).await
}

pub async fn assign_task(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
    Json(req): Json<AssignTaskRequest>,
) -> Result<Json<TaskResponse>, (StatusCode, String)> {
    use crate::shared::schema::tasks::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let task = load_task(&mut conn, task_id)?;

    // Managers assign freely. Anyone else may only claim an unassigned task
    // for themselves or hand back their own.
    if !auth.user.can_act_as(UserRole::Manager) {
        let claiming_for_self =
            req.assignee_id == Some(auth.user.id) && task.assignee_id.is_none();
        let releasing_own =
            req.assignee_id.is_none() && task.assignee_id == Some(auth.user.id);
        if !claiming_for_self && !releasing_own {
            return Err((
                StatusCode::FORBIDDEN,
                "Manager role required to reassign tasks".to_string(),
            ));
        }
    }

    let new_name = match req.assignee_id {
        Some(target) => Some(check_user_assignable(&mut conn, target)?),
        None => None,
    };

    if req.assignee_id == task.assignee_id {
        let response = enrich(&mut conn, task)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        return Ok(Json(response));
    }

    diesel::update(tasks.filter(id.eq(task_id)))
        .set((assignee_id.eq(req.assignee_id), updated_at.eq(Utc::now())))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    history::record(
        &mut conn,
        task_id,
        auth.user.id,
        HistoryAction::Assigned,
        Some("assignee"),
        task.assignee_id.map(|a| a.to_string()),
        new_name.clone(),
    )
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("History error: {e}")))?;

    info!(
        "Task {} assigned to {}",
        task_id,
        new_name.as_deref().unwrap_or("nobody")
    );
    get_task(State(state), Path(task_id)).await
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<Json<TaskResponse>, (StatusCode, String)> {
    use crate::shared::schema::tasks::dsl::*;

    let target = req
        .status
        .parse::<TaskStatus>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let task = load_task(&mut conn, task_id)?;
    let current = task.status_enum();

    if current == target {
        let response = enrich(&mut conn, task)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        return Ok(Json(response));
    }

    let can_manage = auth.user.can_act_as(UserRole::Manager);
    workflow::check_transition(current, target, can_manage).map_err(|e| {
        let code = match e {
            WorkflowError::RoleTooLow => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        };
        (code, e.to_string())
    })?;

    if target == TaskStatus::Completed {
        let open_subtasks: i64 = tasks
            .filter(parent_task_id.eq(task_id))
            .filter(status.ne(TaskStatus::Completed.to_string()))
            .count()
            .get_result(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        if open_subtasks > 0 {
            return Err((
                StatusCode::CONFLICT,
                WorkflowError::IncompleteSubtasks {
                    count: open_subtasks,
                }
                .to_string(),
            ));
        }

        let blockers = dependencies::blocking_predecessors(&mut conn, task_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        if let Some((_, blocker_title)) = blockers.into_iter().next() {
            return Err((
                StatusCode::CONFLICT,
                WorkflowError::BlockedByDependency {
                    title: blocker_title,
                }
                .to_string(),
            ));
        }
    }

    let now = Utc::now();
    diesel::update(tasks.filter(id.eq(task_id)))
        .set((status.eq(target.to_string()), updated_at.eq(now)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    if target == TaskStatus::InProgress && task.started_at.is_none() {
        diesel::update(tasks.filter(id.eq(task_id)))
            .set(started_at.eq(now))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if target == TaskStatus::Completed {
        diesel::update(tasks.filter(id.eq(task_id)))
            .set(completed_at.eq(now))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    } else if current == TaskStatus::Completed {
        diesel::update(tasks.filter(id.eq(task_id)))
            .set(completed_at.eq(None::<DateTime<Utc>>))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }

    history::record(
        &mut conn,
        task_id,
        auth.user.id,
        HistoryAction::StatusChanged,
        Some("status"),
        Some(current.to_string()),
        Some(target.to_string()),
    )
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("History error: {e}")))?;

    info!("Task {} moved {} -> {}", task_id, current, target);
    get_task(State(state), Path(task_id)).await
}

pub async fn change_priority(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
    Json(req): Json<ChangePriorityRequest>,
) -> Result<Json<TaskResponse>, (StatusCode, String)> {
    use crate::shared::schema::tasks::dsl::*;

    let target = req
        .priority
        .parse::<TaskPriority>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let task = load_task(&mut conn, task_id)?;
    if !task.can_edit(&auth.user) {
        return Err((
            StatusCode::FORBIDDEN,
            "Not allowed to edit this task".to_string(),
        ));
    }
    if target.to_string() == task.priority {
        let response = enrich(&mut conn, task)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        return Ok(Json(response));
    }

    diesel::update(tasks.filter(id.eq(task_id)))
        .set((priority.eq(target.to_string()), updated_at.eq(Utc::now())))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    history::record(
        &mut conn,
        task_id,
        auth.user.id,
        HistoryAction::Updated,
        Some("priority"),
        Some(task.priority.clone()),
        Some(target.to_string()),
    )
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("History error: {e}")))?;

    get_task(State(state), Path(task_id)).await
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    use crate::shared::schema::task_attachments::dsl as attachments_dsl;
    use crate::shared::schema::tasks::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let task = load_task(&mut conn, task_id)?;
    if task.created_by != auth.user.id && !auth.user.can_act_as(UserRole::Manager) {
        return Err((
            StatusCode::FORBIDDEN,
            "Only the creator or a manager can delete a task".to_string(),
        ));
    }

    let stored_files: Vec<String> = attachments_dsl::task_attachments
        .filter(attachments_dsl::task_id.eq(task_id))
        .select(attachments_dsl::filename)
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    // Dependent rows cascade; subtasks survive with parent_task_id nulled.
    diesel::delete(tasks.filter(id.eq(task_id)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete error: {e}")))?;

    let dir = state
        .config
        .as_ref()
        .map(|c| c.upload_dir.clone())
        .unwrap_or_else(|| "./uploads".to_string());
    for stored in stored_files {
        let path = std::path::Path::new(&dir).join(&stored);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            log::warn!("Failed to remove attachment file {:?}: {}", path, e);
        }
    }

    info!("Deleted task {} ({})", task.title, task_id);
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_tasks_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/tasks/:id/detail", get(get_task_detail))
        .route("/api/tasks/:id/subtasks", get(list_subtasks))
        .route("/api/tasks/:id/assign", post(assign_task))
        .route("/api/tasks/:id/status", put(change_status))
        .route("/api/tasks/:id/priority", put(change_priority))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_task(creator: Uuid) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            title: "Wire up the reports page".to_string(),
            description: None,
            status: "todo".to_string(),
            priority: "medium".to_string(),
            complexity: "medium".to_string(),
            estimated_hours: Some(8.0),
            actual_hours: 0.0,
            created_by: creator,
            assignee_id: None,
            supervisor_id: None,
            team_id: None,
            project_id: None,
            parent_task_id: None,
            tags: vec![],
            started_at: None,
            due_date: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_user(role: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: "pat".to_string(),
            email: "pat@example.com".to_string(),
            display_name: "Pat".to_string(),
            password_hash: String::new(),
            role: role.to_string(),
            is_administrator: false,
            is_active: true,
            team_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn edit_rights_cover_the_expected_people() {
        let creator = sample_user("analyst");
        let manager = sample_user("manager");
        let stranger = sample_user("analyst");
        let mut assignee = sample_user("analyst");
        assignee.id = Uuid::new_v4();

        let mut task = sample_task(creator.id);
        task.assignee_id = Some(assignee.id);

        assert!(task.can_edit(&creator));
        assert!(task.can_edit(&assignee));
        assert!(task.can_edit(&manager));
        assert!(!task.can_edit(&stranger));
    }

    #[test]
    fn overdue_requires_open_status_and_past_due() {
        let now = Utc::now();
        let mut task = sample_task(Uuid::new_v4());
        assert!(!task.is_overdue(now));

        task.due_date = Some(now - Duration::days(1));
        assert!(task.is_overdue(now));

        task.status = "completed".to_string();
        assert!(!task.is_overdue(now));

        task.status = "in_progress".to_string();
        task.due_date = Some(now + Duration::days(1));
        assert!(!task.is_overdue(now));
    }

    #[test]
    fn subtask_progress_handles_empty_and_partial() {
        assert_eq!(subtask_progress(0, 0), None);
        assert_eq!(subtask_progress(4, 1), Some(25.0));
        assert_eq!(subtask_progress(3, 2), Some(66.7));
    }
}
