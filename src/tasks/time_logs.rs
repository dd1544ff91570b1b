use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::shared::enums::{HistoryAction, UserRole};
use crate::shared::schema::time_logs;
use crate::shared::state::AppState;
use crate::tasks::history;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = time_logs)]
pub struct TimeLog {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_hours: Option<f64>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TimeLogResponse {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_hours: Option<f64>,
    pub description: Option<String>,
    pub running: bool,
}

impl From<TimeLog> for TimeLogResponse {
    fn from(log: TimeLog) -> Self {
        TimeLogResponse {
            id: log.id,
            task_id: log.task_id,
            user_id: log.user_id,
            start_time: log.start_time,
            end_time: log.end_time,
            duration_hours: log.duration_hours,
            description: log.description,
            running: log.end_time.is_none(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TimeLogListResponse {
    pub logs: Vec<TimeLogResponse>,
    pub total_hours: f64,
}

#[derive(Debug, Deserialize)]
pub struct StartTimerRequest {
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TimeLogQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub fn round_hours(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

pub fn elapsed_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    round_hours((end - start).num_seconds() as f64 / 3600.0)
}

fn task_exists(conn: &mut PgConnection, task: Uuid) -> Result<bool, diesel::result::Error> {
    use crate::shared::schema::tasks::dsl::*;
    let count: i64 = tasks.filter(id.eq(task)).count().get_result(conn)?;
    Ok(count > 0)
}

pub async fn start_timer(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(task): Path<Uuid>,
    Json(req): Json<StartTimerRequest>,
) -> Result<Json<TimeLogResponse>, (StatusCode, String)> {
    use crate::shared::schema::time_logs::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    if !task_exists(&mut conn, task)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?
    {
        return Err((StatusCode::NOT_FOUND, "Task not found".to_string()));
    }

    let open: i64 = time_logs
        .filter(task_id.eq(task))
        .filter(user_id.eq(auth.user.id))
        .filter(end_time.is_null())
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if open > 0 {
        return Err((
            StatusCode::CONFLICT,
            "A timer is already running for this task".to_string(),
        ));
    }

    let now = Utc::now();
    let log = TimeLog {
        id: Uuid::new_v4(),
        task_id: task,
        user_id: auth.user.id,
        start_time: now,
        end_time: None,
        duration_hours: None,
        description: req.description,
        created_at: now,
    };
    diesel::insert_into(time_logs)
        .values(&log)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    info!("Timer started on task {} by {}", task, auth.user.username);
    Ok(Json(log.into()))
}

pub async fn stop_timer(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(task): Path<Uuid>,
) -> Result<Json<TimeLogResponse>, (StatusCode, String)> {
    use crate::shared::schema::tasks::dsl as tasks_dsl;
    use crate::shared::schema::time_logs::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let open: Option<TimeLog> = time_logs
        .filter(task_id.eq(task))
        .filter(user_id.eq(auth.user.id))
        .filter(end_time.is_null())
        .first(&mut conn)
        .optional()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    let Some(mut log) = open else {
        return Err((
            StatusCode::NOT_FOUND,
            "No running timer for this task".to_string(),
        ));
    };

    let now = Utc::now();
    let worked = elapsed_hours(log.start_time, now);

    diesel::update(time_logs.filter(id.eq(log.id)))
        .set((end_time.eq(now), duration_hours.eq(worked)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    // The closed interval rolls into the task's actual hours.
    diesel::update(tasks_dsl::tasks.filter(tasks_dsl::id.eq(task)))
        .set((
            tasks_dsl::actual_hours.eq(tasks_dsl::actual_hours + worked),
            tasks_dsl::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    history::record(
        &mut conn,
        task,
        auth.user.id,
        HistoryAction::TimeLogged,
        Some("actual_hours"),
        None,
        Some(format!("{:.2}", worked)),
    )
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("History error: {e}")))?;

    log.end_time = Some(now);
    log.duration_hours = Some(worked);
    info!(
        "Timer stopped on task {} by {} ({:.2}h)",
        task, auth.user.username, worked
    );
    Ok(Json(log.into()))
}

pub async fn list_task_time(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Path(task): Path<Uuid>,
) -> Result<Json<TimeLogListResponse>, (StatusCode, String)> {
    use crate::shared::schema::time_logs::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    if !task_exists(&mut conn, task)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?
    {
        return Err((StatusCode::NOT_FOUND, "Task not found".to_string()));
    }

    let logs: Vec<TimeLog> = time_logs
        .filter(task_id.eq(task))
        .order(start_time.desc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let total_hours = round_hours(logs.iter().filter_map(|l| l.duration_hours).sum());
    Ok(Json(TimeLogListResponse {
        logs: logs.into_iter().map(TimeLogResponse::from).collect(),
        total_hours,
    }))
}

pub async fn my_time(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Query(query): Query<TimeLogQuery>,
) -> Result<Json<TimeLogListResponse>, (StatusCode, String)> {
    user_time_logs(state, auth.user.id, query).await
}

pub async fn user_time(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(target): Path<Uuid>,
    Query(query): Query<TimeLogQuery>,
) -> Result<Json<TimeLogListResponse>, (StatusCode, String)> {
    if target != auth.user.id && !auth.user.can_act_as(UserRole::Manager) {
        return Err((
            StatusCode::FORBIDDEN,
            "Manager role required to view another user's time".to_string(),
        ));
    }
    user_time_logs(state, target, query).await
}

async fn user_time_logs(
    state: Arc<AppState>,
    target: Uuid,
    query: TimeLogQuery,
) -> Result<Json<TimeLogListResponse>, (StatusCode, String)> {
    use crate::shared::schema::time_logs::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let limit = query.limit.unwrap_or(50).min(200);
    let offset = query.offset.unwrap_or(0);

    let logs: Vec<TimeLog> = time_logs
        .filter(user_id.eq(target))
        .order(start_time.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let total_hours = round_hours(logs.iter().filter_map(|l| l.duration_hours).sum());
    Ok(Json(TimeLogListResponse {
        logs: logs.into_iter().map(TimeLogResponse::from).collect(),
        total_hours,
    }))
}

pub fn configure_time_logs_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tasks/:id/time", get(list_task_time))
        .route("/api/tasks/:id/time/start", post(start_timer))
        .route("/api/tasks/:id/time/stop", post(stop_timer))
        .route("/api/time/mine", get(my_time))
        .route("/api/time/user/:id", get(user_time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn elapsed_covers_whole_and_partial_hours() {
        let start = Utc::now();
        assert_eq!(elapsed_hours(start, start + Duration::hours(2)), 2.0);
        assert_eq!(elapsed_hours(start, start + Duration::minutes(90)), 1.5);
        assert_eq!(elapsed_hours(start, start + Duration::minutes(20)), 0.33);
    }

    #[test]
    fn rounding_is_two_decimals() {
        assert_eq!(round_hours(1.2345), 1.23);
        assert_eq!(round_hours(1.236), 1.24);
        assert_eq!(round_hours(0.333333), 0.33);
        assert_eq!(round_hours(0.0), 0.0);
    }

    #[test]
    fn response_flags_open_logs_as_running() {
        let log = TimeLog {
            id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            start_time: Utc::now(),
            end_time: None,
            duration_hours: None,
            description: None,
            created_at: Utc::now(),
        };
        let response = TimeLogResponse::from(log);
        assert!(response.running);
    }
}
